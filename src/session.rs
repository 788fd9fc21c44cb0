use crate::cancellation::CancelToken;
use crate::coordinator::ConnectionCoordinator;
use crate::destination::Destination;
use crate::engine::EngineSession;
use crate::errors::*;
use crate::lifecycle;
use crate::link::{Receiver, Sender};
use log::debug;
use std::sync::Arc;
use uuid::Uuid;

/// A client-facing session bound to one engine session.
///
/// Created via [`Connection::create_session`](crate::Connection::create_session);
/// already established by the time the caller sees it. All blocking
/// operations share the owning connection's lock and wait timeout.
pub struct Session<S: EngineSession> {
    session: S,
    coordinator: Arc<ConnectionCoordinator>,
}

impl<S: EngineSession> Session<S> {
    pub(crate) fn new(session: S, coordinator: Arc<ConnectionCoordinator>) -> Session<S> {
        Session {
            session,
            coordinator,
        }
    }

    pub(crate) fn establish(&self, cancel: &CancelToken) -> Result<()> {
        lifecycle::establish(&self.coordinator, &self.session, "session", cancel)
    }

    /// Close the session, blocking until the engine completes the close
    /// handshake. Fails with [`Error::Protocol`] if the engine recorded an
    /// error condition on the closed session.
    pub fn close(&self, cancel: &CancelToken) -> Result<()> {
        lifecycle::close(&self.coordinator, &self.session, "session", cancel)
    }

    /// Create a producer for `destination`.
    ///
    /// Destination resolution happens before the lock is taken: topics are
    /// rejected as [`Error::Unsupported`] and unusable queue names as
    /// [`Error::InvalidDestination`]. Queue producers get a generated
    /// `producer-<queue>-<uuid>` link name.
    ///
    /// Creation and establishment failures are surfaced as-is; nothing is
    /// retried.
    pub fn create_producer(
        &self,
        destination: &Destination,
        cancel: &CancelToken,
    ) -> Result<Sender<S::Link>> {
        match destination {
            Destination::Queue(queue) => {
                if queue.is_empty() {
                    return InvalidDestinationSnafu {
                        reason: "queue name is empty",
                    }
                    .fail();
                }
                let name = format!("producer-{}-{}", queue, Uuid::new_v4());
                self.create_sender(name, queue, cancel)
            }
            Destination::Topic(_) => UnsupportedSnafu {
                feature: "topic destinations",
            }
            .fail(),
        }
    }

    fn create_sender(
        &self,
        name: String,
        address: &str,
        cancel: &CancelToken,
    ) -> Result<Sender<S::Link>> {
        let guard = self.coordinator.lock();
        debug!("creating sender {} for address {}", name, address);
        let link = match self.session.create_sender(address) {
            Ok(link) => link,
            Err(condition) => {
                return ProtocolSnafu {
                    entity: "sender link",
                    condition,
                }
                .fail();
            }
        };
        self.coordinator.notify_state_changed();
        drop(guard);

        let sender = Sender::new(name, link, Arc::clone(&self.coordinator));
        sender.establish(cancel)?;
        Ok(sender)
    }

    /// Create a receiver named `name` attached to `address`, blocking until
    /// the link is established.
    pub fn create_receiver(
        &self,
        name: &str,
        address: &str,
        cancel: &CancelToken,
    ) -> Result<Receiver<S::Link>> {
        let guard = self.coordinator.lock();
        debug!("creating receiver {} for address {}", name, address);
        let link = match self.session.create_receiver(name, address) {
            Ok(link) => link,
            Err(condition) => {
                return ProtocolSnafu {
                    entity: "receiver link",
                    condition,
                }
                .fail();
            }
        };
        self.coordinator.notify_state_changed();
        drop(guard);

        let receiver = Receiver::new(name.to_string(), link, Arc::clone(&self.coordinator));
        receiver.establish(cancel)?;
        Ok(receiver)
    }
}
