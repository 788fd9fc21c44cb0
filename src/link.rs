use crate::cancellation::CancelToken;
use crate::coordinator::ConnectionCoordinator;
use crate::engine::EngineLink;
use crate::errors::*;
use crate::lifecycle;
use std::sync::Arc;

/// A producing link attached to an address.
///
/// Created via [`Session::create_producer`](crate::Session::create_producer);
/// already established by the time the caller sees it.
pub struct Sender<L: EngineLink> {
    name: String,
    link: L,
    coordinator: Arc<ConnectionCoordinator>,
}

impl<L: EngineLink> std::fmt::Debug for Sender<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender").field("name", &self.name).finish()
    }
}

impl<L: EngineLink> Sender<L> {
    pub(crate) fn new(name: String, link: L, coordinator: Arc<ConnectionCoordinator>) -> Sender<L> {
        Sender {
            name,
            link,
            coordinator,
        }
    }

    /// The generated link name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn establish(&self, cancel: &CancelToken) -> Result<()> {
        lifecycle::establish(&self.coordinator, &self.link, "sender link", cancel)
    }

    /// Close the link, blocking until the engine completes the detach
    /// handshake. Fails with [`Error::Protocol`] if the engine recorded an
    /// error condition on the closed link.
    pub fn close(&self, cancel: &CancelToken) -> Result<()> {
        lifecycle::close(&self.coordinator, &self.link, "sender link", cancel)
    }
}

/// A consuming link attached to an address.
///
/// Created via [`Session::create_receiver`](crate::Session::create_receiver);
/// already established by the time the caller sees it.
pub struct Receiver<L: EngineLink> {
    name: String,
    link: L,
    coordinator: Arc<ConnectionCoordinator>,
}

impl<L: EngineLink> std::fmt::Debug for Receiver<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("name", &self.name)
            .finish()
    }
}

impl<L: EngineLink> Receiver<L> {
    pub(crate) fn new(
        name: String,
        link: L,
        coordinator: Arc<ConnectionCoordinator>,
    ) -> Receiver<L> {
        Receiver {
            name,
            link,
            coordinator,
        }
    }

    /// The caller-supplied link name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn establish(&self, cancel: &CancelToken) -> Result<()> {
        lifecycle::establish(&self.coordinator, &self.link, "receiver link", cancel)
    }

    /// Close the link, blocking until the engine completes the detach
    /// handshake. Fails with [`Error::Protocol`] if the engine recorded an
    /// error condition on the closed link.
    pub fn close(&self, cancel: &CancelToken) -> Result<()> {
        lifecycle::close(&self.coordinator, &self.link, "receiver link", cancel)
    }
}
