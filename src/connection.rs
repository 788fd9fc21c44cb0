use crate::cancellation::CancelToken;
use crate::coordinator::{ConnectionCoordinator, ConnectionGuard};
use crate::engine::EngineConnection;
use crate::errors::*;
use crate::lifecycle;
use crate::session::Session;
use log::debug;
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

/// Options that control the client side of a connection.
///
/// `ConnectionOptions` uses the builder pattern. The default settings are
/// equivalent to
///
/// ```rust
/// use amqgate::ConnectionOptions;
/// use std::time::Duration;
///
/// # fn default_connection_options() -> ConnectionOptions {
/// ConnectionOptions::default().wait_timeout(Duration::from_secs(30))
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    pub(crate) wait_timeout: Duration,
}

impl Default for ConnectionOptions {
    // NOTE: If we change this, make sure to change the doc comment above.
    fn default() -> Self {
        ConnectionOptions {
            wait_timeout: Duration::from_secs(30),
        }
    }
}

impl ConnectionOptions {
    /// Sets the timeout applied to every blocking wait on this connection
    /// (establishment and close of the connection, its sessions, and their
    /// links). One value for the whole connection; it is not negotiated per
    /// call.
    pub fn wait_timeout(self, wait_timeout: Duration) -> Self {
        ConnectionOptions { wait_timeout }
    }
}

/// Handle given to the driver thread so it can serialize its engine access
/// with API threads and wake them after advancing engine state.
#[derive(Clone)]
pub struct StateNotifier {
    coordinator: Arc<ConnectionCoordinator>,
}

impl StateNotifier {
    /// Acquire the connection lock. The driver must hold it around every
    /// read or mutation of engine state.
    pub fn lock(&self) -> ConnectionGuard<'_> {
        self.coordinator.lock()
    }

    /// Wake API threads blocked on engine state so they re-check their
    /// predicates. Call after every batch of engine progress.
    pub fn notify_state_changed(&self) {
        self.coordinator.notify_state_changed()
    }
}

/// The engine/transport pump.
///
/// Runs on a dedicated thread owned by the [`Connection`]: read bytes off the
/// wire, feed them to the engine, write pending output, and call
/// [`StateNotifier::notify_state_changed`] whenever engine state may have
/// moved. Expected to return once the connection is fully closed or the
/// transport goes away.
pub trait EngineDriver: Send + 'static {
    fn run(&mut self, notifier: StateNotifier) -> Result<()>;
}

/// A client connection bound to one engine connection.
///
/// Owns the driver thread. Dropping the connection closes it on a best-effort
/// basis; call [`close`](Connection::close) to observe the outcome.
pub struct Connection<E: EngineConnection> {
    engine: E,
    coordinator: Arc<ConnectionCoordinator>,
    driver_handle: Option<JoinHandle<Result<()>>>,
}

impl<E: EngineConnection> std::fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl<E: EngineConnection> Drop for Connection<E> {
    fn drop(&mut self) {
        let cancel = self.cancel_token();
        let _ = self.close_impl(&cancel);
    }
}

impl<E: EngineConnection> Connection<E> {
    /// Spawn the driver thread and block until the engine reports the
    /// connection established.
    ///
    /// On failure the driver is torn down (close requested, thread joined)
    /// before the error is returned.
    pub fn open<D: EngineDriver>(
        engine: E,
        driver: D,
        options: ConnectionOptions,
    ) -> Result<Connection<E>> {
        use snafu::ResultExt;

        let coordinator = Arc::new(ConnectionCoordinator::new(options.wait_timeout));
        let notifier = StateNotifier {
            coordinator: Arc::clone(&coordinator),
        };
        let mut driver = driver;
        let join_handle = Builder::new()
            .name("amqgate-driver".to_string())
            .spawn(move || driver.run(notifier))
            .context(ForkSnafu)?;

        let mut connection = Connection {
            engine,
            coordinator,
            driver_handle: Some(join_handle),
        };

        let cancel = connection.cancel_token();
        match lifecycle::establish(
            &connection.coordinator,
            &connection.engine,
            "connection",
            &cancel,
        ) {
            Ok(()) => Ok(connection),
            Err(err) => {
                let guard = connection.coordinator.lock();
                connection.engine.begin_close();
                connection.coordinator.notify_state_changed();
                drop(guard);
                if let Some(handle) = connection.driver_handle.take() {
                    let _ = handle.join();
                }
                Err(err)
            }
        }
    }

    /// Create a cancellation token for blocking operations on this
    /// connection.
    pub fn cancel_token(&self) -> CancelToken {
        self.coordinator.cancel_token()
    }

    /// Create a session, blocking until the engine reports it established.
    pub fn create_session(&self, cancel: &CancelToken) -> Result<Session<E::Session>> {
        let guard = self.coordinator.lock();
        debug!("creating session");
        let engine_session = match self.engine.begin_session() {
            Ok(session) => session,
            Err(condition) => {
                return ProtocolSnafu {
                    entity: "session",
                    condition,
                }
                .fail();
            }
        };
        self.coordinator.notify_state_changed();
        drop(guard);

        let session = Session::new(engine_session, Arc::clone(&self.coordinator));
        session.establish(cancel)?;
        Ok(session)
    }

    /// Close the connection, blocking until the engine completes the close
    /// handshake, then reap the driver thread. A driver panic or error is
    /// reported here, the way the thread that caused it never could.
    pub fn close(mut self, cancel: &CancelToken) -> Result<()> {
        self.close_impl(cancel)
    }

    fn close_impl(&mut self, cancel: &CancelToken) -> Result<()> {
        let join_handle = match self.driver_handle.take() {
            Some(handle) => handle,
            // no join handle left - someone already took it, which is only
            // possible if we're being called from Drop after close(), and
            // drop doesn't care what we return.
            None => return Ok(()),
        };
        debug!("closing connection");
        lifecycle::close(&self.coordinator, &self.engine, "connection", cancel)?;
        match join_handle.join() {
            Ok(result) => result,
            Err(err) => IoThreadPanicSnafu {
                message: format!("{:?}", err),
            }
            .fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeConnection;
    use crate::engine::EngineEndpoint;
    use std::io;
    use std::thread;

    fn millis(u: u64) -> Duration {
        Duration::from_millis(u)
    }

    // Eager pump: establishes everything as soon as it's asked for and
    // completes close handshakes, the way a healthy peer would.
    struct EagerDriver {
        engine: FakeConnection,
        panic_at_exit: bool,
        error_at_exit: bool,
    }

    impl EagerDriver {
        fn new(engine: &FakeConnection) -> EagerDriver {
            EagerDriver {
                engine: engine.clone(),
                panic_at_exit: false,
                error_at_exit: false,
            }
        }
    }

    impl EngineDriver for EagerDriver {
        fn run(&mut self, notifier: StateNotifier) -> Result<()> {
            loop {
                thread::sleep(millis(5));
                let guard = notifier.lock();
                self.engine.endpoint.set_established(true);
                self.engine.session.endpoint.set_established(true);
                self.engine.session.link.endpoint.set_established(true);
                if self.engine.session.endpoint.close_requested() {
                    self.engine.session.endpoint.set_closed(true);
                }
                if self.engine.session.link.endpoint.close_requested() {
                    self.engine.session.link.endpoint.set_closed(true);
                }
                let done = self.engine.endpoint.close_requested();
                if done {
                    self.engine.endpoint.set_closed(true);
                }
                notifier.notify_state_changed();
                drop(guard);
                if done {
                    break;
                }
            }
            if self.panic_at_exit {
                panic!("driver blew up");
            }
            if self.error_at_exit {
                use snafu::ResultExt;
                return Err(io::Error::new(io::ErrorKind::Other, "socket reset"))
                    .context(IoSnafu);
            }
            Ok(())
        }
    }

    // Deaf pump: never establishes anything, only completes the close
    // handshake so teardown can finish.
    struct DeafDriver {
        engine: FakeConnection,
    }

    impl EngineDriver for DeafDriver {
        fn run(&mut self, notifier: StateNotifier) -> Result<()> {
            loop {
                thread::sleep(millis(5));
                let guard = notifier.lock();
                if self.engine.endpoint.close_requested() {
                    self.engine.endpoint.set_closed(true);
                    notifier.notify_state_changed();
                    drop(guard);
                    return Ok(());
                }
                drop(guard);
            }
        }
    }

    #[test]
    fn open_then_close() {
        let engine = FakeConnection::new();
        let driver = EagerDriver::new(&engine);
        let connection =
            Connection::open(engine, driver, ConnectionOptions::default()).unwrap();
        let cancel = connection.cancel_token();
        connection.close(&cancel).unwrap();
    }

    #[test]
    fn open_times_out_against_a_deaf_peer() {
        let engine = FakeConnection::new();
        let driver = DeafDriver {
            engine: engine.clone(),
        };
        let err = Connection::open(
            engine,
            driver,
            ConnectionOptions::default().wait_timeout(millis(50)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::WaitTimeout { .. }));
    }

    #[test]
    fn session_and_receiver_lifecycle() {
        let engine = FakeConnection::new();
        let driver = EagerDriver::new(&engine);
        let connection =
            Connection::open(engine, driver, ConnectionOptions::default()).unwrap();
        let cancel = connection.cancel_token();

        let session = connection.create_session(&cancel).unwrap();
        let receiver = session.create_receiver("sub", "orders", &cancel).unwrap();
        receiver.close(&cancel).unwrap();
        session.close(&cancel).unwrap();
        connection.close(&cancel).unwrap();
    }

    #[test]
    fn driver_panic_is_reported_on_close() {
        let engine = FakeConnection::new();
        let mut driver = EagerDriver::new(&engine);
        driver.panic_at_exit = true;
        let connection =
            Connection::open(engine, driver, ConnectionOptions::default()).unwrap();
        let cancel = connection.cancel_token();
        let err = connection.close(&cancel).unwrap_err();
        assert!(matches!(err, Error::IoThreadPanic { .. }));
    }

    #[test]
    fn driver_error_is_reported_on_close() {
        let engine = FakeConnection::new();
        let mut driver = EagerDriver::new(&engine);
        driver.error_at_exit = true;
        let connection =
            Connection::open(engine, driver, ConnectionOptions::default()).unwrap();
        let cancel = connection.cancel_token();
        let err = connection.close(&cancel).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn drop_reaps_the_driver() {
        let engine = FakeConnection::new();
        let endpoint = engine.endpoint.clone();
        let driver = EagerDriver::new(&engine);
        let connection =
            Connection::open(engine, driver, ConnectionOptions::default()).unwrap();
        drop(connection);
        assert!(endpoint.close_requested());
        assert!(endpoint.is_closed());
    }
}
