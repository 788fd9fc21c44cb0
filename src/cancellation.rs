//! Cooperative cancellation for threads blocked in a connection wait.

use crate::coordinator::Monitor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation token for blocking operations.
///
/// Obtained from [`ConnectionCoordinator::cancel_token`] (or
/// [`Connection::cancel_token`]) and passed to every blocking call. Cancelling
/// wakes any thread parked in a wait on the owning connection so the
/// cancellation is observed within one wake cycle, not at the next timeout
/// slice.
///
/// The flag is sticky: a wait that fails with
/// [`Error::WaitCancelled`](crate::Error::WaitCancelled) leaves the token set,
/// so callers that check [`is_cancelled`](CancelToken::is_cancelled) after
/// catching the error still observe it.
///
/// Clones share the same flag.
///
/// [`ConnectionCoordinator::cancel_token`]: crate::ConnectionCoordinator::cancel_token
/// [`Connection::cancel_token`]: crate::Connection::cancel_token
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    monitor: Arc<Monitor>,
}

impl CancelToken {
    pub(crate) fn new(monitor: Arc<Monitor>) -> CancelToken {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            monitor,
        }
    }

    /// Cancel the token and wake every parked waiter on the connection.
    ///
    /// Takes the connection lock so a waiter cannot slip between its flag
    /// check and suspending; the notify therefore reaches every parked
    /// thread. Do not call while holding the lock yourself - the lock is not
    /// reentrant.
    pub fn cancel(&self) {
        let _guard = self.monitor.state.lock().unwrap();
        self.flag.store(true, Ordering::SeqCst);
        self.monitor.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionCoordinator;
    use std::time::Duration;

    #[test]
    fn starts_clear_and_stays_set() {
        let coordinator = ConnectionCoordinator::new(Duration::from_millis(50));
        let token = coordinator.cancel_token();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_share_the_flag() {
        let coordinator = ConnectionCoordinator::new(Duration::from_millis(50));
        let token = coordinator.cancel_token();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn tokens_are_independent() {
        let coordinator = ConnectionCoordinator::new(Duration::from_millis(50));
        let token = coordinator.cancel_token();
        let other = coordinator.cancel_token();
        token.cancel();
        assert!(!other.is_cancelled());
    }
}
