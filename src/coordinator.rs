//! The connection-wide monitor that lets blocking API calls ride on top of an
//! asynchronous engine.
//!
//! One [`ConnectionCoordinator`] guards one engine connection. API threads
//! take the lock, poke the engine, then park in [`wait_until`] until the
//! driver thread advances engine state and calls [`notify_state_changed`].
//! There is deliberately a single lock for the whole connection - sessions
//! and links never get their own - because the engine's internal state graph
//! is shared and fine-grained locking would reintroduce cross-entity deadlock
//! risk.
//!
//! [`wait_until`]: ConnectionCoordinator::wait_until
//! [`notify_state_changed`]: ConnectionCoordinator::notify_state_changed

use crate::cancellation::CancelToken;
use crate::errors::*;
use log::trace;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub(crate) struct Monitor {
    pub(crate) state: Mutex<()>,
    pub(crate) cond: Condvar,
}

/// A named boolean condition over engine state.
///
/// Evaluated only while the connection lock is held; holds no state of its
/// own between evaluations.
pub struct Predicate<'a> {
    description: String,
    test: Box<dyn Fn() -> bool + 'a>,
}

impl<'a> Predicate<'a> {
    pub fn new<S, F>(description: S, test: F) -> Predicate<'a>
    where
        S: Into<String>,
        F: Fn() -> bool + 'a,
    {
        Predicate {
            description: description.into(),
            test: Box::new(test),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn test(&self) -> bool {
        (self.test)()
    }
}

/// Proof that the connection lock is held.
///
/// Dropping the guard releases the lock; error paths inside this crate rely
/// on that for their guaranteed-release behavior.
#[derive(Debug)]
pub struct ConnectionGuard<'a> {
    guard: MutexGuard<'a, ()>,
}

/// Monitor for one logical connection: a mutex over all engine access plus a
/// condition used to signal engine state changes.
///
/// The lock is not reentrant. Taking it twice from one thread deadlocks by
/// design; callers never nest it.
pub struct ConnectionCoordinator {
    monitor: Arc<Monitor>,
    wait_timeout: Duration,
}

impl ConnectionCoordinator {
    /// `wait_timeout` is the single deadline applied to every blocking wait
    /// on this connection; it is fixed at construction, never per call.
    pub fn new(wait_timeout: Duration) -> ConnectionCoordinator {
        ConnectionCoordinator {
            monitor: Arc::new(Monitor {
                state: Mutex::new(()),
                cond: Condvar::new(),
            }),
            wait_timeout,
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Acquire the connection lock. All engine reads and mutations must
    /// happen while the returned guard is alive.
    pub fn lock(&self) -> ConnectionGuard<'_> {
        ConnectionGuard {
            guard: self.monitor.state.lock().unwrap(),
        }
    }

    /// Create a cancellation token bound to this connection's monitor.
    /// Cancelling it wakes any thread parked in [`wait_until`] here.
    ///
    /// [`wait_until`]: ConnectionCoordinator::wait_until
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken::new(Arc::clone(&self.monitor))
    }

    /// Wake every thread parked in [`wait_until`] so it re-checks its
    /// predicate. Called after any local mutation that may move engine state
    /// and by the driver thread whenever it advances the engine. May be
    /// called with or without the lock held.
    ///
    /// [`wait_until`]: ConnectionCoordinator::wait_until
    pub fn notify_state_changed(&self) {
        self.monitor.cond.notify_all();
    }

    /// Block until `predicate` holds, handing the lock back to the caller.
    ///
    /// Must be entered with the lock held; the guard is released atomically
    /// while the thread is suspended and reacquired before the predicate is
    /// re-checked, so no evaluation ever happens unlocked. The deadline is
    /// wall-clock, computed once on entry from the coordinator's wait
    /// timeout - intervening wake-ups do not extend it.
    ///
    /// Fails with [`Error::WaitTimeout`] once the deadline passes without the
    /// predicate holding, or [`Error::WaitCancelled`] if `cancel` fires (the
    /// token stays set). On failure the lock is released when the guard
    /// drops, mirroring the success path's handoff.
    pub fn wait_until<'a>(
        &self,
        mut guard: ConnectionGuard<'a>,
        predicate: Predicate<'_>,
        cancel: &CancelToken,
    ) -> Result<ConnectionGuard<'a>> {
        let deadline = Instant::now() + self.wait_timeout;
        loop {
            if cancel.is_cancelled() {
                trace!("wait cancelled: {}", predicate.description());
                return WaitCancelledSnafu {
                    description: predicate.description(),
                }
                .fail();
            }
            if predicate.test() {
                return Ok(guard);
            }
            let now = Instant::now();
            if now >= deadline {
                trace!("wait timed out: {}", predicate.description());
                return WaitTimeoutSnafu {
                    description: predicate.description(),
                    timeout: self.wait_timeout,
                }
                .fail();
            }
            trace!("waiting until {}", predicate.description());
            let (reacquired, _) = self
                .monitor
                .cond
                .wait_timeout(guard.guard, deadline - now)
                .unwrap();
            guard.guard = reacquired;
        }
    }
}
