//! Shared establish/close sequencing for sessions and links.
//!
//! Session, sender, and receiver handles all walk the same state machine
//! (unestablished -> established -> closing -> closed, with an absorbing
//! errored state detected once closed is observed), so the sequencing lives
//! here and the handles stay thin.

use crate::cancellation::CancelToken;
use crate::coordinator::{ConnectionCoordinator, Predicate};
use crate::engine::EngineEndpoint;
use crate::errors::*;
use log::debug;

/// Wait for `endpoint` to become established.
///
/// The creation request was already issued under the caller's lock; this only
/// takes the lock again and waits for the peer's confirmation.
pub(crate) fn establish<E>(
    coordinator: &ConnectionCoordinator,
    endpoint: &E,
    entity: &'static str,
    cancel: &CancelToken,
) -> Result<()>
where
    E: EngineEndpoint,
{
    let guard = coordinator.lock();
    let guard = coordinator.wait_until(
        guard,
        Predicate::new(format!("{} established", entity), || {
            endpoint.is_established()
        }),
        cancel,
    )?;
    debug!("{} established", entity);
    drop(guard);
    Ok(())
}

/// Close `endpoint` and wait for the close handshake to complete.
///
/// Waits in a loop - the engine's close handshake may need several wake
/// cycles before `is_closed` reports true. Once closed, a recorded error
/// condition still fails the operation: the entity went away, but not
/// cleanly. The lock is released on every path when the guard drops.
pub(crate) fn close<E>(
    coordinator: &ConnectionCoordinator,
    endpoint: &E,
    entity: &'static str,
    cancel: &CancelToken,
) -> Result<()>
where
    E: EngineEndpoint,
{
    let mut guard = coordinator.lock();
    debug!("closing {}", entity);
    endpoint.begin_close();
    coordinator.notify_state_changed();
    while !endpoint.is_closed() {
        guard = coordinator.wait_until(
            guard,
            Predicate::new(format!("{} closed", entity), || endpoint.is_closed()),
            cancel,
        )?;
    }
    if let Some(condition) = endpoint.error_condition() {
        return ProtocolSnafu { entity, condition }.fail();
    }
    debug!("{} closed", entity);
    Ok(())
}
