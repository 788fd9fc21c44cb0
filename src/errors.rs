use crate::engine::ErrorCondition;
use snafu::Snafu;
use std::io;
use std::time::Duration;

/// A type alias for handling errors throughout amqgate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error that can occur from amqgate.
///
/// All failures surface to callers through this one type; none are retried
/// internally. Retry policy, if any, belongs to the caller.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The predicate of a blocking wait did not become true before the
    /// connection's wait timeout elapsed.
    #[snafu(display("timed out after {:?} waiting until {}", timeout, description))]
    WaitTimeout {
        description: String,
        timeout: Duration,
    },

    /// The calling thread was cancelled while blocked in a wait. The
    /// cancellation token is left set so callers that check it afterwards
    /// still observe the cancellation.
    #[snafu(display("cancelled while waiting until {}", description))]
    WaitCancelled { description: String },

    /// The engine recorded an error condition on an entity, either while
    /// creating a link or after the entity reached its closed state.
    #[snafu(display("{} failed with error condition: {}", entity, condition))]
    Protocol {
        entity: &'static str,
        condition: ErrorCondition,
    },

    /// A destination was recognized but cannot be used as given.
    #[snafu(display("invalid destination: {}", reason))]
    InvalidDestination { reason: String },

    /// A feature that is intentionally unimplemented at this layer.
    #[snafu(display("{} are not supported", feature))]
    Unsupported { feature: &'static str },

    /// I/O error.
    #[snafu(display("I/O error"))]
    Io { source: io::Error },

    /// Failed to spawn a background thread.
    #[snafu(display("fork failed"))]
    Fork { source: io::Error },

    /// `send_bytes` was called before a client connected to the test peer.
    /// Indicates a test-script ordering bug, not a recoverable condition.
    #[snafu(display("no client connected to test peer"))]
    PeerNotConnected,

    /// A background thread panicked instead of returning.
    #[snafu(display("I/O thread died unexpectedly: {}", message))]
    IoThreadPanic { message: String },
}
