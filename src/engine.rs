//! Contract consumed from the external protocol engine.
//!
//! The engine owns wire-level connection/session/link state; this crate only
//! queries and nudges it. Every method on these traits must be called while
//! holding the connection's lock (see
//! [`ConnectionCoordinator`](crate::ConnectionCoordinator)) - the engine's
//! internal state graph is shared across entities, and the single
//! connection-wide lock is the only thing serializing access to it.

use std::fmt;

/// Error recorded by the engine on a closed or refused entity.
///
/// Carries the symbolic AMQP condition (e.g. `amqp:internal-error`) and a
/// free-form description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCondition {
    condition: String,
    description: String,
}

impl ErrorCondition {
    pub fn new<S0: Into<String>, S1: Into<String>>(
        condition: S0,
        description: S1,
    ) -> ErrorCondition {
        ErrorCondition {
            condition: condition.into(),
            description: description.into(),
        }
    }

    /// The symbolic condition code.
    pub fn condition(&self) -> &str {
        &self.condition
    }

    /// Human-readable detail; may be empty.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for ErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.condition)
        } else {
            write!(f, "{} ({})", self.condition, self.description)
        }
    }
}

/// State queries and close entry point shared by every engine entity
/// (connection, session, link).
///
/// Implementations are handles into engine-owned state; cloning or holding one
/// does not pin the entity open. The driver thread mutates the underlying
/// state concurrently, which is why callers must hold the connection lock
/// around every call.
pub trait EngineEndpoint: Send + Sync {
    /// True once the remote peer has confirmed the entity.
    fn is_established(&self) -> bool;

    /// True once the close handshake has fully completed.
    fn is_closed(&self) -> bool;

    /// Error recorded on the entity, if any. Only meaningful once
    /// `is_closed` reports true.
    fn error_condition(&self) -> Option<ErrorCondition>;

    /// Ask the engine to start closing the entity. Returns immediately; the
    /// close completes asynchronously as the driver pumps the engine.
    fn begin_close(&self);
}

/// The engine's connection object.
pub trait EngineConnection: EngineEndpoint {
    type Session: EngineSession;

    /// Ask the engine to begin a new session. The session is not established
    /// until the peer confirms it; callers wait on
    /// [`is_established`](EngineEndpoint::is_established).
    fn begin_session(&self) -> Result<Self::Session, ErrorCondition>;
}

/// The engine's session object.
pub trait EngineSession: EngineEndpoint {
    type Link: EngineLink;

    /// Ask the engine to attach a sending link to `address`.
    fn create_sender(&self, address: &str) -> Result<Self::Link, ErrorCondition>;

    /// Ask the engine to attach a receiving link named `name` to `address`.
    fn create_receiver(&self, name: &str, address: &str) -> Result<Self::Link, ErrorCondition>;
}

/// The engine's link object (sender or receiver side).
pub trait EngineLink: EngineEndpoint {}
