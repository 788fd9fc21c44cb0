//! A blocking client facade over an asynchronous AMQP protocol engine.
//!
//! The engine (an external collaborator, consumed through the
//! [`EngineConnection`] family of traits) advances connection/session/link
//! state as a driver thread pumps the transport. This crate makes that
//! event-driven state machine appear synchronous and thread-safe: API calls
//! take the single connection-wide lock, nudge the engine, and park in a
//! condition wait until the driver signals a state change, with wall-clock
//! timeouts and prompt cancellation.
//!
//! The [`testpeer`] module provides the other half of the story: a
//! deterministic single-connection peer that feeds a raw byte stream to an
//! incremental frame parser, for validating the client against scripted
//! protocol exchanges.

mod cancellation;
mod connection;
mod coordinator;
mod destination;
mod engine;
mod errors;
mod lifecycle;
mod link;
mod session;
pub mod testpeer;

pub use cancellation::CancelToken;
pub use connection::{Connection, ConnectionOptions, EngineDriver, StateNotifier};
pub use coordinator::{ConnectionCoordinator, ConnectionGuard, Predicate};
pub use destination::Destination;
pub use engine::{
    EngineConnection, EngineEndpoint, EngineLink, EngineSession, ErrorCondition,
};
pub use errors::{Error, Result};
pub use link::{Receiver, Sender};
pub use session::Session;
