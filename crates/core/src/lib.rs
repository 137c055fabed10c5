//! Shared types for the Pulse real-time distribution subsystem.
//!
//! Both the hub server (`pulse-api`) and the connection manager
//! (`pulse-client`) speak the wire types defined here, so they live in a
//! crate with no runtime dependencies of its own.

pub mod clock;
pub mod connection;
pub mod error;
pub mod groups;
pub mod message;
pub mod protocol;
pub mod snapshot;
pub mod types;

pub use clock::MonotonicClock;
pub use connection::ConnectionState;
pub use error::CoreError;
pub use message::{Message, MessageType, Notice, Scope, Severity};
pub use protocol::{ClientCommand, ServerFrame};
pub use snapshot::Snapshot;
