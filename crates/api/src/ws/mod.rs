//! WebSocket push hub.
//!
//! Provides the connection and group registry, heartbeat monitoring, and
//! the HTTP upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod hub;
pub mod registry;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use hub::{Admission, DeliveryFailure, DeliveryReport, DisconnectReason, Hub};
pub use registry::GroupRegistry;
