//! Pulse domain event bus.
//!
//! Business logic outside this workspace (lead processing, metrics
//! aggregation, document jobs) reports state changes by publishing
//! [`DomainEvent`]s on an [`EventBus`]. The hub's publisher subscribes,
//! invalidates derived cache entries and multicasts the resulting push
//! messages.

pub mod bus;
pub mod event;

pub use bus::EventBus;
pub use event::DomainEvent;
