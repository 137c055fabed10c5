//! Pulse hub server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! push hub, event publisher, polling fallback) so integration tests and
//! the binary entrypoint can both access them.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod publisher;
pub mod router;
pub mod routes;
pub mod snapshot;
pub mod state;
pub mod ws;
