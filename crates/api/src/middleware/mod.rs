//! Request extractors shared by HTTP handlers.

pub mod auth;
