//! Pulse cache layer.
//!
//! A typed key-value cache sitting between expensive reads (backing store
//! queries, remote computations) and the push/poll paths:
//!
//! - [`CacheStore`]: byte-level backend contract. [`MemoryStore`] is the
//!   in-process implementation; `RedisStore` is available with the
//!   `redis` feature.
//! - [`Serializer`]: pluggable value encoding ([`JsonSerializer`] by
//!   default).
//! - [`Cache`]: typed facade with read-through and pattern invalidation.
//!   Backend failures degrade to cache misses and are logged, never
//!   returned to the caller.
//! - [`CacheKeys`]: the `{prefix}:{resource}:{id}[:{sub}]` key grammar.

pub mod cache;
pub mod config;
pub mod error;
pub mod keys;
pub mod memory;
pub mod pattern;
#[cfg(feature = "redis")]
pub mod redis;
pub mod serializer;
pub mod store;

pub use cache::Cache;
pub use config::CacheConfig;
pub use error::CacheError;
pub use keys::CacheKeys;
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;
pub use serializer::{JsonSerializer, Serializer};
pub use store::CacheStore;
