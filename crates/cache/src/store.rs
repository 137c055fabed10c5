use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// Byte-level cache backend.
///
/// Every single-key operation is atomic with respect to concurrent callers:
/// a reader observes either the previous value or the new one, never a
/// partial write. Operations spanning several keys (`keys` followed by
/// deletes) are not.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the raw value at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` at `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove `key`. Returns whether a value was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Add `by` to the integer at `key` (missing keys count as zero) and
    /// return the new value.
    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError>;

    /// Add `member` to the set at `key`. Returns whether it was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    /// Remove `member` from the set at `key`. Returns whether it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError>;

    /// List live keys matching a glob pattern (`*`, `?`, `\` escapes).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;
}
