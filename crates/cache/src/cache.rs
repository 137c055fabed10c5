//! Typed cache facade.
//!
//! [`Cache`] wraps a [`CacheStore`] with a [`Serializer`] and a
//! [`CacheKeys`] namespace. Its contract towards callers:
//!
//! - A backend failure is logged and behaves like a miss (`get` → `None`,
//!   `set` → `false`), so a degraded cache never fails a request.
//! - A value that no longer decodes is logged, deleted, and reported as a
//!   miss; the next read-through repopulates it.
//! - [`Cache::invalidate`] deletes matching keys one by one. Callers must
//!   tolerate a window where some matching keys are gone and others are
//!   still visible.
//! - [`Cache::get_or_set`] does not coalesce concurrent misses: two callers
//!   missing the same key may both run the factory. Results stay correct;
//!   only work is duplicated.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::keys::CacheKeys;
use crate::serializer::{JsonSerializer, Serializer};
use crate::store::CacheStore;

/// Typed, namespaced cache over a shared [`CacheStore`].
///
/// Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct Cache<Z = JsonSerializer> {
    store: Arc<dyn CacheStore>,
    serializer: Z,
    keys: CacheKeys,
    default_ttl: Option<Duration>,
}

impl Cache<JsonSerializer> {
    /// Create a JSON-encoding cache over `store`.
    pub fn new(store: Arc<dyn CacheStore>, keys: CacheKeys) -> Self {
        Self::with_serializer(store, keys, JsonSerializer)
    }
}

impl<Z: Serializer> Cache<Z> {
    pub fn with_serializer(store: Arc<dyn CacheStore>, keys: CacheKeys, serializer: Z) -> Self {
        Self {
            store,
            serializer,
            keys,
            default_ttl: None,
        }
    }

    /// TTL applied by [`set`](Self::set) when the caller passes `None`.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Key grammar shared with collaborators requesting invalidation.
    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    /// Read and decode the value at `key`. `None` on miss, backend failure
    /// or undecodable value.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache get failed, treating as miss");
                return None;
            }
        };

        match self.serializer.decode(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Dropping undecodable cache entry");
                if let Err(e) = self.store.delete(key).await {
                    tracing::debug!(key, error = %e, "Failed to drop undecodable cache entry");
                }
                None
            }
        }
    }

    /// Encode and store `value`. Returns whether the write succeeded.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let bytes = match self.serializer.encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to encode cache value");
                return false;
            }
        };

        match self.store.set(key, bytes, ttl.or(self.default_ttl)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache set failed");
                false
            }
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.store.exists(key).await.unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "Cache exists failed");
            false
        })
    }

    /// Remove `key`. Returns whether a value was removed.
    pub async fn delete(&self, key: &str) -> bool {
        self.store.delete(key).await.unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "Cache delete failed");
            false
        })
    }

    /// Atomically add `by` to the counter at `key`. `None` if the backend
    /// failed or the key holds a non-integer value.
    pub async fn increment(&self, key: &str, by: i64) -> Option<i64> {
        match self.store.increment(key, by).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, by, error = %e, "Cache increment failed");
                None
            }
        }
    }

    pub async fn set_add(&self, key: &str, member: &str) -> bool {
        self.store.set_add(key, member).await.unwrap_or_else(|e| {
            tracing::warn!(key, member, error = %e, "Cache set_add failed");
            false
        })
    }

    pub async fn set_remove(&self, key: &str, member: &str) -> bool {
        self.store.set_remove(key, member).await.unwrap_or_else(|e| {
            tracing::warn!(key, member, error = %e, "Cache set_remove failed");
            false
        })
    }

    pub async fn set_members(&self, key: &str) -> Vec<String> {
        self.store.set_members(key).await.unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "Cache set_members failed");
            Vec::new()
        })
    }

    /// Delete every key matching the glob `pattern`, one at a time.
    ///
    /// Returns how many keys this call removed. Keys written concurrently
    /// may or may not be caught.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let keys = match self.store.keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "Cache key enumeration failed");
                return 0;
            }
        };

        let mut removed = 0;
        for key in &keys {
            match self.store.delete(key).await {
                Ok(true) => removed += 1,
                // Already gone (expired or swept by a concurrent call).
                Ok(false) => {}
                Err(e) => tracing::warn!(key = %key, error = %e, "Cache delete failed"),
            }
        }

        tracing::debug!(pattern, matched = keys.len(), removed, "Cache invalidated");
        removed
    }

    /// Drop an entity's own key and every key derived from it.
    pub async fn invalidate_entity(&self, resource: &str, id: impl Display) -> usize {
        let own = usize::from(self.delete(&self.keys.key(resource, &id)).await);
        own + self.invalidate(&self.keys.entity_pattern(resource, &id)).await
    }

    /// Read-through: return the cached value, or run `factory`, cache a
    /// `Some` result and return it.
    ///
    /// A factory error is returned unchanged and nothing is cached. A
    /// `None` result is not cached.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(Some(cached));
        }

        let fresh = factory().await?;
        if let Some(value) = &fresh {
            self.set(key, value, ttl).await;
        }
        Ok(fresh)
    }

    /// Bump an entity's generation counter and return the new generation.
    pub async fn bump_version(&self, resource: &str, id: impl Display) -> Option<i64> {
        self.increment(&self.keys.version_key(resource, id), 1).await
    }

    /// Current generation of an entity (0 if never bumped).
    pub async fn version(&self, resource: &str, id: impl Display) -> i64 {
        self.get::<i64>(&self.keys.version_key(resource, id))
            .await
            .unwrap_or(0)
    }
}
