use std::sync::Arc;

use crate::memory::MemoryStore;
use crate::store::CacheStore;

/// Default key prefix.
const DEFAULT_PREFIX: &str = "pulse";

/// Cache configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// First segment of every key (default: `pulse`).
    pub prefix: String,
    /// Optional Redis URL. When unset (or the `redis` feature is off) the
    /// in-process store is used.
    pub redis_url: Option<String>,
}

impl CacheConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var        | Default  |
    /// |----------------|----------|
    /// | `CACHE_PREFIX` | `pulse`  |
    /// | `REDIS_URL`    | unset    |
    pub fn from_env() -> Self {
        let prefix = std::env::var("CACHE_PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.into());
        let redis_url = std::env::var("REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Self { prefix, redis_url }
    }

    /// Build the backing store this configuration selects.
    pub fn build_store(&self) -> Result<Arc<dyn CacheStore>, crate::CacheError> {
        #[cfg(feature = "redis")]
        if let Some(url) = &self.redis_url {
            tracing::info!("Using Redis cache backend");
            return Ok(Arc::new(crate::redis::RedisStore::new(url)?));
        }

        #[cfg(not(feature = "redis"))]
        if self.redis_url.is_some() {
            tracing::warn!("REDIS_URL is set but the redis feature is disabled; using in-memory cache");
        }

        tracing::info!("Using in-memory cache backend");
        Ok(Arc::new(MemoryStore::new()))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.into(),
            redis_url: None,
        }
    }
}
