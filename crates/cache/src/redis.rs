//! Redis cache backend (feature `redis`).
//!
//! Each operation maps onto a single Redis command, so per-key atomicity
//! is Redis's own. Connections are multiplexed and opened per call.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::CacheError;
use crate::store::CacheStore;

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// [`CacheStore`] backed by a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        Ok(conn.get::<_, Option<Vec<u8>>>(key).await?)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => {
                let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                conn.pset_ex::<_, _, ()>(key, value.as_slice(), millis).await?;
            }
            None => conn.set::<_, _, ()>(key, value.as_slice()).await?,
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        Ok(conn.exists::<_, bool>(key).await?)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del::<_, i64>(key).await?;
        Ok(removed > 0)
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        let mut conn = self.connection().await?;
        Ok(conn.incr::<_, _, i64>(key, by).await?)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let added: i64 = conn.sadd::<_, _, i64>(key, member).await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.srem::<_, _, i64>(key, member).await?;
        Ok(removed > 0)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection().await?;
        Ok(conn.smembers::<_, Vec<String>>(key).await?)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection().await?;
        Ok(conn.keys::<_, Vec<String>>(pattern).await?)
    }
}
