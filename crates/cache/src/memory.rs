//! In-process cache backend.
//!
//! All entries live in one map behind a `tokio::sync::RwLock`, so every
//! single-key operation is atomic. Expiry is lazy: expired entries are
//! invisible to readers and reclaimed on the next write to the key or by
//! [`MemoryStore::purge_expired`].

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::CacheError;
use crate::pattern;
use crate::store::CacheStore;

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Thread-safe in-memory [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}

/// Fetch a live entry for mutation, dropping it first if it has expired.
fn live_entry<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|e| !e.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Bytes(bytes) => Ok(Some(bytes.clone())),
                Value::Set(_) => Err(CacheError::WrongType(key.to_string())),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
        let entry = Entry {
            value: Value::Bytes(value),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .is_some_and(|e| e.is_live(now)))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .await
            .remove(key)
            .is_some_and(|e| e.is_live(now)))
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let (current, expires_at) = match live_entry(&mut entries, key, now) {
            None => (0, None),
            Some(Entry {
                value: Value::Bytes(bytes),
                expires_at,
            }) => {
                let current = std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|s| s.trim().parse::<i64>().ok())
                    .ok_or_else(|| CacheError::WrongType(key.to_string()))?;
                (current, *expires_at)
            }
            Some(_) => return Err(CacheError::WrongType(key.to_string())),
        };

        let next = current
            .checked_add(by)
            .ok_or_else(|| CacheError::Backend(format!("increment overflow at {key}")))?;

        // Counters keep their TTL across increments.
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(next.to_string().into_bytes()),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        match live_entry(&mut entries, key, now) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.insert(member.to_string())),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
            None => {
                let members = BTreeSet::from([member.to_string()]);
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Set(members),
                        expires_at: None,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let (removed, now_empty) = match live_entry(&mut entries, key, now) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => (members.remove(member), members.is_empty()),
            Some(_) => return Err(CacheError::WrongType(key.to_string())),
            None => return Ok(false),
        };

        // Empty sets disappear, as they do in Redis.
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Set(members) => Ok(members.iter().cloned().collect()),
                Value::Bytes(_) => Err(CacheError::WrongType(key.to_string())),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let matcher = pattern::compile(pattern)?;
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, e)| e.is_live(now) && matcher.is_match(k.as_str()))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
