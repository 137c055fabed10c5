//! Latest observed value per state key, merged last-timestamp-wins.
//!
//! Push messages and polled snapshots both feed this store. An update is
//! applied only when its timestamp is strictly newer than what the key
//! already holds, so a stale snapshot cannot roll back a fresher push and
//! a message delivered through two groups is applied once.
//!
//! Deletes leave a tombstone so a stale snapshot cannot bring the entity
//! back. The newest applied snapshot is authoritative for everything
//! stamped before it: updates at or before its timestamp are ignored and
//! tombstones up to it are pruned.

use std::collections::HashMap;
use std::sync::Arc;

use pulse_core::types::Timestamp;
use pulse_core::{Message, MessageType, Snapshot};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    /// `None` marks a deleted entity.
    value: Option<serde_json::Value>,
    timestamp: Timestamp,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Timestamp of the newest applied snapshot.
    horizon: Option<Timestamp>,
}

impl Inner {
    fn merge(
        &mut self,
        key: String,
        value: Option<serde_json::Value>,
        timestamp: Timestamp,
    ) -> bool {
        if self.horizon.is_some_and(|horizon| timestamp <= horizon) {
            return false;
        }
        if let Some(existing) = self.entries.get(&key) {
            if existing.timestamp >= timestamp {
                return false;
            }
        }
        self.entries.insert(key, Entry { value, timestamp });
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<Inner>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one pushed message. Returns `true` if it changed the store.
    pub async fn apply_message(&self, message: &Message) -> bool {
        let value = if message.kind() == MessageType::EntityDeleted {
            None
        } else {
            Some(message.data().clone())
        };
        self.inner
            .write()
            .await
            .merge(message.state_key(), value, message.timestamp())
    }

    /// Merge a full snapshot. Keys the snapshot no longer lists are
    /// treated as deleted as of the snapshot's timestamp.
    ///
    /// Returns the number of keys that changed.
    pub async fn apply_snapshot(&self, snapshot: &Snapshot) -> usize {
        let mut inner = self.inner.write().await;
        if inner.horizon.is_some_and(|horizon| snapshot.timestamp <= horizon) {
            return 0;
        }
        let mut changed = 0;

        let vanished: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, entry)| entry.value.is_some() && !snapshot.entries.contains_key(*key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in vanished {
            if inner.merge(key, None, snapshot.timestamp) {
                changed += 1;
            }
        }

        for (key, value) in &snapshot.entries {
            if inner.merge(key.clone(), Some(value.clone()), snapshot.timestamp) {
                changed += 1;
            }
        }

        inner.horizon = Some(snapshot.timestamp);
        inner
            .entries
            .retain(|_, entry| entry.value.is_some() || entry.timestamp > snapshot.timestamp);
        changed
    }

    /// Current value of a key; `None` when unknown or deleted.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner
            .read()
            .await
            .entries
            .get(key)
            .and_then(|entry| entry.value.clone())
    }

    /// Timestamp of the update the key currently reflects.
    pub async fn timestamp(&self, key: &str) -> Option<Timestamp> {
        self.inner
            .read()
            .await
            .entries
            .get(key)
            .map(|entry| entry.timestamp)
    }

    /// Live (non-deleted) keys.
    pub async fn len(&self) -> usize {
        self.inner
            .read()
            .await
            .entries
            .values()
            .filter(|entry| entry.value.is_some())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
