//! Polling fallback: full-state snapshots.
//!
//! A client that cannot hold a push connection polls
//! `GET /api/v1/dashboard/snapshot` instead. The snapshot is assembled by
//! a [`SnapshotSource`] for the caller's [`View`] and served read-through
//! from the cache.
//!
//! Changes are stamped and recorded through [`SnapshotService::commit`],
//! which excludes snapshot assembly. A snapshot therefore contains every
//! change stamped before it, and every change it lacks carries a later
//! push timestamp and wins the client's last-timestamp-wins merge.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulse_cache::Cache;
use pulse_core::types::{DbId, Timestamp};
use pulse_core::{groups, Message, MessageType, MonotonicClock, Snapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Failure of the component that assembles snapshots.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot source unavailable: {0}")]
    Unavailable(String),
}

/// The slice of state a principal may read: shared state, plus its own
/// tenant's state when it belongs to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Shared,
    Tenant(DbId),
}

impl View {
    pub fn for_tenant(tenant_id: Option<DbId>) -> Self {
        tenant_id.map_or(View::Shared, View::Tenant)
    }

    /// Group-style name, also used in cache keys.
    pub fn name(&self) -> String {
        match self {
            View::Shared => groups::dashboard(),
            View::Tenant(id) => groups::tenant(*id),
        }
    }
}

/// Assembles the current dashboard state.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Build the snapshot of `view` as of `as_of`.
    async fn load(&self, view: View, as_of: Timestamp) -> Result<Snapshot, SnapshotError>;
}

/// Read-through cache in front of a [`SnapshotSource`].
pub struct SnapshotService {
    source: Arc<dyn SnapshotSource>,
    cache: Cache,
    ttl: Duration,
    /// Shared by snapshot assembly, exclusive for commits.
    gate: RwLock<()>,
}

impl SnapshotService {
    pub fn new(source: Arc<dyn SnapshotSource>, cache: Cache, ttl: Duration) -> Self {
        Self {
            source,
            cache,
            ttl,
            gate: RwLock::new(()),
        }
    }

    /// The current snapshot of `view`, from cache when fresh.
    pub async fn current(
        &self,
        view: View,
        clock: &MonotonicClock,
    ) -> Result<Snapshot, SnapshotError> {
        // Held from stamping to caching so no commit lands in between.
        let _gate = self.gate.read().await;
        let key = self.cache.keys().snapshot(&view.name());
        let snapshot = self
            .cache
            .get_or_set(&key, Some(self.ttl), || async {
                self.source.load(view, clock.now()).await.map(Some)
            })
            .await?;
        // get_or_set only yields None when the factory does.
        snapshot.ok_or_else(|| SnapshotError::Unavailable("empty snapshot".into()))
    }

    /// Stamp a change from `clock` and run `record` with the stamp while
    /// no snapshot is being assembled, then drop the cached snapshots.
    ///
    /// The returned stamp is later than every snapshot served so far and
    /// earlier than every snapshot assembled afterwards.
    pub async fn commit<F, Fut>(&self, clock: &MonotonicClock, record: F) -> Timestamp
    where
        F: FnOnce(Timestamp) -> Fut,
        Fut: Future<Output = ()>,
    {
        let _gate = self.gate.write().await;
        let timestamp = clock.now();
        record(timestamp).await;
        self.drop_cached().await;
        timestamp
    }

    /// Drop every cached snapshot so the next poll reassembles it.
    pub async fn invalidate(&self) -> usize {
        let _gate = self.gate.write().await;
        self.drop_cached().await
    }

    async fn drop_cached(&self) -> usize {
        let pattern = self.cache.keys().resource_pattern("snapshot");
        self.cache.invalidate(&pattern).await
    }
}

/// Latest value of one state key, as kept in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateRecord {
    key: String,
    value: serde_json::Value,
    timestamp: Timestamp,
}

/// Snapshot source backed by the latest pushed value of every state key.
///
/// The publisher records each group-delivered message here under the view
/// allowed to see it; deletes drop the key. Used when no domain-specific
/// source is configured.
#[derive(Clone)]
pub struct StateRecords {
    cache: Cache,
}

impl StateRecords {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    fn index_key(&self, view: View) -> String {
        self.cache.keys().key("state-index", view.name())
    }

    fn record_key(&self, view: View, state_key: &str) -> String {
        self.cache.keys().sub_key("state", view.name(), state_key)
    }

    /// Apply a delivered message to the state recorded for `view`.
    pub async fn apply(&self, view: View, message: &Message) {
        let state_key = message.state_key();
        let index = self.index_key(view);
        if message.kind() == MessageType::EntityDeleted {
            self.cache.delete(&self.record_key(view, &state_key)).await;
            self.cache.set_remove(&index, &state_key).await;
            return;
        }

        let record = StateRecord {
            key: state_key.clone(),
            value: message.data().clone(),
            timestamp: message.timestamp(),
        };
        if self
            .cache
            .set(&self.record_key(view, &state_key), &record, None)
            .await
        {
            self.cache.set_add(&index, &state_key).await;
        }
    }

    async fn collect(&self, view: View, snapshot: &mut Snapshot) {
        let index = self.index_key(view);
        for state_key in self.cache.set_members(&index).await {
            match self
                .cache
                .get::<StateRecord>(&self.record_key(view, &state_key))
                .await
            {
                Some(record) => {
                    snapshot.entries.insert(record.key, record.value);
                }
                None => {
                    self.cache.set_remove(&index, &state_key).await;
                }
            }
        }
    }
}

#[async_trait]
impl SnapshotSource for StateRecords {
    async fn load(&self, view: View, as_of: Timestamp) -> Result<Snapshot, SnapshotError> {
        let mut snapshot = Snapshot::new(as_of);
        self.collect(View::Shared, &mut snapshot).await;
        if view != View::Shared {
            self.collect(view, &mut snapshot).await;
        }
        Ok(snapshot)
    }
}
