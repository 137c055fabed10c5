//! Group membership bookkeeping.
//!
//! [`GroupRegistry`] keeps both directions of the membership relation
//! (group → connections and connection → groups) behind one lock, so they
//! can never disagree and a connection can be dropped from every group in a
//! single step.

use std::collections::{HashMap, HashSet};

use pulse_core::types::ConnectionId;
use tokio::sync::RwLock;

#[derive(Default)]
struct Memberships {
    groups: HashMap<String, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, HashSet<String>>,
}

/// Thread-safe many-to-many map between groups and connections.
///
/// Groups exist only while they have members: a group whose last member
/// leaves is removed.
#[derive(Default)]
pub struct GroupRegistry {
    inner: RwLock<Memberships>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn_id` to `group`. Returns `false` if it was already a member.
    pub async fn join(&self, conn_id: &str, group: &str) -> bool {
        let mut inner = self.inner.write().await;
        let added = inner
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(conn_id.to_string());
        inner
            .connections
            .entry(conn_id.to_string())
            .or_default()
            .insert(group.to_string());
        added
    }

    /// Remove `conn_id` from `group`. Leaving a group the connection is not
    /// in is a no-op returning `false`.
    pub async fn leave(&self, conn_id: &str, group: &str) -> bool {
        let mut inner = self.inner.write().await;
        let removed = remove_member(&mut inner.groups, group, conn_id);
        remove_member(&mut inner.connections, conn_id, group);
        removed
    }

    /// Current members of `group` (empty for an unknown group).
    pub async fn members(&self, group: &str) -> Vec<ConnectionId> {
        self.inner
            .read()
            .await
            .groups
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Groups `conn_id` currently belongs to.
    pub async fn groups_of(&self, conn_id: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .connections
            .get(conn_id)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove `conn_id` from every group it belongs to and return those
    /// groups. Idempotent: an unknown connection yields an empty list.
    pub async fn drop_connection(&self, conn_id: &str) -> Vec<String> {
        let mut inner = self.inner.write().await;
        let Some(groups) = inner.connections.remove(conn_id) else {
            return Vec::new();
        };
        for group in &groups {
            remove_member(&mut inner.groups, group, conn_id);
        }
        groups.into_iter().collect()
    }

    /// Number of groups with at least one member.
    pub async fn group_count(&self) -> usize {
        self.inner.read().await.groups.len()
    }
}

/// Remove `member` from the set at `key`, dropping the set when it empties.
fn remove_member(map: &mut HashMap<String, HashSet<String>>, key: &str, member: &str) -> bool {
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    let removed = set.remove(member);
    if set.is_empty() {
        map.remove(key);
    }
    removed
}
