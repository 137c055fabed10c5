//! Event-to-push routing.
//!
//! [`EventPublisher`] subscribes to the event bus and, for each
//! [`DomainEvent`], invalidates the cache entries the change made stale,
//! records the new state for pollers, then pushes the change to every
//! group watching the entity.

use std::sync::Arc;

use pulse_cache::Cache;
use pulse_core::{groups, Scope};
use pulse_events::DomainEvent;
use tokio::sync::broadcast;

use crate::snapshot::{SnapshotService, StateRecords, View};
use crate::ws::{DeliveryReport, Hub};

/// Routes domain events to cache invalidation and push delivery.
pub struct EventPublisher {
    hub: Arc<Hub>,
    cache: Cache,
    records: StateRecords,
    snapshots: Arc<SnapshotService>,
}

impl EventPublisher {
    pub fn new(
        hub: Arc<Hub>,
        cache: Cache,
        records: StateRecords,
        snapshots: Arc<SnapshotService>,
    ) -> Self {
        Self {
            hub,
            cache,
            records,
            snapshots,
        }
    }

    /// Run the main routing loop.
    ///
    /// The loop exits when the channel is closed (i.e. the
    /// [`EventBus`](pulse_events::EventBus) is dropped).
    pub async fn run(self, mut receiver: broadcast::Receiver<DomainEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    self.publish(&event).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Skipped changes reach clients through their next poll.
                    tracing::warn!(skipped = n, "Event publisher lagged");
                    self.snapshots.invalidate().await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event publisher shutting down");
                    break;
                }
            }
        }
    }

    /// Invalidate, record and deliver a single event.
    ///
    /// The event is stamped and recorded before anyone receives it, so a
    /// poll never returns a snapshot newer than the push but without it.
    /// It reaches each watching connection once, however many of its
    /// groups the connection has joined.
    pub async fn publish(&self, event: &DomainEvent) -> Option<DeliveryReport> {
        let invalidated = self.invalidate(event).await;

        let scopes = scopes(event);
        let primary = scopes.first()?.clone();
        let notice = event.notice();
        let view = recorded_view(event);
        let records = &self.records;

        let timestamp = self
            .snapshots
            .commit(self.hub.clock(), |timestamp| {
                let message = notice.clone().publish(primary, timestamp);
                async move {
                    if let Some(view) = view {
                        records.apply(view, &message).await;
                    }
                }
            })
            .await;
        let report = self.hub.deliver(&scopes, notice, timestamp).await;

        tracing::debug!(
            kind = %event.kind,
            entity_type = %event.entity_type,
            entity_id = ?event.entity_id,
            invalidated,
            recorded = view.is_some(),
            delivered = report.as_ref().map_or(0, |r| r.delivered.len()),
            "Event published"
        );
        report
    }

    /// Drop every cache entry derived from the changed entity, its parent
    /// and its tenant. Returns the number of keys removed.
    async fn invalidate(&self, event: &DomainEvent) -> usize {
        let mut removed = 0;
        if let Some(id) = &event.entity_id {
            removed += self.cache.invalidate_entity(&event.entity_type, id).await;
            self.cache.bump_version(&event.entity_type, id).await;
        }
        if let Some((parent_type, parent_id)) = &event.parent {
            removed += self.cache.invalidate_entity(parent_type, parent_id).await;
        }
        if let Some(tenant_id) = event.tenant_id {
            let pattern = self.cache.keys().entity_pattern("tenant", tenant_id);
            removed += self.cache.invalidate(&pattern).await;
        }
        removed
    }
}

/// Audiences of an event.
///
/// A user-addressed event reaches that user alone. Otherwise the event's
/// audience is its tenant group, or the dashboard group for shared state.
/// Entity changes also reach the entity's group and its parent's group;
/// aggregates without an id reach their audience only, which also keys
/// their state.
pub fn scopes(event: &DomainEvent) -> Vec<Scope> {
    if let Some(user_id) = event.target_user_id {
        return vec![Scope::User(user_id)];
    }

    let audience = Scope::group(match event.tenant_id {
        Some(tenant_id) => groups::tenant(tenant_id),
        None => groups::dashboard(),
    });
    let Some(id) = &event.entity_id else {
        return vec![audience];
    };

    let mut scopes = vec![Scope::group(groups::entity(&event.entity_type, id))];
    if let Some((parent_type, parent_id)) = &event.parent {
        scopes.push(Scope::group(groups::entity(parent_type, parent_id)));
    }
    scopes.push(audience);
    scopes
}

/// Snapshot view an event's state is recorded under. User-addressed
/// events are not recorded: snapshots are shared by a whole view.
fn recorded_view(event: &DomainEvent) -> Option<View> {
    match event.target_user_id {
        Some(_) => None,
        None => Some(View::for_tenant(event.tenant_id)),
    }
}

#[cfg(test)]
mod tests {
    use pulse_core::MessageType;

    use super::*;

    #[test]
    fn lead_change_reaches_lead_project_and_dashboard() {
        let event = DomainEvent::lead_changed(MessageType::EntityUpdated, 7, 42);
        assert_eq!(
            scopes(&event),
            vec![
                Scope::group("lead-7"),
                Scope::group("project-42"),
                Scope::group("dashboard"),
            ]
        );
    }

    #[test]
    fn tenant_metrics_reach_tenant_group_only() {
        let event = DomainEvent::metrics_recomputed(3, serde_json::json!({}));
        assert_eq!(scopes(&event), vec![Scope::group("tenant-3")]);
        assert_eq!(recorded_view(&event), Some(View::Tenant(3)));
    }

    #[test]
    fn tenant_entity_change_skips_dashboard() {
        let event = DomainEvent::lead_changed(MessageType::EntityUpdated, 7, 42).with_tenant(3);
        assert_eq!(
            scopes(&event),
            vec![
                Scope::group("lead-7"),
                Scope::group("project-42"),
                Scope::group("tenant-3"),
            ]
        );
    }

    #[test]
    fn user_targeted_event_skips_groups_and_records() {
        let event = DomainEvent::document_progress(1, 2, 50).for_user(11);
        assert_eq!(scopes(&event), vec![Scope::User(11)]);
        assert_eq!(recorded_view(&event), None);
    }
}
