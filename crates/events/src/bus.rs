//! Broadcast channel carrying [`DomainEvent`]s from business code to the
//! push publisher. Shared as `Arc<EventBus>`.

use tokio::sync::broadcast;

use crate::event::DomainEvent;

/// Events buffered per subscriber before the oldest are dropped.
const DEFAULT_CAPACITY: usize = 1024;

/// Every subscriber sees every event published after it subscribed.
///
/// ```rust
/// use pulse_core::message::MessageType;
/// use pulse_events::{DomainEvent, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(DomainEvent::lead_changed(MessageType::EntityCreated, 1, 42));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// When the buffer is full, the oldest un-consumed events are dropped
    /// and slow receivers observe a `RecvError::Lagged`. The polling
    /// fallback covers whatever a lagging publisher misses.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that will see it; zero means the
    /// event was dropped.
    pub fn publish(&self, event: DomainEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::debug!(
                    kind = %event.kind,
                    entity_type = %event.entity_type,
                    "Event published with no subscribers"
                );
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use pulse_core::message::MessageType;

    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = DomainEvent::lead_changed(MessageType::EntityUpdated, 7, 42)
            .with_actor(3)
            .with_payload(serde_json::json!({"status": "won"}));

        assert_eq!(bus.publish(event), 1);

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.kind, MessageType::EntityUpdated);
        assert_eq!(received.entity_id.as_deref(), Some("7"));
        assert_eq!(received.actor_user_id, Some(3));
        assert_eq!(received.payload["status"], "won");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(DomainEvent::metrics_recomputed(1, serde_json::json!({})));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.entity_type, "metrics");
        assert_eq!(e2.entity_type, "metrics");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(DomainEvent::document_progress(1, 1, 10)), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
