//! Domain events reported by business logic.

use chrono::{DateTime, Utc};
use pulse_core::message::{MessageType, Notice, Severity};
use pulse_core::types::DbId;
use serde::{Deserialize, Serialize};

/// A state change that happened somewhere in the dashboard's domain.
///
/// Constructed via [`DomainEvent::new`] or one of the shorthand
/// constructors, and enriched with the `with_*` builder methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// What happened.
    pub kind: MessageType,

    /// Entity kind the event is about (e.g. `"lead"`, `"metrics"`).
    pub entity_type: String,

    /// Entity id, when the event concerns a single entity.
    pub entity_id: Option<String>,

    /// Owning entity whose views also change (e.g. the project of a lead).
    pub parent: Option<(String, String)>,

    /// Tenant the entity belongs to.
    pub tenant_id: Option<DbId>,

    /// User that triggered the event.
    pub actor_user_id: Option<DbId>,

    /// When set, the event is delivered to this user only.
    pub target_user_id: Option<DbId>,

    pub title: Option<String>,
    pub message: Option<String>,
    pub severity: Severity,

    /// Free-form JSON payload carrying the new state.
    pub payload: serde_json::Value,

    /// When the event occurred (UTC). Informational; push messages are
    /// stamped again by the hub at publish time.
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Create an event with only the required fields.
    pub fn new(kind: MessageType, entity_type: impl Into<String>) -> Self {
        Self {
            kind,
            entity_type: entity_type.into(),
            entity_id: None,
            parent: None,
            tenant_id: None,
            actor_user_id: None,
            target_user_id: None,
            title: None,
            message: None,
            severity: Severity::Info,
            payload: serde_json::Value::Object(Default::default()),
            occurred_at: Utc::now(),
        }
    }

    /// A lead was created, updated or deleted.
    pub fn lead_changed(kind: MessageType, lead_id: DbId, project_id: DbId) -> Self {
        Self::new(kind, "lead")
            .with_entity_id(lead_id)
            .with_parent("project", project_id)
    }

    /// Dashboard metrics were recomputed for a tenant.
    pub fn metrics_recomputed(tenant_id: DbId, metrics: serde_json::Value) -> Self {
        Self::new(MessageType::EntityUpdated, "metrics")
            .with_tenant(tenant_id)
            .with_payload(metrics)
    }

    /// A document processing job advanced.
    pub fn document_progress(document_id: DbId, project_id: DbId, percent: u8) -> Self {
        let kind = if percent >= 100 {
            MessageType::WorkflowCompleted
        } else {
            MessageType::WorkflowProgress
        };
        Self::new(kind, "document")
            .with_entity_id(document_id)
            .with_parent("project", project_id)
            .with_payload(serde_json::json!({ "progress": percent.min(100) }))
    }

    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn with_parent(mut self, entity_type: impl Into<String>, id: impl ToString) -> Self {
        self.parent = Some((entity_type.into(), id.to_string()));
        self
    }

    pub fn with_tenant(mut self, tenant_id: DbId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    /// Address the event to a single user instead of groups.
    pub fn for_user(mut self, user_id: DbId) -> Self {
        self.target_user_id = Some(user_id);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Build the push-message content for this event.
    pub fn notice(&self) -> Notice {
        let mut notice = match &self.entity_id {
            Some(id) => Notice::new(self.kind).with_entity(self.entity_type.clone(), id),
            None => Notice::new(self.kind).with_entity_type(self.entity_type.clone()),
        };
        if let Some(title) = &self.title {
            notice = notice.with_title(title.clone());
        }
        if let Some(message) = &self.message {
            notice = notice.with_message(message.clone());
        }
        notice
            .with_severity(self.severity)
            .with_data(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_changed_carries_parent_project() {
        let event = DomainEvent::lead_changed(MessageType::EntityUpdated, 7, 42);
        assert_eq!(event.entity_type, "lead");
        assert_eq!(event.entity_id.as_deref(), Some("7"));
        assert_eq!(event.parent, Some(("project".into(), "42".into())));
    }

    #[test]
    fn document_progress_completes_at_hundred() {
        let running = DomainEvent::document_progress(1, 2, 40);
        assert_eq!(running.kind, MessageType::WorkflowProgress);
        assert_eq!(running.payload["progress"], 40);

        let done = DomainEvent::document_progress(1, 2, 120);
        assert_eq!(done.kind, MessageType::WorkflowCompleted);
        assert_eq!(done.payload["progress"], 100);
    }

    #[test]
    fn notice_copies_content() {
        let notice = DomainEvent::metrics_recomputed(3, serde_json::json!({"leads": 10}))
            .with_title("Metrics refreshed")
            .with_severity(Severity::Success)
            .notice();

        assert_eq!(notice.kind(), MessageType::EntityUpdated);
        assert_eq!(notice.entity_type(), Some("metrics"));
        assert_eq!(notice.entity_id(), None);
    }
}
