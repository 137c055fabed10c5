//! Typed push messages.
//!
//! A [`Notice`] is what business logic hands to the hub: the message
//! content without a delivery scope or timestamp. The hub stamps it at
//! publish time with [`Notice::publish`], producing an immutable
//! [`Message`] that is fanned out to connections.
//!
//! On the wire a message is a flat camelCase JSON object:
//!
//! ```text
//! {type, entityType?, entityId?, title?, message?, severity, data,
//!  timestamp, userId?, groupId?}
//! ```
//!
//! Exactly one of `userId` / `groupId` carries the delivery scope.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of state change a message announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    EntityCreated,
    EntityUpdated,
    EntityDeleted,
    WorkflowStarted,
    WorkflowProgress,
    WorkflowCompleted,
    WorkflowFailed,
    SystemAlert,
}

impl MessageType {
    /// Wire name of the type tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::EntityCreated => "entity_created",
            MessageType::EntityUpdated => "entity_updated",
            MessageType::EntityDeleted => "entity_deleted",
            MessageType::WorkflowStarted => "workflow_started",
            MessageType::WorkflowProgress => "workflow_progress",
            MessageType::WorkflowCompleted => "workflow_completed",
            MessageType::WorkflowFailed => "workflow_failed",
            MessageType::SystemAlert => "system_alert",
        }
    }

    /// Whether this type describes an entity lifecycle change.
    pub fn is_entity_change(&self) -> bool {
        matches!(
            self,
            MessageType::EntityCreated | MessageType::EntityUpdated | MessageType::EntityDeleted
        )
    }

    /// Whether this type describes workflow (job/document) progress.
    pub fn is_workflow(&self) -> bool {
        matches!(
            self,
            MessageType::WorkflowStarted
                | MessageType::WorkflowProgress
                | MessageType::WorkflowCompleted
                | MessageType::WorkflowFailed
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How prominently a client should surface a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    Critical,
}

/// Delivery target of a message: one user's connections or one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    User(DbId),
    Group(String),
}

impl Scope {
    pub fn group(name: impl Into<String>) -> Self {
        Scope::Group(name.into())
    }

    /// Group-style name of the audience: the group itself, or `user-{id}`.
    pub fn audience(&self) -> String {
        match self {
            Scope::User(id) => crate::groups::user(*id),
            Scope::Group(name) => name.clone(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::User(id) => write!(f, "user:{id}"),
            Scope::Group(name) => write!(f, "group:{name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Notice
// ---------------------------------------------------------------------------

/// Message content before it is scoped and stamped.
///
/// Built with [`Notice::new`] and the `with_*` builder methods.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    kind: MessageType,
    entity_type: Option<String>,
    entity_id: Option<String>,
    title: Option<String>,
    message: Option<String>,
    severity: Severity,
    data: serde_json::Value,
}

impl Notice {
    /// Create a notice with only the type tag; severity defaults to `Info`
    /// and data to an empty object.
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            entity_type: None,
            entity_id: None,
            title: None,
            message: None,
            severity: Severity::default(),
            data: serde_json::Value::Object(Default::default()),
        }
    }

    /// Attach the entity this notice is about.
    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl fmt::Display) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    /// Attach an entity type without a specific id (e.g. `"metrics"`).
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
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

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// Scope and stamp the notice, producing an immutable [`Message`].
    pub fn publish(self, scope: Scope, timestamp: Timestamp) -> Message {
        Message {
            kind: self.kind,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            title: self.title,
            message: self.message,
            severity: self.severity,
            data: self.data,
            timestamp,
            scope,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A scoped, timestamped push message. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage", into = "WireMessage")]
pub struct Message {
    kind: MessageType,
    entity_type: Option<String>,
    entity_id: Option<String>,
    title: Option<String>,
    message: Option<String>,
    severity: Severity,
    data: serde_json::Value,
    timestamp: Timestamp,
    scope: Scope,
}

impl Message {
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Key under which a client keeps the latest observed value for the
    /// entity this message describes.
    ///
    /// `"{entityType}:{entityId}"` for a single entity. Aggregates without an
    /// id (tenant metrics, alerts) are kept per audience, e.g.
    /// `"metrics:tenant-3"`, so one tenant's value never replaces another's.
    pub fn state_key(&self) -> String {
        match (&self.entity_type, &self.entity_id) {
            (Some(kind), Some(id)) => format!("{kind}:{id}"),
            (Some(kind), None) => format!("{kind}:{}", self.scope.audience()),
            _ => format!("{}:{}", self.kind.as_str(), self.scope.audience()),
        }
    }
}

/// Flat wire representation of a [`Message`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(rename = "type")]
    kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    data: serde_json::Value,
    timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_id: Option<String>,
}

impl TryFrom<WireMessage> for Message {
    type Error = CoreError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let scope = match (wire.user_id, wire.group_id) {
            (Some(user_id), None) => Scope::User(user_id),
            (None, Some(group_id)) => Scope::Group(group_id),
            (Some(_), Some(_)) => {
                return Err(CoreError::MalformedMessage(
                    "message carries both userId and groupId".into(),
                ))
            }
            (None, None) => {
                return Err(CoreError::MalformedMessage(
                    "message carries neither userId nor groupId".into(),
                ))
            }
        };

        Ok(Message {
            kind: wire.kind,
            entity_type: wire.entity_type,
            entity_id: wire.entity_id,
            title: wire.title,
            message: wire.message,
            severity: wire.severity,
            data: wire.data,
            timestamp: wire.timestamp,
            scope,
        })
    }
}

impl From<Message> for WireMessage {
    fn from(msg: Message) -> Self {
        let (user_id, group_id) = match msg.scope {
            Scope::User(id) => (Some(id), None),
            Scope::Group(name) => (None, Some(name)),
        };
        WireMessage {
            kind: msg.kind,
            entity_type: msg.entity_type,
            entity_id: msg.entity_id,
            title: msg.title,
            message: msg.message,
            severity: msg.severity,
            data: msg.data,
            timestamp: msg.timestamp,
            user_id,
            group_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn lead_update() -> Message {
        Notice::new(MessageType::EntityUpdated)
            .with_entity("lead", 42)
            .with_title("Lead updated")
            .with_severity(Severity::Success)
            .with_data(json!({"status": "qualified"}))
            .publish(Scope::group("lead-42"), Utc::now())
    }

    #[test]
    fn serializes_to_flat_camel_case_shape() {
        let value = serde_json::to_value(lead_update()).unwrap();

        assert_eq!(value["type"], "entity_updated");
        assert_eq!(value["entityType"], "lead");
        assert_eq!(value["entityId"], "42");
        assert_eq!(value["severity"], "success");
        assert_eq!(value["groupId"], "lead-42");
        assert_eq!(value["data"]["status"], "qualified");
        assert!(value.get("userId").is_none());
        assert!(value.get("message").is_none());
    }

    #[test]
    fn user_scope_uses_user_id_field() {
        let msg = Notice::new(MessageType::SystemAlert).publish(Scope::User(7), Utc::now());
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["userId"], 7);
        assert!(value.get("groupId").is_none());
    }

    #[test]
    fn rejects_both_scopes() {
        let raw = json!({
            "type": "system_alert",
            "severity": "warning",
            "data": {},
            "timestamp": "2024-01-01T00:00:00Z",
            "userId": 1,
            "groupId": "dashboard"
        });
        assert!(serde_json::from_value::<Message>(raw).is_err());
    }

    #[test]
    fn rejects_missing_scope() {
        let raw = json!({
            "type": "system_alert",
            "severity": "info",
            "data": {},
            "timestamp": "2024-01-01T00:00:00Z"
        });
        assert!(serde_json::from_value::<Message>(raw).is_err());
    }

    #[test]
    fn wire_round_trip_preserves_message() {
        let original = lead_update();
        let text = serde_json::to_string(&original).unwrap();
        let parsed: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn state_key_prefers_entity_identity() {
        assert_eq!(lead_update().state_key(), "lead:42");

        let alert = Notice::new(MessageType::SystemAlert).publish(Scope::User(1), Utc::now());
        assert_eq!(alert.state_key(), "system_alert:user-1");
    }

    #[test]
    fn aggregate_state_is_kept_per_audience() {
        let metrics = |tenant: &str| {
            Notice::new(MessageType::EntityUpdated)
                .with_entity_type("metrics")
                .publish(Scope::group(tenant), Utc::now())
        };
        assert_eq!(metrics("tenant-3").state_key(), "metrics:tenant-3");
        assert_ne!(
            metrics("tenant-3").state_key(),
            metrics("tenant-4").state_key()
        );
    }

    #[test]
    fn type_classification() {
        assert!(MessageType::EntityDeleted.is_entity_change());
        assert!(!MessageType::EntityDeleted.is_workflow());
        assert!(MessageType::WorkflowFailed.is_workflow());
        assert!(!MessageType::SystemAlert.is_entity_change());
    }
}
