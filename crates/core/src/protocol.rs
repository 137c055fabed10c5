//! Push-channel protocol frames.
//!
//! Every text frame on the socket is a JSON object discriminated by its
//! `"op"` field. Pushed messages are embedded flat, so a delivered lead
//! update looks like `{"op":"message","type":"entity_updated",...}`.

use serde::{Deserialize, Serialize};

use crate::groups;
use crate::message::Message;
use crate::types::Timestamp;

// ============================================================================
// Client → Server
// ============================================================================

/// Frame sent from a client to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Join the dashboard-wide group.
    JoinDashboard,
    /// Join the group of a single entity (e.g. one project).
    JoinEntity {
        entity_type: String,
        entity_id: String,
    },
    /// Leave the group of a single entity.
    LeaveEntity {
        entity_type: String,
        entity_id: String,
    },
    /// Join an arbitrary named group.
    JoinGroup { group: String },
    /// Leave an arbitrary named group.
    LeaveGroup { group: String },
    /// Liveness signal.
    Ping,
}

/// Membership change requested by a [`ClientCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Join(String),
    Leave(String),
}

impl ClientCommand {
    /// Resolve the command to a concrete group membership change, or `None`
    /// for commands that do not touch membership.
    pub fn membership(&self) -> Option<Membership> {
        match self {
            ClientCommand::JoinDashboard => Some(Membership::Join(groups::dashboard())),
            ClientCommand::JoinEntity {
                entity_type,
                entity_id,
            } => Some(Membership::Join(groups::entity(entity_type, entity_id))),
            ClientCommand::LeaveEntity {
                entity_type,
                entity_id,
            } => Some(Membership::Leave(groups::entity(entity_type, entity_id))),
            ClientCommand::JoinGroup { group } => Some(Membership::Join(group.clone())),
            ClientCommand::LeaveGroup { group } => Some(Membership::Leave(group.clone())),
            ClientCommand::Ping => None,
        }
    }
}

// ============================================================================
// Server → Client
// ============================================================================

/// Frame sent from the hub to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake completed; the connection is Open.
    Welcome {
        connection_id: String,
        /// Interval at which the hub expects client pings.
        heartbeat_interval_ms: u64,
    },
    /// A pushed state change.
    Message(Message),
    /// Confirmation of a group join.
    Joined { group: String },
    /// Confirmation of a group leave.
    Left { group: String },
    /// Reply to [`ClientCommand::Ping`].
    Pong { timestamp: Timestamp },
    /// A command could not be processed.
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::message::{MessageType, Notice, Scope};

    #[test]
    fn parses_client_commands() {
        let cmd: ClientCommand =
            serde_json::from_value(json!({"op": "join_group", "group": "project-42"})).unwrap();
        assert_eq!(
            cmd.membership(),
            Some(Membership::Join("project-42".into()))
        );

        let cmd: ClientCommand = serde_json::from_value(
            json!({"op": "leave_entity", "entity_type": "project", "entity_id": "42"}),
        )
        .unwrap();
        assert_eq!(
            cmd.membership(),
            Some(Membership::Leave("project-42".into()))
        );

        let cmd: ClientCommand = serde_json::from_value(json!({"op": "ping"})).unwrap();
        assert_eq!(cmd.membership(), None);
    }

    #[test]
    fn join_dashboard_resolves_to_dashboard_group() {
        assert_eq!(
            ClientCommand::JoinDashboard.membership(),
            Some(Membership::Join("dashboard".into()))
        );
    }

    #[test]
    fn message_frame_embeds_message_flat() {
        let msg = Notice::new(MessageType::WorkflowProgress)
            .with_entity("document", 5)
            .with_data(json!({"progress": 40}))
            .publish(Scope::group("document-5"), Utc::now());

        let value = serde_json::to_value(ServerFrame::Message(msg.clone())).unwrap();
        assert_eq!(value["op"], "message");
        assert_eq!(value["type"], "workflow_progress");
        assert_eq!(value["groupId"], "document-5");

        let parsed: ServerFrame = serde_json::from_value(value).unwrap();
        assert_matches!(parsed, ServerFrame::Message(m) if m == msg);
    }

    #[test]
    fn unknown_op_is_rejected() {
        assert!(serde_json::from_value::<ClientCommand>(json!({"op": "shout"})).is_err());
    }
}
