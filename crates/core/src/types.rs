/// User and tenant ids issued by the relational store.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque identifier of one live push connection (UUID v4 string).
pub type ConnectionId = String;

/// Generate a fresh connection identifier.
pub fn new_connection_id() -> ConnectionId {
    uuid::Uuid::new_v4().to_string()
}
