//! Group naming conventions.
//!
//! Group names are plain strings on the wire; these helpers keep the
//! server, the publisher and the client agreeing on their spelling.

use std::fmt::Display;

use crate::types::DbId;

/// Name of the dashboard-wide group every dashboard view joins.
pub const DASHBOARD: &str = "dashboard";

/// Dashboard-wide group.
pub fn dashboard() -> String {
    DASHBOARD.to_string()
}

/// Per-entity group, e.g. `entity("project", 42)` → `"project-42"`.
pub fn entity(entity_type: &str, entity_id: impl Display) -> String {
    format!("{entity_type}-{entity_id}")
}

/// Per-tenant group.
pub fn tenant(tenant_id: DbId) -> String {
    entity("tenant", tenant_id)
}

/// Per-user group.
pub fn user(user_id: DbId) -> String {
    entity("user", user_id)
}

/// Parse a tenant group name back into its tenant id.
pub fn tenant_id_of(group: &str) -> Option<DbId> {
    group.strip_prefix("tenant-")?.parse().ok()
}

/// Parse a user group name back into its user id.
pub fn user_id_of(group: &str) -> Option<DbId> {
    group.strip_prefix("user-")?.parse().ok()
}
