use async_trait::async_trait;
use pulse_core::groups;
use pulse_core::types::DbId;
use pulse_core::CoreError;

/// Identity attached to a connection once its credentials are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: DbId,
    pub tenant_id: Option<DbId>,
    pub role: String,
}

impl Principal {
    /// Whether this principal may join `group`.
    ///
    /// Tenant and user groups are private to their owner; every other group
    /// is open to any authenticated connection.
    pub fn may_join(&self, group: &str) -> bool {
        if let Some(tenant_id) = groups::tenant_id_of(group) {
            return self.tenant_id == Some(tenant_id);
        }
        if let Some(user_id) = groups::user_id_of(group) {
            return self.user_id == user_id;
        }
        true
    }
}

/// Checks the credentials a client presents when it connects.
///
/// The hub treats this as an opaque collaborator: an `Err` means the
/// connection is refused.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, credentials: &str) -> Result<Principal, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(tenant_id: Option<DbId>) -> Principal {
        Principal {
            user_id: 9,
            tenant_id,
            role: "agent".into(),
        }
    }

    #[test]
    fn tenant_groups_are_private() {
        let p = principal(Some(3));
        assert!(p.may_join("tenant-3"));
        assert!(!p.may_join("tenant-4"));
        assert!(!principal(None).may_join("tenant-3"));
    }

    #[test]
    fn user_groups_are_private() {
        let p = principal(None);
        assert!(p.may_join("user-9"));
        assert!(!p.may_join("user-10"));
    }

    #[test]
    fn other_groups_are_open() {
        let p = principal(None);
        assert!(p.may_join("dashboard"));
        assert!(p.may_join("project-42"));
    }
}
