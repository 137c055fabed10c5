//! Cache key grammar.
//!
//! Every key is `{prefix}:{resource}:{id}[:{sub}]`. Invalidation patterns
//! are built from the same grammar so an entity's whole cascade of derived
//! keys can be swept with one pattern:
//!
//! ```text
//! pulse:project:42               project 42 itself
//! pulse:project:42:leads         derived: the project's lead table
//! pulse:project:42:*             everything derived from project 42
//! pulse:tenant:7:*               everything scoped under tenant 7
//! ```
//!
//! Segments are escaped: `%`, `:` and glob metacharacters inside a segment
//! are percent-encoded (`1:2` becomes `1%3A2`), so a caller-supplied id can
//! never widen a pattern or forge another resource's key, and distinct ids
//! always yield distinct keys. Generation counters live outside the
//! entity namespace (`{prefix}:version:{resource}:{id}`) so sweeping an
//! entity does not reset its version.

use std::fmt::Display;

/// Builds namespaced keys and invalidation patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    prefix: String,
}

fn segment(raw: impl Display) -> String {
    let raw = raw.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' | ':' | '*' | '?' | '[' | ']' | '{' | '}' | '\\' => {
                out.push_str(&format!("%{:02X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

impl CacheKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: segment(prefix.into()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}:{resource}:{id}`
    pub fn key(&self, resource: &str, id: impl Display) -> String {
        format!("{}:{}:{}", self.prefix, segment(resource), segment(id))
    }

    /// `{prefix}:{resource}:{id}:{sub}`
    pub fn sub_key(&self, resource: &str, id: impl Display, sub: &str) -> String {
        format!("{}:{}", self.key(resource, id), segment(sub))
    }

    /// Pattern matching every key derived from one entity (not the entity
    /// key itself).
    pub fn entity_pattern(&self, resource: &str, id: impl Display) -> String {
        format!("{}:*", self.key(resource, id))
    }

    /// Pattern matching every key of a resource type.
    pub fn resource_pattern(&self, resource: &str) -> String {
        format!("{}:{}:*", self.prefix, segment(resource))
    }

    /// Pattern matching every key under this prefix.
    pub fn all_pattern(&self) -> String {
        format!("{}:*", self.prefix)
    }

    /// Generation counter of one entity.
    pub fn version_key(&self, resource: &str, id: impl Display) -> String {
        format!(
            "{}:version:{}:{}",
            self.prefix,
            segment(resource),
            segment(id)
        )
    }

    // ---- domain helpers ----

    pub fn lead(&self, lead_id: impl Display) -> String {
        self.key("lead", lead_id)
    }

    pub fn project_leads(&self, project_id: impl Display) -> String {
        self.sub_key("project", project_id, "leads")
    }

    pub fn tenant_metrics(&self, tenant_id: impl Display) -> String {
        self.sub_key("tenant", tenant_id, "metrics")
    }

    /// Cached provider (LLM) response, keyed by a digest of its input.
    pub fn llm_response(&self, input_digest: &str) -> String {
        self.key("llm", input_digest)
    }

    pub fn snapshot(&self, name: &str) -> String {
        self.key("snapshot", name)
    }
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self::new("pulse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern;

    fn glob_match(pattern: &str, key: &str) -> bool {
        pattern::compile(pattern).unwrap().is_match(key)
    }

    #[test]
    fn builds_keys_from_grammar() {
        let keys = CacheKeys::new("pulse");
        assert_eq!(keys.key("lead", 42), "pulse:lead:42");
        assert_eq!(keys.sub_key("project", 42, "leads"), "pulse:project:42:leads");
        assert_eq!(keys.project_leads(42), "pulse:project:42:leads");
        assert_eq!(keys.tenant_metrics(7), "pulse:tenant:7:metrics");
        assert_eq!(keys.snapshot("dashboard"), "pulse:snapshot:dashboard");
    }

    #[test]
    fn entity_pattern_covers_derived_keys_only() {
        let keys = CacheKeys::default();
        let pattern = keys.entity_pattern("project", 42);

        assert!(glob_match(&pattern, &keys.project_leads(42)));
        assert!(glob_match(&pattern, &keys.sub_key("project", 42, "stats")));
        assert!(!glob_match(&pattern, &keys.project_leads(420)));
        assert!(!glob_match(&pattern, &keys.key("project", 42)));
        assert!(!glob_match(&pattern, &keys.version_key("project", 42)));
    }

    #[test]
    fn hostile_ids_are_escaped() {
        let keys = CacheKeys::default();
        assert_eq!(keys.key("lead", "1:*"), "pulse:lead:1%3A%2A");
        assert_eq!(keys.key("lead", "{a,b}"), "pulse:lead:%7Ba,b%7D");

        let pattern = keys.entity_pattern("tenant", "*");
        assert!(!glob_match(&pattern, &keys.tenant_metrics(7)));
    }

    #[test]
    fn distinct_ids_never_share_a_key() {
        let keys = CacheKeys::default();
        assert_ne!(keys.key("lead", "1:2"), keys.key("lead", "1_2"));
        assert_ne!(keys.key("lead", "1:2"), keys.key("lead", "1%3A2"));
        assert_eq!(keys.key("state", "lead:7"), "pulse:state:lead%3A7");
    }

    #[test]
    fn resource_and_prefix_patterns() {
        let keys = CacheKeys::new("app");
        assert!(glob_match(&keys.resource_pattern("lead"), "app:lead:1"));
        assert!(!glob_match(&keys.resource_pattern("lead"), "app:project:1"));
        assert!(glob_match(&keys.all_pattern(), "app:project:1:leads"));
        assert!(!glob_match(&keys.all_pattern(), "other:project:1"));
    }
}
