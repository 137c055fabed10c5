//! Glob patterns for cache key sweeps.
//!
//! Patterns use Redis `SCAN MATCH` syntax: `*` spans any run of characters
//! including `:`, `?` matches exactly one character and `\` escapes the
//! next one. [`MemoryStore`](crate::MemoryStore) compiles them with
//! `globset` so both backends select the same keys.

use globset::{GlobBuilder, GlobMatcher};

use crate::error::CacheError;

/// Compile a key pattern into a matcher.
pub fn compile(pattern: &str) -> Result<GlobMatcher, CacheError> {
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .backslash_escape(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| CacheError::InvalidPattern(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, key: &str) -> bool {
        compile(pattern).unwrap().is_match(key)
    }

    #[test]
    fn exact_match() {
        assert!(matches("pulse:lead:42", "pulse:lead:42"));
        assert!(!matches("pulse:lead:42", "pulse:lead:420"));
        assert!(!matches("pulse:lead:42", "pulse:lead:4"));
    }

    #[test]
    fn star_spans_segments() {
        assert!(matches("pulse:project:42:*", "pulse:project:42:leads"));
        assert!(matches("pulse:project:42:*", "pulse:project:42:leads:page:1"));
        assert!(!matches("pulse:project:42:*", "pulse:project:420:leads"));
        assert!(!matches("pulse:project:42:*", "pulse:project:42"));
        assert!(matches("*", "anything"));
        assert!(matches("pulse:*:42", "pulse:lead:42"));
        assert!(matches("a*b*c", "axxbyyc"));
        assert!(!matches("a*b*c", "axxbyy"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        assert!(matches("pulse:lead:4?", "pulse:lead:42"));
        assert!(!matches("pulse:lead:4?", "pulse:lead:4"));
    }

    #[test]
    fn escaped_metacharacters_are_literal() {
        assert!(matches(r"a\*b", "a*b"));
        assert!(!matches(r"a\*b", "axb"));
    }
}
