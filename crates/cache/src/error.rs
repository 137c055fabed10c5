/// Errors raised by cache backends and serializers.
///
/// The [`Cache`](crate::Cache) facade logs these and degrades to miss
/// semantics; they only surface directly when a
/// [`CacheStore`](crate::CacheStore) is used on its own.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backing store could not be reached or rejected the command.
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// The operation does not apply to the kind of value stored at the key
    /// (e.g. incrementing a set).
    #[error("Wrong value type at key {0}")]
    WrongType(String),

    /// A key pattern could not be compiled.
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    /// Encoding or decoding a value failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
