/// Errors raised by the shared wire types and credential checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A frame decoded but violates the message invariants (e.g. a
    /// message addressed to both a user and a group).
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Credentials were missing, invalid or expired.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}
