/// Why a single connection attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// The server refused the credentials. Not retried.
    #[error("Credentials rejected by server")]
    Unauthorized,

    /// The connect call or the handshake did not finish in time.
    #[error("Timed out during {0}")]
    Timeout(&'static str),

    /// Network-level failure; recoverable by reconnecting.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server spoke something other than the push protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ConnectError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ConnectError::Unauthorized)
    }
}

/// Errors surfaced by the client API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The manager was stopped; no further commands are accepted.
    #[error("Connection manager stopped")]
    Stopped,

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The snapshot endpoint returned a non-2xx status code.
    #[error("Snapshot endpoint error ({status}): {body}")]
    Status { status: u16, body: String },
}
