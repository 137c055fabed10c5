//! Connection lifecycle states, shared by the hub and the client manager.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one push connection.
///
/// The hub tracks `Open`, `Degraded` and `Closing` for each socket it
/// serves; the client manager walks the full cycle
/// `Idle → Connecting → Open ⇄ Degraded → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not started.
    Idle,
    /// Transport or handshake in progress.
    Connecting,
    Open,
    /// Still connected, but the peer missed a heartbeat.
    Degraded,
    /// Close requested, not yet confirmed.
    Closing,
    /// Terminal for this connection instance.
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }

    /// Whether messages can currently be delivered over the connection.
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Degraded)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
