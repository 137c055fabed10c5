use std::time::Duration;

use crate::reconnect::ReconnectPolicy;

/// Connection manager settings.
///
/// Built with [`ClientConfig::new`] and the `with_*` overrides; every
/// timeout has a default suitable for a dashboard on a flaky network.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Push endpoint, e.g. `ws://host:3000/api/v1/ws`.
    pub url: String,
    /// Access token presented on every connect.
    pub token: Option<String>,
    /// Ping cadence while open, used until the server advertises its own
    /// in the welcome frame (default: 15s).
    pub heartbeat_interval: Duration,
    /// How long to wait for any frame after a ping (default: 10s).
    pub heartbeat_timeout: Duration,
    /// Bound on each transport connect call (default: 10s).
    pub connect_timeout: Duration,
    /// Bound on waiting for the welcome frame (default: 10s).
    pub handshake_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}
