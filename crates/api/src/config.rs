use std::time::Duration;

use pulse_cache::CacheConfig;

use crate::auth::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on each post-shutdown drain step in seconds (default: `5`).
    pub shutdown_timeout_secs: u64,
    /// How long an assembled polling snapshot is served from cache
    /// (default: `10`).
    pub snapshot_ttl_secs: u64,
    /// JWT token configuration.
    pub jwt: JwtConfig,
    /// Push hub liveness settings.
    pub hub: HubConfig,
    /// Cache backend selection.
    pub cache: CacheConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `5`                        |
    /// | `SNAPSHOT_TTL_SECS`    | `10`                       |
    ///
    /// See also [`JwtConfig::from_env`], [`HubConfig::from_env`] and
    /// [`CacheConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_u64("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_u64("SHUTDOWN_TIMEOUT_SECS", 5),
            snapshot_ttl_secs: env_u64("SNAPSHOT_TTL_SECS", 10),
            jwt: JwtConfig::from_env(),
            hub: HubConfig::from_env(),
            cache: CacheConfig::from_env(),
        }
    }
}

/// Liveness settings of the push hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// How often the hub pings every connection; also advertised to
    /// clients in the welcome frame as their own ping cadence.
    pub heartbeat_interval: Duration,
    /// A connection silent for longer than this is closed.
    pub heartbeat_timeout: Duration,
}

impl HubConfig {
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `HEARTBEAT_INTERVAL_SECS` | `15`    |
    /// | `HEARTBEAT_TIMEOUT_SECS`  | `45`    |
    pub fn from_env() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(env_u64("HEARTBEAT_INTERVAL_SECS", 15)),
            heartbeat_timeout: Duration::from_secs(env_u64("HEARTBEAT_TIMEOUT_SECS", 45)),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(45),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        Err(_) => default,
    }
}
