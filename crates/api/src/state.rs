use std::sync::Arc;
use std::time::Duration;

use pulse_cache::Cache;

use crate::config::ServerConfig;
use crate::snapshot::{SnapshotService, SnapshotSource};
use crate::ws::Hub;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Push hub (connections and groups).
    pub hub: Arc<Hub>,
    pub cache: Cache,
    /// Polling fallback.
    pub snapshots: Arc<SnapshotService>,
    /// Event bus domain code publishes state changes on.
    pub event_bus: Arc<pulse_events::EventBus>,
}

impl AppState {
    /// Wire the shared services around an existing hub and cache.
    pub fn new(
        config: ServerConfig,
        hub: Arc<Hub>,
        cache: Cache,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        let ttl = Duration::from_secs(config.snapshot_ttl_secs);
        Self {
            config: Arc::new(config),
            hub,
            snapshots: Arc::new(SnapshotService::new(source, cache.clone(), ttl)),
            cache,
            event_bus: Arc::new(pulse_events::EventBus::default()),
        }
    }
}
