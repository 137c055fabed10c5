use std::sync::Arc;

use crate::ws::hub::Hub;

/// Spawn a background task that pings every connection and closes the
/// ones that stopped answering, once per heartbeat interval.
///
/// The returned `JoinHandle` is aborted during shutdown.
pub fn start_heartbeat(hub: Arc<Hub>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(hub.config().heartbeat_interval);

        loop {
            interval.tick().await;
            let evicted = hub.sweep_stale().await;
            if !evicted.is_empty() {
                tracing::info!(count = evicted.len(), "Closed stale push connections");
            }
            let count = hub.connection_count().await;
            tracing::debug!(count, "Push heartbeat ping");
            hub.ping_all().await;
        }
    })
}
