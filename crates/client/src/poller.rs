//! Snapshot polling: seeds state before the push channel opens and keeps
//! correcting it afterwards, whatever the push channel's state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulse_core::Snapshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{ClientEvent, Subscribers};
use crate::error::ClientError;
use crate::state_store::StateStore;

/// Retrieves the current full-state snapshot.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot, ClientError>;
}

/// Fetches snapshots from the hub's HTTP endpoint.
pub struct HttpSnapshotFetcher {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpSnapshotFetcher {
    /// * `url` - full snapshot URL, e.g. `http://host:3000/api/v1/dashboard/snapshot`.
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url, token)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl SnapshotFetcher for HttpSnapshotFetcher {
    async fn fetch(&self) -> Result<Snapshot, ClientError> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Snapshot>().await?)
    }
}

/// Periodic snapshot poller feeding the shared [`StateStore`].
pub struct Poller {
    fetcher: Arc<dyn SnapshotFetcher>,
    store: StateStore,
    subscribers: Subscribers,
    interval: Duration,
}

impl Poller {
    pub fn new(
        fetcher: Arc<dyn SnapshotFetcher>,
        store: StateStore,
        subscribers: Subscribers,
        interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            store,
            subscribers,
            interval,
        }
    }

    /// Fetch one snapshot and merge it. Subscribers see the snapshot only
    /// when it changed something.
    pub async fn poll_once(&self) -> Result<Snapshot, ClientError> {
        let snapshot = self.fetcher.fetch().await?;
        let changed = self.store.apply_snapshot(&snapshot).await;
        tracing::debug!(
            entries = snapshot.entries.len(),
            changed,
            "Snapshot polled"
        );
        if changed > 0 {
            self.subscribers
                .dispatch(&ClientEvent::Snapshot(snapshot.clone()));
        }
        Ok(snapshot)
    }

    /// Poll immediately, then every interval, until cancelled. Failed
    /// polls are logged and retried on the next tick.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!(error = %e, "Snapshot poll failed");
                    }
                }
            }
        }
        tracing::debug!("Snapshot poller stopped");
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
