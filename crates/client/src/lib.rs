//! Client side of the Pulse push channel.
//!
//! A [`ConnectionManager`] keeps one push connection to the hub alive,
//! replays group memberships after reconnects and hands every accepted
//! change to [`Subscribers`]. A [`Poller`] fetches full snapshots on a
//! fixed interval, independent of the push channel. Both feed the same
//! [`StateStore`], which keeps the newest value per key.
//!
//! ```no_run
//! # async fn demo() -> Result<(), pulse_client::ClientError> {
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use pulse_client::{
//!     ClientConfig, ConnectionManager, HttpSnapshotFetcher, Poller, StateStore, Subscribers,
//!     WsTransport,
//! };
//!
//! let subscribers = Subscribers::new();
//! subscribers.on_lead_update(|msg| {
//!     println!("lead {:?} changed", msg.entity_id());
//!     Ok(())
//! });
//!
//! let store = StateStore::new();
//! let poller = Poller::new(
//!     Arc::new(HttpSnapshotFetcher::new(
//!         "http://localhost:3000/api/v1/dashboard/snapshot",
//!         Some("token".into()),
//!     )),
//!     store.clone(),
//!     subscribers.clone(),
//!     Duration::from_secs(30),
//! );
//! // Seed state before the push channel opens.
//! poller.poll_once().await?;
//!
//! let config = ClientConfig::new("ws://localhost:3000/api/v1/ws").with_token("token");
//! let manager = ConnectionManager::start(config, Arc::new(WsTransport), subscribers, store);
//! manager.join_dashboard()?;
//! manager.join_entity("project", 42)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod manager;
pub mod poller;
pub mod reconnect;
pub mod state_store;
pub mod transport;

pub use config::ClientConfig;
pub use dispatch::{ClientEvent, HandlerResult, SubscriptionId, Subscribers};
pub use error::{ClientError, ConnectError};
pub use manager::ConnectionManager;
pub use poller::{HttpSnapshotFetcher, Poller, SnapshotFetcher};
pub use reconnect::{ReconnectPolicy, ReconnectState};
pub use state_store::StateStore;
pub use transport::{Channel, Transport, WsTransport};
