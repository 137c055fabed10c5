//! The push hub: live connections, their identities and group fan-out.
//!
//! Lock order is always `connections` before the group registry. Group
//! joins hold the `connections` read lock while they touch the registry,
//! and [`Hub::on_disconnect`] removes the connection under the write lock
//! before dropping its memberships, so a join racing a disconnect either
//! lands before the drop (and is swept by it) or sees the connection gone.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Bytes;
use axum::extract::ws::Message as WsMessage;
use pulse_core::message::{Message, Notice, Scope};
use pulse_core::types::{new_connection_id, ConnectionId, Timestamp};
use pulse_core::{ConnectionState, MonotonicClock, ServerFrame};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::auth::{CredentialVerifier, Principal};
use crate::config::HubConfig;
use crate::error::HubError;
use crate::ws::registry::GroupRegistry;

/// Channel sender half for pushing frames to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<WsMessage>;

/// Metadata for a single open connection.
pub struct WsConnection {
    pub principal: Principal,
    /// Channel sender for outbound frames to this connection.
    pub sender: WsSender,
    pub connected_at: Timestamp,
    /// Milliseconds since the hub epoch at which the peer was last heard.
    last_seen_ms: AtomicU64,
    state: Mutex<ConnectionState>,
    cancel: CancellationToken,
}

impl WsConnection {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) -> ConnectionState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *state, next)
    }
}

/// An accepted connection, handed to the socket task that serves it.
#[derive(Debug)]
pub struct Admission {
    pub connection_id: ConnectionId,
    pub principal: Principal,
    /// Outbound frames; the welcome frame is already queued.
    pub receiver: mpsc::UnboundedReceiver<WsMessage>,
    /// Cancelled when the hub closes the connection on its own initiative.
    pub cancel: CancellationToken,
}

/// Why a connection left the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent a close frame.
    ClientClosed,
    /// The socket failed or ended without a close frame.
    TransportError,
    /// No traffic from the peer within the heartbeat timeout.
    HeartbeatTimeout,
    /// A multicast found the connection's channel closed.
    DeliveryFailed,
    ServerShutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::ClientClosed => "client_closed",
            DisconnectReason::TransportError => "transport_error",
            DisconnectReason::HeartbeatTimeout => "heartbeat_timeout",
            DisconnectReason::DeliveryFailed => "delivery_failed",
            DisconnectReason::ServerShutdown => "server_shutdown",
        }
    }

    /// Closes the hub initiates itself send a close frame to the peer.
    fn hub_initiated(&self) -> bool {
        matches!(
            self,
            DisconnectReason::HeartbeatTimeout | DisconnectReason::ServerShutdown
        )
    }
}

/// A connection a multicast could not reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub connection_id: ConnectionId,
    pub reason: String,
}

/// Outcome of one [`Hub::multicast`].
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    /// The message as delivered, with its hub timestamp.
    pub message: Message,
    pub delivered: Vec<ConnectionId>,
    pub failed: Vec<DeliveryFailure>,
}

/// Manages all open push connections and their group memberships.
///
/// Thread-safe via interior locks; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct Hub {
    connections: RwLock<HashMap<ConnectionId, WsConnection>>,
    groups: GroupRegistry,
    verifier: Arc<dyn CredentialVerifier>,
    clock: MonotonicClock,
    config: HubConfig,
    epoch: Instant,
}

impl Hub {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, config: HubConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            groups: GroupRegistry::new(),
            verifier,
            clock: MonotonicClock::new(),
            config,
            epoch: Instant::now(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// The clock stamping every pushed message. Snapshots are stamped from
    /// it too, so push and pull timestamps are comparable.
    pub fn clock(&self) -> &MonotonicClock {
        &self.clock
    }

    // ---- connection lifecycle ----

    /// Check credentials without registering anything.
    pub async fn authenticate(&self, credentials: &str) -> Result<Principal, HubError> {
        self.verifier
            .verify(credentials)
            .await
            .map_err(HubError::Rejected)
    }

    /// Register an authenticated connection as `Open` and queue its
    /// welcome frame.
    pub async fn admit(&self, principal: Principal) -> Admission {
        let connection_id = new_connection_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let welcome = ServerFrame::Welcome {
            connection_id: connection_id.clone(),
            heartbeat_interval_ms: self.config.heartbeat_interval.as_millis() as u64,
        };
        if let Some(frame) = encode_frame(&welcome) {
            let _ = tx.send(frame);
        }

        let conn = WsConnection {
            principal: principal.clone(),
            sender: tx,
            connected_at: chrono::Utc::now(),
            last_seen_ms: AtomicU64::new(self.elapsed_ms()),
            state: Mutex::new(ConnectionState::Open),
            cancel: cancel.clone(),
        };
        self.connections
            .write()
            .await
            .insert(connection_id.clone(), conn);

        tracing::info!(
            conn_id = %connection_id,
            user_id = principal.user_id,
            "Connection open"
        );

        Admission {
            connection_id,
            principal,
            receiver: rx,
            cancel,
        }
    }

    /// Authenticate and admit in one step.
    pub async fn on_connect(&self, credentials: &str) -> Result<Admission, HubError> {
        let principal = self.authenticate(credentials).await?;
        Ok(self.admit(principal).await)
    }

    /// Remove a connection and all of its group memberships.
    ///
    /// Idempotent; returns `false` if the connection was already gone.
    pub async fn on_disconnect(&self, conn_id: &str, reason: DisconnectReason) -> bool {
        let removed = self.connections.write().await.remove(conn_id);
        let groups = self.groups.drop_connection(conn_id).await;

        let Some(conn) = removed else {
            return false;
        };

        let previous = conn.set_state(ConnectionState::Closing);
        if reason.hub_initiated() {
            let _ = conn.sender.send(WsMessage::Close(None));
        }
        conn.cancel.cancel();
        conn.set_state(ConnectionState::Closed);

        tracing::info!(
            conn_id,
            user_id = conn.principal.user_id,
            from = %previous,
            reason = reason.as_str(),
            groups = groups.len(),
            "Connection closed"
        );
        true
    }

    /// Record that the peer is alive, restoring a degraded connection.
    pub async fn touch(&self, conn_id: &str) {
        let now = self.elapsed_ms();
        if let Some(conn) = self.connections.read().await.get(conn_id) {
            conn.last_seen_ms.store(now, Ordering::Relaxed);
            if conn.state() == ConnectionState::Degraded {
                conn.set_state(ConnectionState::Open);
                tracing::debug!(conn_id, "Connection recovered");
            }
        }
    }

    /// Mark connections silent for longer than one heartbeat interval as
    /// `Degraded` and close those silent for longer than the timeout.
    ///
    /// Returns the ids of the closed connections.
    pub async fn sweep_stale(&self) -> Vec<ConnectionId> {
        let now = self.elapsed_ms();
        let interval = self.config.heartbeat_interval.as_millis() as u64;
        let timeout = self.config.heartbeat_timeout.as_millis() as u64;

        let stale: Vec<ConnectionId> = {
            let conns = self.connections.read().await;
            conns
                .iter()
                .filter_map(|(id, conn)| {
                    let silent = now.saturating_sub(conn.last_seen_ms.load(Ordering::Relaxed));
                    if silent > timeout {
                        return Some(id.clone());
                    }
                    if silent > interval && conn.state() == ConnectionState::Open {
                        conn.set_state(ConnectionState::Degraded);
                        tracing::debug!(conn_id = %id, silent_ms = silent, "Connection degraded");
                    }
                    None
                })
                .collect()
        };

        for conn_id in &stale {
            self.on_disconnect(conn_id, DisconnectReason::HeartbeatTimeout)
                .await;
        }
        stale
    }

    // ---- groups ----

    /// Add a connection to a group after checking the principal may join it.
    ///
    /// Returns `false` if the connection was already a member.
    pub async fn join_group(&self, conn_id: &str, group: &str) -> Result<bool, HubError> {
        let conns = self.connections.read().await;
        let conn = conns
            .get(conn_id)
            .ok_or_else(|| HubError::ConnectionNotFound(conn_id.to_string()))?;

        if !conn.principal.may_join(group) {
            tracing::warn!(
                conn_id,
                user_id = conn.principal.user_id,
                group,
                "Group join refused"
            );
            return Err(HubError::Forbidden(group.to_string()));
        }

        let added = self.groups.join(conn_id, group).await;
        tracing::debug!(conn_id, group, added, "Joined group");
        Ok(added)
    }

    /// Remove a connection from a group. Leaving a group the connection is
    /// not in is a no-op returning `false`.
    pub async fn leave_group(&self, conn_id: &str, group: &str) -> Result<bool, HubError> {
        let conns = self.connections.read().await;
        if !conns.contains_key(conn_id) {
            return Err(HubError::ConnectionNotFound(conn_id.to_string()));
        }
        let removed = self.groups.leave(conn_id, group).await;
        tracing::debug!(conn_id, group, removed, "Left group");
        Ok(removed)
    }

    pub async fn members(&self, group: &str) -> Vec<ConnectionId> {
        self.groups.members(group).await
    }

    // ---- delivery ----

    /// Stamp `notice` with the hub clock and deliver it to every open
    /// connection in `scope`.
    pub async fn multicast(&self, scope: Scope, notice: Notice) -> DeliveryReport {
        let timestamp = self.clock.now();
        self.fan_out(&scope, std::slice::from_ref(&scope), notice, timestamp)
            .await
    }

    /// Deliver one change to the union of `scopes` under a single hub
    /// timestamp. A connection reachable through several scopes receives
    /// it once, scoped to the first of them that reaches it.
    ///
    /// Returns `None` when `scopes` is empty.
    pub async fn multicast_all(&self, scopes: &[Scope], notice: Notice) -> Option<DeliveryReport> {
        self.deliver(scopes, notice, self.clock.now()).await
    }

    /// Like [`Hub::multicast_all`] for a change already stamped from
    /// [`Hub::clock`], so it can be recorded before anyone receives it.
    pub async fn deliver(
        &self,
        scopes: &[Scope],
        notice: Notice,
        timestamp: Timestamp,
    ) -> Option<DeliveryReport> {
        let primary = scopes.first()?;
        Some(self.fan_out(primary, scopes, notice, timestamp).await)
    }

    /// One dead recipient never blocks the others: its failure is recorded
    /// in the report and the connection is closed.
    async fn fan_out(
        &self,
        primary: &Scope,
        scopes: &[Scope],
        notice: Notice,
        timestamp: Timestamp,
    ) -> DeliveryReport {
        let mut report = DeliveryReport {
            message: notice.clone().publish(primary.clone(), timestamp),
            delivered: Vec::new(),
            failed: Vec::new(),
        };

        {
            let conns = self.connections.read().await;
            let mut reached: HashSet<ConnectionId> = HashSet::new();

            for scope in scopes {
                let targets: Vec<ConnectionId> = match scope {
                    Scope::User(user_id) => conns
                        .iter()
                        .filter(|(_, conn)| conn.principal.user_id == *user_id)
                        .map(|(id, _)| id.clone())
                        .collect(),
                    Scope::Group(group) => self.groups.members(group).await,
                };
                let targets: Vec<ConnectionId> = targets
                    .into_iter()
                    .filter(|id| reached.insert(id.clone()))
                    .collect();
                if targets.is_empty() {
                    continue;
                }

                let message = notice.clone().publish(scope.clone(), timestamp);
                let Some(frame) = encode_frame(&ServerFrame::Message(message)) else {
                    continue;
                };
                for conn_id in targets {
                    let result = match conns.get(&conn_id) {
                        Some(conn) => conn
                            .sender
                            .send(frame.clone())
                            .map_err(|_| "outbound channel closed"),
                        None => Err("connection not registered"),
                    };
                    match result {
                        Ok(()) => report.delivered.push(conn_id),
                        Err(reason) => report.failed.push(DeliveryFailure {
                            connection_id: conn_id,
                            reason: reason.to_string(),
                        }),
                    }
                }
            }
        }

        for failure in &report.failed {
            tracing::warn!(
                conn_id = %failure.connection_id,
                reason = %failure.reason,
                "Delivery failed"
            );
            self.on_disconnect(&failure.connection_id, DisconnectReason::DeliveryFailed)
                .await;
        }

        tracing::debug!(
            scope = %primary,
            scopes = scopes.len(),
            kind = %report.message.kind(),
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Multicast"
        );
        report
    }

    /// Send a protocol frame to one connection.
    pub async fn send_frame(&self, conn_id: &str, frame: &ServerFrame) -> Result<(), HubError> {
        let conns = self.connections.read().await;
        let conn = conns
            .get(conn_id)
            .ok_or_else(|| HubError::ConnectionNotFound(conn_id.to_string()))?;
        let Some(message) = encode_frame(frame) else {
            return Ok(());
        };
        conn.sender
            .send(message)
            .map_err(|_| HubError::Closed(conn_id.to_string()))
    }

    /// Send a Ping frame to every connected client.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(WsMessage::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then forget them all.
    ///
    /// Used during graceful shutdown, after the server stopped accepting
    /// new connections.
    pub async fn shutdown_all(&self) {
        let ids: Vec<ConnectionId> = self.connections.read().await.keys().cloned().collect();
        let count = ids.len();
        for conn_id in ids {
            self.on_disconnect(&conn_id, DisconnectReason::ServerShutdown)
                .await;
        }
        tracing::info!(count, "Closed all push connections");
    }

    // ---- introspection ----

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn group_count(&self) -> usize {
        self.groups.group_count().await
    }

    /// Current state of a connection, `None` once it has left the hub.
    pub async fn connection_state(&self, conn_id: &str) -> Option<ConnectionState> {
        self.connections
            .read()
            .await
            .get(conn_id)
            .map(WsConnection::state)
    }

    pub async fn groups_of(&self, conn_id: &str) -> Vec<String> {
        self.groups.groups_of(conn_id).await
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Serialize a frame into a WebSocket text message.
pub(crate) fn encode_frame(frame: &ServerFrame) -> Option<WsMessage> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(WsMessage::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server frame");
            None
        }
    }
}
