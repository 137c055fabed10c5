//! Client-side connection manager.
//!
//! [`ConnectionManager::start`] spawns one task that owns the channel and
//! drives the lifecycle:
//!
//! ```text
//! Idle -> Connecting -> Open -> Degraded -> Connecting -> ... -> Closed
//! ```
//!
//! While Open the task pings the hub on the heartbeat interval and treats
//! silence beyond the heartbeat timeout as a lost connection. A lost
//! connection is retried with linear backoff; the groups the consumer has
//! joined are replayed on every successful reconnect, because the hub
//! forgets memberships when a connection drops.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use pulse_core::protocol::Membership;
use pulse_core::{groups, ClientCommand, ConnectionState, ServerFrame};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::dispatch::{ClientEvent, Subscribers};
use crate::error::{ClientError, ConnectError};
use crate::reconnect::ReconnectState;
use crate::state_store::StateStore;
use crate::transport::{Channel, Transport};

/// Handle to a running connection task.
///
/// Cloning is cheap; all clones control the same connection. Dropping the
/// last handle stops the task.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Membership>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Spawn the connection task and begin connecting immediately.
    pub fn start(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        subscribers: Subscribers,
        store: StateStore,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let cancel = CancellationToken::new();

        let actor = Actor {
            config,
            transport,
            subscribers,
            store,
            commands: commands_rx,
            state: state_tx,
            cancel: cancel.clone(),
            desired: BTreeSet::new(),
            reconnect: ReconnectState::default(),
        };
        tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            state: state_rx,
            cancel,
        }
    }

    /// Join a group. Remembered and replayed across reconnects.
    pub fn join_group(&self, group: impl Into<String>) -> Result<(), ClientError> {
        self.send(Membership::Join(group.into()))
    }

    pub fn leave_group(&self, group: impl Into<String>) -> Result<(), ClientError> {
        self.send(Membership::Leave(group.into()))
    }

    pub fn join_dashboard(&self) -> Result<(), ClientError> {
        self.join_group(groups::dashboard())
    }

    pub fn join_entity(&self, entity_type: &str, entity_id: impl std::fmt::Display) -> Result<(), ClientError> {
        self.join_group(groups::entity(entity_type, entity_id))
    }

    pub fn leave_entity(&self, entity_type: &str, entity_id: impl std::fmt::Display) -> Result<(), ClientError> {
        self.leave_group(groups::entity(entity_type, entity_id))
    }

    fn send(&self, membership: Membership) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Stopped);
        }
        self.commands
            .send(membership)
            .map_err(|_| ClientError::Stopped)
    }

    /// Watch lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Close the channel and stop reconnecting. Takes effect immediately;
    /// no reconnect is attempted after this returns.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait until the manager reaches the terminal Closed state.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.current_state())
            .field("stopped", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Why [`Actor::serve`] returned.
enum Exit {
    /// Stopped by the consumer.
    Stopped,
    /// The connection dropped; reconnect.
    Lost(String),
}

struct Actor {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    subscribers: Subscribers,
    store: StateStore,
    commands: mpsc::UnboundedReceiver<Membership>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    /// Groups the consumer currently wants, replayed after every open.
    desired: BTreeSet<String>,
    reconnect: ReconnectState,
}

impl Actor {
    /// Connect -> serve -> back off, until stopped or given up.
    async fn run(mut self) {
        tracing::info!(url = %self.config.url, "Connection manager started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            match self.open().await {
                Ok(Some((channel, heartbeat_interval))) => {
                    self.reconnect.reset();
                    self.set_state(ConnectionState::Open);
                    match self.serve(channel, heartbeat_interval).await {
                        Exit::Stopped => break,
                        Exit::Lost(reason) => {
                            tracing::warn!(%reason, "Connection lost, reconnecting");
                            self.set_state(ConnectionState::Degraded);
                        }
                    }
                }
                Ok(None) => break,
                Err(ConnectError::Unauthorized) => {
                    tracing::error!("Credentials rejected, not reconnecting");
                    self.subscribers.dispatch(&ClientEvent::AuthRejected);
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = self.reconnect.attempt(),
                        error = %e,
                        "Connection attempt failed"
                    );
                }
            }

            match self.reconnect.next(&self.config.reconnect) {
                Some(delay) => {
                    tracing::info!(
                        attempt = self.reconnect.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling reconnect"
                    );
                    if !self.backoff(delay).await {
                        break;
                    }
                }
                None => {
                    let attempts = self.reconnect.attempt();
                    tracing::error!(attempts, "Reconnect attempts exhausted, giving up");
                    self.subscribers
                        .dispatch(&ClientEvent::ReconnectExhausted { attempts });
                    break;
                }
            }
        }

        self.set_state(ConnectionState::Closed);
        tracing::info!("Connection manager stopped");
    }

    /// Connect and complete the welcome handshake. `Ok(None)` when
    /// cancelled midway.
    async fn open(&mut self) -> Result<Option<(Box<dyn Channel>, Duration)>, ConnectError> {
        let mut channel = tokio::select! {
            () = self.cancel.cancelled() => return Ok(None),
            result = tokio::time::timeout(
                self.config.connect_timeout,
                self.transport.connect(&self.config.url, self.config.token.as_deref()),
            ) => result.map_err(|_| ConnectError::Timeout("connect"))??,
        };

        let first = tokio::select! {
            () = self.cancel.cancelled() => {
                channel.close().await;
                return Ok(None);
            }
            result = tokio::time::timeout(self.config.handshake_timeout, channel.recv()) => {
                result.map_err(|_| ConnectError::Timeout("handshake"))?
            }
        };

        let text = match first {
            Some(Ok(text)) => text,
            Some(Err(e)) => return Err(e),
            None => return Err(ConnectError::Transport("closed during handshake".into())),
        };
        let heartbeat_interval = match serde_json::from_str::<ServerFrame>(&text) {
            Ok(ServerFrame::Welcome {
                connection_id,
                heartbeat_interval_ms,
            }) => {
                tracing::info!(%connection_id, "Connected to hub");
                if heartbeat_interval_ms > 0 {
                    Duration::from_millis(heartbeat_interval_ms)
                } else {
                    self.config.heartbeat_interval
                }
            }
            Ok(other) => {
                return Err(ConnectError::Protocol(format!(
                    "expected welcome, got {other:?}"
                )))
            }
            Err(e) => return Err(ConnectError::Protocol(e.to_string())),
        };

        for group in &self.desired {
            let join = ClientCommand::JoinGroup {
                group: group.clone(),
            };
            send_command(channel.as_mut(), &join).await?;
        }
        if !self.desired.is_empty() {
            tracing::debug!(groups = self.desired.len(), "Replayed group memberships");
        }

        Ok(Some((channel, heartbeat_interval)))
    }

    /// Pump the open channel until it drops or the manager stops.
    async fn serve(&mut self, mut channel: Box<dyn Channel>, heartbeat_interval: Duration) -> Exit {
        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Set when a ping is outstanding; any inbound frame clears it.
        let mut reply_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.set_state(ConnectionState::Closing);
                    channel.close().await;
                    return Exit::Stopped;
                }
                command = self.commands.recv() => {
                    let Some(membership) = command else {
                        // Every handle is gone.
                        self.set_state(ConnectionState::Closing);
                        channel.close().await;
                        return Exit::Stopped;
                    };
                    let command = self.record(membership);
                    if let Err(e) = send_command(channel.as_mut(), &command).await {
                        return Exit::Lost(e.to_string());
                    }
                }
                frame = channel.recv() => match frame {
                    Some(Ok(text)) => {
                        reply_deadline = None;
                        self.handle_frame(&text).await;
                    }
                    Some(Err(e)) => return Exit::Lost(e.to_string()),
                    None => return Exit::Lost("closed by server".into()),
                },
                _ = heartbeat.tick() => {
                    if let Err(e) = send_command(channel.as_mut(), &ClientCommand::Ping).await {
                        return Exit::Lost(e.to_string());
                    }
                    if reply_deadline.is_none() {
                        reply_deadline = Some(Instant::now() + self.config.heartbeat_timeout);
                    }
                }
                () = tokio::time::sleep_until(reply_deadline.unwrap_or_else(Instant::now)),
                    if reply_deadline.is_some() =>
                {
                    channel.close().await;
                    return Exit::Lost("heartbeat timeout".into());
                }
            }
        }
    }

    /// Sleep out a backoff delay, still accepting membership changes.
    /// Returns `false` if stopped meanwhile.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return false,
                command = self.commands.recv() => match command {
                    Some(membership) => {
                        self.record(membership);
                    }
                    None => return false,
                },
                () = &mut sleep => return true,
            }
        }
    }

    /// Update the desired group set and build the matching wire command.
    fn record(&mut self, membership: Membership) -> ClientCommand {
        match membership {
            Membership::Join(group) => {
                self.desired.insert(group.clone());
                ClientCommand::JoinGroup { group }
            }
            Membership::Leave(group) => {
                self.desired.remove(&group);
                ClientCommand::LeaveGroup { group }
            }
        }
    }

    async fn handle_frame(&self, text: &str) {
        let frame = match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable server frame");
                return;
            }
        };

        match frame {
            ServerFrame::Message(message) => {
                if self.store.apply_message(&message).await {
                    self.subscribers.dispatch(&ClientEvent::Message(message));
                } else {
                    tracing::trace!(key = %message.state_key(), "Stale or duplicate message skipped");
                }
            }
            ServerFrame::Error { code, message } => {
                tracing::warn!(%code, %message, "Hub refused a command");
                self.subscribers
                    .dispatch(&ClientEvent::ServerError { code, message });
            }
            ServerFrame::Joined { group } => tracing::debug!(%group, "Joined group"),
            ServerFrame::Left { group } => tracing::debug!(%group, "Left group"),
            ServerFrame::Pong { .. } => {}
            ServerFrame::Welcome { .. } => tracing::debug!("Ignoring repeated welcome"),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            tracing::debug!(state = %next, "Connection state changed");
            self.subscribers.dispatch(&ClientEvent::StateChanged(next));
        }
    }
}

async fn send_command(channel: &mut dyn Channel, command: &ClientCommand) -> Result<(), ConnectError> {
    let text = serde_json::to_string(command).map_err(|e| ConnectError::Protocol(e.to_string()))?;
    channel.send(text).await
}
