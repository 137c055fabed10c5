#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pulse_client::{
    Channel, ClientConfig, ClientEvent, ConnectError, ReconnectPolicy, Subscribers, Transport,
};
use pulse_core::{ClientCommand, Message, MessageType, Notice, Scope, ServerFrame};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

/// Transport whose connect outcomes are scripted by the test. Every
/// accepted connection hands its server end to the test.
pub struct MockTransport {
    failures: Mutex<VecDeque<ConnectError>>,
    fail_always: Mutex<Option<ConnectError>>,
    attempts: AtomicUsize,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, servers) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            failures: Mutex::new(VecDeque::new()),
            fail_always: Mutex::new(None),
            attempts: AtomicUsize::new(0),
            accepted,
        });
        (transport, servers)
    }

    /// Fail the next connect call with `err`.
    pub fn fail_next(&self, err: ConnectError) {
        self.failures.lock().unwrap().push_back(err);
    }

    /// Fail every connect call with `err`.
    pub fn fail_always(&self, err: ConnectError) {
        *self.fail_always.lock().unwrap() = Some(err);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _url: &str,
        _token: Option<&str>,
    ) -> Result<Box<dyn Channel>, ConnectError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(err) = self.fail_always.lock().unwrap().clone() {
            return Err(err);
        }

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let _ = self.accepted.send(ServerEnd {
            to_client,
            from_client,
        });
        Ok(Box::new(MockChannel { incoming, outgoing }))
    }
}

struct MockChannel {
    incoming: mpsc::UnboundedReceiver<Result<String, ConnectError>>,
    outgoing: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&mut self, text: String) -> Result<(), ConnectError> {
        self.outgoing
            .send(text)
            .map_err(|_| ConnectError::Transport("peer gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, ConnectError>> {
        self.incoming.recv().await
    }

    async fn close(&mut self) {
        self.incoming.close();
    }
}

/// The hub's side of one accepted mock connection. Dropping it closes the
/// connection from the server side.
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<Result<String, ConnectError>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn send(&self, frame: &ServerFrame) {
        let _ = self
            .to_client
            .send(Ok(serde_json::to_string(frame).unwrap()));
    }

    /// Complete the handshake, advertising a 5s heartbeat.
    pub fn welcome(&self) {
        self.send(&ServerFrame::Welcome {
            connection_id: "conn-1".into(),
            heartbeat_interval_ms: 5_000,
        });
    }

    pub fn push(&self, message: Message) {
        self.send(&ServerFrame::Message(message));
    }

    /// Next command the client sent, or `None` once it hung up.
    pub async fn next_command(&mut self) -> Option<ClientCommand> {
        let text = self.from_client.recv().await?;
        Some(serde_json::from_str(&text).unwrap())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn test_config() -> ClientConfig {
    ClientConfig::new("ws://hub.test/api/v1/ws")
        .with_token("token")
        .with_heartbeat(Duration::from_secs(15), Duration::from_secs(2))
        .with_reconnect(ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        })
}

/// Record every event delivered to `subscribers`.
pub fn record_events(subscribers: &Subscribers) -> Arc<Mutex<Vec<ClientEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    subscribers.subscribe(move |event| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });
    events
}

pub fn lead_update(lead_id: i64, status: &str) -> Message {
    Notice::new(MessageType::EntityUpdated)
        .with_entity("lead", lead_id)
        .with_data(serde_json::json!({ "status": status }))
        .publish(Scope::group("project-42"), Utc::now())
}
