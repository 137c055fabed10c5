//! Subscriber registry and fan-out to local consumers.
//!
//! Handlers run synchronously on the manager task, in registration order.
//! A handler that returns an error or panics is logged and skipped; the
//! remaining handlers still receive the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use pulse_core::{ConnectionState, Message, MessageType, Snapshot};

/// Everything the manager reports to its consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A pushed state change that won the last-timestamp-wins merge.
    Message(Message),
    /// A polled snapshot was merged into the state store.
    Snapshot(Snapshot),
    /// The connection moved to a new lifecycle state.
    StateChanged(ConnectionState),
    /// The server refused the credentials. Terminal.
    AuthRejected,
    /// Reconnection gave up. Terminal; reported exactly once.
    ReconnectExhausted { attempts: u32 },
    /// The server refused a command.
    ServerError { code: String, message: String },
}

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Handler = Arc<dyn Fn(&ClientEvent) -> HandlerResult + Send + Sync>;

/// Handle returned by the `on_*` methods, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Shared list of event handlers.
#[derive(Clone, Default)]
pub struct Subscribers {
    handlers: Arc<Mutex<Vec<(SubscriptionId, Handler)>>>,
    next_id: Arc<AtomicU64>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    /// Receive every pushed message.
    pub fn on_message<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(move |event| match event {
            ClientEvent::Message(msg) => handler(msg),
            _ => Ok(()),
        })
    }

    /// Receive changes to leads.
    pub fn on_lead_update<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_message(move |msg| {
            if msg.kind().is_entity_change() && msg.entity_type() == Some("lead") {
                handler(msg)
            } else {
                Ok(())
            }
        })
    }

    /// Receive recomputed metrics.
    pub fn on_metrics<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_message(move |msg| {
            if msg.entity_type() == Some("metrics") {
                handler(msg)
            } else {
                Ok(())
            }
        })
    }

    /// Receive error conditions: terminal failures, refused commands and
    /// system alerts.
    pub fn on_error<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(move |event| match event {
            ClientEvent::AuthRejected
            | ClientEvent::ReconnectExhausted { .. }
            | ClientEvent::ServerError { .. } => handler(event),
            ClientEvent::Message(msg) if msg.kind() == MessageType::SystemAlert => handler(event),
            _ => Ok(()),
        })
    }

    pub fn on_state<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(ConnectionState) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(move |event| match event {
            ClientEvent::StateChanged(state) => handler(*state),
            _ => Ok(()),
        })
    }

    pub fn on_snapshot<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Snapshot) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(move |event| match event {
            ClientEvent::Snapshot(snapshot) => handler(snapshot),
            _ => Ok(()),
        })
    }

    /// Remove a handler. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every handler. Returns how many completed
    /// successfully.
    pub fn dispatch(&self, event: &ClientEvent) -> usize {
        // Snapshot the list so handlers may (un)subscribe while running.
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut ok = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => ok += 1,
                Ok(Err(e)) => {
                    tracing::warn!(subscription = id.0, error = %e, "Event handler failed");
                }
                Err(_) => {
                    tracing::error!(subscription = id.0, "Event handler panicked");
                }
            }
        }
        ok
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("handlers", &self.len())
            .finish()
    }
}
