//! # Event Fan-out
//!
//! Named events with a JSON payload, pushed to whoever listens (websocket
//! hubs, notification workers). Delivery is best-effort: a publish never
//! fails and never blocks the operation that triggered it.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

// =============================================================================
// Event Names
// =============================================================================

pub const REQUEST_CREATED: &str = "request:created";
pub const REQUEST_UPDATED: &str = "request:updated";
pub const REQUEST_ASSIGNED: &str = "request:assigned";
pub const REQUEST_STATUS_CHANGED: &str = "request:status_changed";
pub const REQUEST_CONFIRMED: &str = "request:confirmed";
pub const REQUEST_SIGNED: &str = "request:signed";
pub const REQUEST_DELETED: &str = "request:deleted";
pub const REQUEST_LOCKED: &str = "request:locked";
pub const REQUEST_UNLOCKED: &str = "request:unlocked";

pub const CHECKLIST_ADDED: &str = "checklist:added";
pub const CHECKLIST_UPDATED: &str = "checklist:updated";
pub const CHECKLIST_REMOVED: &str = "checklist:removed";

pub const ATTACHMENT_ADDED: &str = "attachment:added";
pub const ATTACHMENT_REMOVED: &str = "attachment:removed";

pub const BUDGET_UPDATED: &str = "budget:updated";

pub const INVOICE_PROCESSING: &str = "invoice:processing";
pub const INVOICE_ISSUED: &str = "invoice:issued";
pub const INVOICE_FAILED: &str = "invoice:failed";
pub const INVOICE_CANCELLED: &str = "invoice:cancelled";

// =============================================================================
// Publisher
// =============================================================================

/// One published event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedEvent {
    pub name: String,
    pub payload: Value,
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, name: &str, payload: Value);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPublisher;

impl EventPublisher for NoOpPublisher {
    fn publish(&self, name: &str, _payload: Value) {
        trace!(event = name, "Event dropped (no publisher)");
    }
}

/// Fans events out over a tokio broadcast channel.
///
/// Slow subscribers lag and lose the oldest events; publishing with no
/// subscribers is fine.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<PublishedEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        BroadcastPublisher { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        BroadcastPublisher::new(256)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, name: &str, payload: Value) {
        let _ = self.tx.send(PublishedEvent {
            name: name.to_string(),
            payload,
        });
    }
}
