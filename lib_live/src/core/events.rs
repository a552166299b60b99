//! # Observers and Stream Events
//!
//! An [`Observer`] represents one live output sink: a streaming connection
//! plus metadata (caller identity, subscribe time). Observers are owned by
//! the resource group that registered them and are released on disconnect or
//! on write failure.
//!
//! Every write to an observer is a [`StreamEvent`]. The transport layer maps
//! events to named server-sent events; the names and JSON bodies here match
//! the wire contract exactly (`connected`, `heartbeat`, `<resource>-data`
//! with `{"data": ...}`, `<resource>-error` with `{"message": ...}`).

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

/// The sending half handed to the broadcaster when a connection subscribes.
pub type EventSender = mpsc::UnboundedSender<StreamEvent>;

/// One event written to a live output sink.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Sent once on connect with the assigned observer id and resource key.
    Connected { observer_id: u64, resource: String },
    /// Periodic keep-alive so intermediaries and the far end detect a dead
    /// connection. Independent of the poll cadence.
    Heartbeat { ts: DateTime<Utc> },
    /// A changed payload. `Arc`-wrapped so fan-out to many observers shares
    /// one allocation instead of cloning the data per client.
    Data { payload: Arc<Value> },
    /// A non-fatal fetch failure. The connection stays open.
    Error { message: String },
}

impl StreamEvent {
    /// The wire-level event name for this event under `resource`.
    pub fn event_name(&self, resource: &str) -> String {
        match self {
            StreamEvent::Connected { .. } => "connected".to_string(),
            StreamEvent::Heartbeat { .. } => "heartbeat".to_string(),
            StreamEvent::Data { .. } => format!("{resource}-data"),
            StreamEvent::Error { .. } => format!("{resource}-error"),
        }
    }

    /// The JSON body for this event.
    pub fn body(&self) -> Value {
        match self {
            StreamEvent::Connected {
                observer_id,
                resource,
            } => json!({ "observerId": observer_id, "resource": resource }),
            StreamEvent::Heartbeat { ts } => json!({ "ts": ts.to_rfc3339() }),
            StreamEvent::Data { payload } => json!({ "data": payload.as_ref() }),
            StreamEvent::Error { message } => json!({ "message": message }),
        }
    }
}

/// One live output sink registered under a resource key.
#[derive(Debug, Clone)]
pub struct Observer {
    /// Unique id assigned at subscribe time.
    pub id: u64,
    /// Caller identity attached by the boundary middleware, if any.
    pub identity: Option<String>,
    /// When this observer subscribed.
    pub subscribed_at: DateTime<Utc>,
    sender: EventSender,
}

impl Observer {
    pub fn new(id: u64, identity: Option<String>, sender: EventSender) -> Self {
        Self {
            id,
            identity,
            subscribed_at: Utc::now(),
            sender,
        }
    }

    /// Writes one event to the sink. Returns `false` when the far end is
    /// gone; the caller treats that as a disconnect and removes the observer.
    pub fn send(&self, event: StreamEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_follow_the_wire_contract() {
        let data = StreamEvent::Data {
            payload: Arc::new(json!({"count": 3})),
        };
        assert_eq!(data.event_name("12345"), "12345-data");
        assert_eq!(data.body(), json!({"data": {"count": 3}}));

        let err = StreamEvent::Error {
            message: "upstream timeout".into(),
        };
        assert_eq!(err.event_name("12345"), "12345-error");
        assert_eq!(err.body(), json!({"message": "upstream timeout"}));
    }

    #[test]
    fn send_reports_a_dropped_sink() {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer = Observer::new(1, None, tx);
        drop(rx);
        assert!(!observer.send(StreamEvent::Heartbeat { ts: Utc::now() }));
    }
}
