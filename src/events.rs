//! Events emitted by transaction programs.
//!
//! A run buffers its events and hands them to an [`EventSink`] only after the transaction has
//! committed. Failed or rolled-back runs publish nothing.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

/// Receiver of committed events.
///
/// Any `Fn(&str, &JsonValue)` closure is a sink:
/// ```rust
/// use std::sync::Mutex;
/// use sql_transactional::prelude::*;
///
/// let seen = Mutex::new(Vec::new());
/// let sink = |event_type: &str, _payload: &serde_json::Value| {
///     seen.lock().unwrap().push(event_type.to_string());
/// };
/// sink.publish("user_created", &serde_json::json!({"id": 1}));
/// assert_eq!(seen.lock().unwrap().as_slice(), ["user_created"]);
/// ```
pub trait EventSink: Send + Sync {
    fn publish(&self, event_type: &str, payload: &JsonValue);
}

impl<F> EventSink for F
where
    F: Fn(&str, &JsonValue) + Send + Sync,
{
    fn publish(&self, event_type: &str, payload: &JsonValue) {
        self(event_type, payload);
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event_type: &str, _payload: &JsonValue) {}
}

/// An event as published after commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub event_type: String,
    pub payload: JsonValue,
}

/// Sink that forwards events to a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PublishedEvent>,
}

impl ChannelSink {
    /// Create a sink together with the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PublishedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event_type: &str, payload: &JsonValue) {
        let event = PublishedEvent {
            event_type: event_type.to_string(),
            payload: payload.clone(),
        };
        if self.tx.send(event).is_err() {
            tracing::debug!(event_type, "event receiver dropped; event discarded");
        }
    }
}

/// Events collected during a single run, in emission order.
#[derive(Debug, Default)]
pub struct BufferedEvents {
    events: Vec<PublishedEvent>,
}

impl BufferedEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event_type: impl Into<String>, payload: JsonValue) {
        self.events.push(PublishedEvent {
            event_type: event_type.into(),
            payload,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hand every buffered event to `sink`, oldest first.
    pub fn publish_to(self, sink: &dyn EventSink) {
        for event in self.events {
            sink.publish(&event.event_type, &event.payload);
        }
    }

    /// Drop the buffer without publishing.
    pub fn discard(self) {
        if !self.events.is_empty() {
            tracing::debug!(count = self.events.len(), "discarding unpublished events");
        }
    }
}
