//! Test doubles: a scripted in-memory database, a bounded pool driver over it, and an event
//! sink that records what was published.

mod backend;
mod driver;

pub use backend::{Call, MemoryBackend, MemoryConnection};
pub use driver::MemoryDriver;

use std::sync::{Mutex, PoisonError};

use serde_json::Value as JsonValue;

use crate::events::{EventSink, PublishedEvent};

/// Event sink that keeps every published event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PublishedEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.event_type)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event_type: &str, payload: &JsonValue) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublishedEvent {
                event_type: event_type.to_string(),
                payload: payload.clone(),
            });
    }
}
