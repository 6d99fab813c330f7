//! Event recorder capability.
//!
//! The engine only threads a recorder through to reconcilers via
//! [`ContextConfig`](crate::core::ContextConfig); it never emits events itself.

use std::collections::VecDeque;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Severity of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Routine progress.
    Normal,
    /// Something the owner of the object should look at.
    Warning,
}

/// Event emitted by a reconciler about an object.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    /// Key of the object the event is about.
    pub object_key: String,
    /// Severity.
    pub event_type: EventType,
    /// Short machine-readable reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
    /// When the event was recorded.
    pub recorded_at: SystemTime,
}

/// Sink for events about reconciled objects.
pub trait EventRecorder: Send + Sync {
    /// Record an event.
    fn event(&self, object_key: &str, event_type: EventType, reason: &str, message: &str);
}

/// In-memory recorder for tests and development. Keeps the most recent events.
pub struct InMemoryEventRecorder {
    events: Mutex<VecDeque<RecordedEvent>>,
    max_events: usize,
}

impl InMemoryEventRecorder {
    /// Create a recorder with a bounded buffer. A capacity of zero records
    /// nothing.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl EventRecorder for InMemoryEventRecorder {
    fn event(&self, object_key: &str, event_type: EventType, reason: &str, message: &str) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(RecordedEvent {
            object_key: object_key.to_string(),
            event_type,
            reason: reason.to_string(),
            message: message.to_string(),
            recorded_at: SystemTime::now(),
        });
    }
}
