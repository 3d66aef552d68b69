//! Notifications of actions taken on working-copy paths.
//!
//! Sinks are informational only; nothing in the merge core reads them back
//! for control flow.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::callback::StatusType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Add,
    Delete,
    Update,
    Merge,
    Conflict,
    Skip,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub path: String,
    pub action: EventAction,
    pub content_status: StatusType,
    pub prop_status: StatusType,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        path: impl Into<String>,
        action: EventAction,
        content_status: StatusType,
        prop_status: StatusType,
    ) -> Self {
        Self {
            path: path.into(),
            action,
            content_status,
            prop_status,
            timestamp: Utc::now(),
        }
    }
}

pub trait EventSink {
    fn handle_event(&mut self, event: &Event);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn handle_event(&mut self, _event: &Event) {}
}

/// Logs every event at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn handle_event(&mut self, event: &Event) {
        info!(
            path = %event.path,
            action = ?event.action,
            content = %event.content_status,
            props = %event.prop_status,
            "working copy event"
        );
    }
}

/// Keeps events in a shared buffer; clones observe the same buffer.
#[derive(Debug, Default, Clone)]
pub struct CollectingEventSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for CollectingEventSink {
    fn handle_event(&mut self, event: &Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_shares_buffer() {
        let sink = CollectingEventSink::new();
        let mut handle = sink.clone();
        handle.handle_event(&Event::new(
            "a.txt",
            EventAction::Merge,
            StatusType::Merged,
            StatusType::Unchanged,
        ));
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, EventAction::Merge);
    }

    #[test]
    fn test_event_serializes() {
        let event = Event::new("a.txt", EventAction::Skip, StatusType::Missing, StatusType::Unknown);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"action\":\"skip\""));
        assert!(json.contains("\"content_status\":\"missing\""));
    }
}
