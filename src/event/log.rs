//! EventLog - ordered record of lifecycle steps
//!
//! - Event: envelope with id + timestamp + kind
//! - EventKind: node, callback, instance and body events
//! - EventLog: thread-safe, append-only log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::NodeKind;
use crate::error::Category;
use crate::runtime::Status;

/// Single event of an engine run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

/// All possible event types
///
/// Uses Arc<str> for node ids to keep cloning cheap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // NODE LEVEL
    // ═══════════════════════════════════════════
    NodeStarted {
        unique_id: Arc<str>,
        node: NodeKind,
    },
    NodeFinished {
        unique_id: Arc<str>,
        status: Status,
        failures: usize,
        duration_ms: u64,
    },

    // ═══════════════════════════════════════════
    // LIFECYCLE STEPS
    // ═══════════════════════════════════════════
    CallbackInvoked {
        unique_id: Arc<str>,
        category: Category,
        extension: Arc<str>,
    },
    InstanceCreated {
        unique_id: Arc<str>,
        container: Arc<str>,
    },
    InstanceDestroyed {
        unique_id: Arc<str>,
        container: Arc<str>,
    },
    TestBodyInvoked {
        unique_id: Arc<str>,
    },
}

impl EventKind {
    /// Node the event belongs to
    pub fn unique_id(&self) -> &str {
        match self {
            Self::NodeStarted { unique_id, .. }
            | Self::NodeFinished { unique_id, .. }
            | Self::CallbackInvoked { unique_id, .. }
            | Self::InstanceCreated { unique_id, .. }
            | Self::InstanceDestroyed { unique_id, .. }
            | Self::TestBodyInvoked { unique_id } => unique_id,
        }
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        // Allocate the id under the write lock so ids follow log order.
        let mut events = self.events.write();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        events.push(Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        });
        id
    }

    /// Get all events (cloned - use `with_events` for zero-copy access)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback
    ///
    /// Holds read lock for duration of callback - keep it short.
    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    /// Events of one node
    pub fn filter_node(&self, unique_id: &str) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.unique_id() == unique_id)
                .cloned()
                .collect()
        })
    }

    /// Callback invocations in call order, as `(category, extension)`
    pub fn callback_sequence(&self) -> Vec<(Category, Arc<str>)> {
        self.with_events(|events| {
            events
                .iter()
                .filter_map(|e| match &e.kind {
                    EventKind::CallbackInvoked {
                        category,
                        extension,
                        ..
                    } => Some((*category, Arc::clone(extension))),
                    _ => None,
                })
                .collect()
        })
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("events", &self.len())
            .finish()
    }
}
