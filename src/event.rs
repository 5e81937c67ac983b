//! Structured events emitted by the dispatcher.
//!
//! Consumers subscribe to the event stream to drive dashboards or to wait
//! on task progress in tests. Events are the dispatcher's voice; the
//! status snapshot is its memory.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::engine::registry::SuppressReason;
use crate::model::TaskId;

/// Buffered events per subscriber before it starts lagging.
const EVENT_BUFFER: usize = 1024;

/// A structured event emitted by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    TaskEnqueued {
        id: TaskId,
        key: String,
        manual: bool,
    },
    TaskStarted {
        id: TaskId,
        key: String,
        worker: usize,
    },
    TaskSuppressed {
        id: TaskId,
        key: String,
        reason: SuppressReason,
        last_run: DateTime<Utc>,
    },
    TaskFinished {
        id: TaskId,
        key: String,
        error: Option<String>,
        duration_ms: u64,
    },
}

impl EventKind {
    pub fn task_id(&self) -> TaskId {
        match self {
            EventKind::TaskEnqueued { id, .. }
            | EventKind::TaskStarted { id, .. }
            | EventKind::TaskSuppressed { id, .. }
            | EventKind::TaskFinished { id, .. } => *id,
        }
    }
}

/// Fan-out of dispatcher events to any number of subscribers.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    /// Held across `send` so stream order matches `seq` order.
    seq: Mutex<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            tx,
            seq: Mutex::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, kind: EventKind) {
        let mut seq = self.seq.lock();
        *seq += 1;
        let _ = self.tx.send(Event {
            seq: *seq,
            timestamp: Utc::now(),
            kind,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
