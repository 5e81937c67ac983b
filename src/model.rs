//! Core data model.
//!
//! A task is one request to run the job for a key (the submitter). Tasks
//! for the same key are debounced against each other; the per-key
//! [`Status`] records what the dispatcher last did for that key.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work flowing producer → queue → worker.
///
/// Tasks are immutable once built. The payload is opaque to the engine and
/// handed untouched to the executor.
#[derive(Debug, Clone)]
pub struct Task<P> {
    /// Unique identifier, assigned at construction.
    pub id: TaskId,

    /// Identity whose executions are serialized and debounced together.
    pub key: String,

    /// Manual tasks bypass the debounce window (not the in-flight check).
    pub manual: bool,

    pub payload: P,

    pub created_at: DateTime<Utc>,
}

impl<P> Task<P> {
    pub fn new(key: impl Into<String>, payload: P) -> Self {
        Self {
            id: TaskId::new(),
            key: key.into(),
            manual: false,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn manual(mut self, manual: bool) -> Self {
        self.manual = manual;
        self
    }
}

/// Newtype for task IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Per-key dispatch state.
///
/// `running == true` means exactly one executor invocation for this key is
/// in flight somewhere in the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub running: bool,

    /// Start time of the most recent accepted run. Never decreases.
    pub last_run: DateTime<Utc>,

    /// Error of the most recent completed run. Cleared when a run starts.
    pub last_error: Option<String>,

    /// Number of accepted runs.
    #[serde(default)]
    pub runs: u64,

    /// Number of tasks suppressed by policy.
    #[serde(default)]
    pub suppressed: u64,
}

impl Status {
    pub(crate) fn started(now: DateTime<Utc>) -> Self {
        Self {
            running: true,
            last_run: now,
            last_error: None,
            runs: 1,
            suppressed: 0,
        }
    }
}

/// Point-in-time copy of every key's status, ordered by key.
pub type StatusSnapshot = BTreeMap<String, Status>;
