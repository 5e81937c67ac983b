//! Status registry: per-key state and the debounce policy.
//!
//! All mutation happens under one write lock. [`StatusRegistry::decide`]
//! evaluates the policy and marks the key running in the same critical
//! section, so two workers can never both observe "idle" for one key and
//! both start the executor.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::{Status, StatusSnapshot};

/// Why a task was not executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// Another run for the key is in flight.
    Running,
    /// The debounce window since the last run has not elapsed.
    Debounced,
}

impl SuppressReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SuppressReason::Running => "running",
            SuppressReason::Debounced => "debounced",
        }
    }
}

impl std::fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`StatusRegistry::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The key is now marked running; the caller owns the run and must
    /// call [`StatusRegistry::complete`] exactly once.
    Run {
        /// `last_run` before this decision, `None` for a first-seen key.
        previous_last_run: Option<DateTime<Utc>>,
    },
    /// Nothing was started.
    Suppress {
        reason: SuppressReason,
        last_run: DateTime<Utc>,
    },
}

impl Decision {
    pub fn should_run(&self) -> bool {
        matches!(self, Decision::Run { .. })
    }

    /// The key's `last_run` as it stood when the decision was made.
    pub fn previous_last_run(&self) -> Option<DateTime<Utc>> {
        match *self {
            Decision::Run { previous_last_run } => previous_last_run,
            Decision::Suppress { last_run, .. } => Some(last_run),
        }
    }
}

/// Map from key to [`Status`]. Keys are never evicted.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    statuses: RwLock<HashMap<String, Status>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the debounce policy for `key` at `now` and, if the task may run,
    /// mark the key running before releasing the lock.
    ///
    /// Policy, in order:
    /// 1. unknown key: run.
    /// 2. key running: suppress, regardless of `manual`.
    /// 3. `manual`, or `now - last_run >= window`: run.
    /// 4. otherwise: suppress.
    pub fn decide(
        &self,
        key: &str,
        manual: bool,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Decision {
        let mut statuses = self.statuses.write();

        let Some(status) = statuses.get_mut(key) else {
            statuses.insert(key.to_string(), Status::started(now));
            return Decision::Run {
                previous_last_run: None,
            };
        };

        let previous = status.last_run;

        if status.running {
            status.suppressed += 1;
            return Decision::Suppress {
                reason: SuppressReason::Running,
                last_run: previous,
            };
        }

        if !manual && !window_elapsed(previous, now, window) {
            status.suppressed += 1;
            return Decision::Suppress {
                reason: SuppressReason::Debounced,
                last_run: previous,
            };
        }

        status.running = true;
        status.last_run = previous.max(now);
        status.last_error = None;
        status.runs += 1;

        Decision::Run {
            previous_last_run: Some(previous),
        }
    }

    /// Release a run accepted by [`decide`](Self::decide), recording its error.
    ///
    /// Returns `false` if the key was not running, which indicates a
    /// double completion by the caller.
    pub fn complete(&self, key: &str, error: Option<String>) -> bool {
        let mut statuses = self.statuses.write();
        match statuses.get_mut(key) {
            Some(status) if status.running => {
                status.running = false;
                status.last_error = error;
                true
            }
            _ => false,
        }
    }

    /// Copy of the status for one key.
    pub fn get(&self, key: &str) -> Option<Status> {
        self.statuses.read().get(key).cloned()
    }

    /// Independent copy of every key's status.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.statuses
            .read()
            .iter()
            .map(|(key, status)| (key.clone(), status.clone()))
            .collect()
    }

    /// Number of keys with a run in flight.
    pub fn running_count(&self) -> usize {
        self.statuses.read().values().filter(|s| s.running).count()
    }
}

/// A negative elapsed time (clock stepped backwards) counts as "too soon".
fn window_elapsed(last_run: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(last_run) >= window
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(600);

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn first_task_for_key_runs() {
        let registry = StatusRegistry::new();
        let decision = registry.decide("alice", false, WINDOW, t(0));
        assert_eq!(
            decision,
            Decision::Run {
                previous_last_run: None
            }
        );

        let status = registry.get("alice").unwrap();
        assert!(status.running);
        assert_eq!(status.last_run, t(0));
        assert_eq!(status.runs, 1);
    }

    #[test]
    fn running_key_suppresses_even_manual() {
        let registry = StatusRegistry::new();
        registry.decide("alice", false, WINDOW, t(0));

        let auto = registry.decide("alice", false, WINDOW, t(700));
        let manual = registry.decide("alice", true, WINDOW, t(700));

        for decision in [auto, manual] {
            assert_eq!(
                decision,
                Decision::Suppress {
                    reason: SuppressReason::Running,
                    last_run: t(0),
                }
            );
        }
        assert_eq!(registry.get("alice").unwrap().suppressed, 2);
    }

    #[test]
    fn debounce_window_boundary() {
        let registry = StatusRegistry::new();
        registry.decide("alice", false, WINDOW, t(0));
        assert!(registry.complete("alice", None));

        let early = registry.decide("alice", false, WINDOW, t(599));
        assert!(matches!(
            early,
            Decision::Suppress {
                reason: SuppressReason::Debounced,
                ..
            }
        ));

        let on_time = registry.decide("alice", false, WINDOW, t(600));
        assert_eq!(
            on_time,
            Decision::Run {
                previous_last_run: Some(t(0))
            }
        );
    }

    #[test]
    fn manual_bypasses_window() {
        let registry = StatusRegistry::new();
        registry.decide("alice", false, WINDOW, t(0));
        registry.complete("alice", None);

        assert!(registry.decide("alice", true, WINDOW, t(4)).should_run());
        assert_eq!(registry.get("alice").unwrap().last_run, t(4));
    }

    #[test]
    fn run_clears_previous_error() {
        let registry = StatusRegistry::new();
        registry.decide("alice", false, WINDOW, t(0));
        registry.complete("alice", Some("clone failed".to_string()));
        assert_eq!(
            registry.get("alice").unwrap().last_error.as_deref(),
            Some("clone failed")
        );

        registry.decide("alice", true, WINDOW, t(10));
        let status = registry.get("alice").unwrap();
        assert!(status.running);
        assert_eq!(status.last_error, None);
    }

    #[test]
    fn last_run_never_moves_backwards() {
        let registry = StatusRegistry::new();
        registry.decide("alice", false, WINDOW, t(100));
        registry.complete("alice", None);

        // Clock stepped back: a manual run still goes, last_run holds.
        assert!(registry.decide("alice", true, WINDOW, t(50)).should_run());
        assert_eq!(registry.get("alice").unwrap().last_run, t(100));

        registry.complete("alice", None);
        assert!(!registry.decide("alice", false, WINDOW, t(60)).should_run());
    }

    #[test]
    fn complete_without_run_is_rejected() {
        let registry = StatusRegistry::new();
        assert!(!registry.complete("ghost", None));

        registry.decide("alice", false, WINDOW, t(0));
        assert!(registry.complete("alice", None));
        assert!(!registry.complete("alice", Some("late".to_string())));
        assert_eq!(registry.get("alice").unwrap().last_error, None);
    }

    #[test]
    fn keys_are_independent() {
        let registry = StatusRegistry::new();
        assert!(registry.decide("alice", false, WINDOW, t(0)).should_run());
        assert!(registry.decide("bob", false, WINDOW, t(1)).should_run());
        assert_eq!(registry.running_count(), 2);
    }

    #[test]
    fn snapshot_is_detached_from_live_state() {
        let registry = StatusRegistry::new();
        registry.decide("alice", false, WINDOW, t(0));

        let snapshot = registry.snapshot();
        registry.complete("alice", Some("boom".to_string()));
        registry.decide("bob", false, WINDOW, t(1));

        assert_eq!(snapshot.len(), 1);
        let alice = &snapshot["alice"];
        assert!(alice.running);
        assert_eq!(alice.last_error, None);
    }
}
