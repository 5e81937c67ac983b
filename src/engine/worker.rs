//! Worker loop: dequeue, decide, execute, complete.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use super::queue::TaskQueue;
use super::registry::{Decision, StatusRegistry};
use crate::error::Error;
use crate::event::{EventBus, EventKind};
use crate::executor::{Executor, TaskContext};
use crate::model::Task;
use crate::telemetry::metrics;
use crate::telemetry::task::{record_decision, start_task_span};

/// Everything a worker shares with its siblings and the dispatcher.
pub(crate) struct WorkerShared<P: Send + 'static> {
    pub queue: Arc<TaskQueue<P>>,
    pub registry: Arc<StatusRegistry>,
    pub executor: Arc<dyn Executor<P>>,
    pub events: Arc<EventBus>,
    pub debounce_window: Duration,
    pub task_timeout: Option<Duration>,
}

/// Releases a key accepted by `decide`, exactly once.
///
/// If the owning future is dropped before [`finish`](Self::finish), the key
/// is still released with an error so it never stays running.
struct RunGuard<'a> {
    registry: &'a StatusRegistry,
    key: &'a str,
    finished: bool,
}

impl<'a> RunGuard<'a> {
    fn new(registry: &'a StatusRegistry, key: &'a str) -> Self {
        Self {
            registry,
            key,
            finished: false,
        }
    }

    fn finish(mut self, error: Option<String>) {
        self.finished = true;
        self.registry.complete(self.key, error);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(key = %self.key, "run abandoned before completion");
            self.registry
                .complete(self.key, Some("worker aborted before completion".to_string()));
        }
    }
}

/// Run one worker until `shutdown` fires.
pub(crate) async fn run_worker<P: Send + 'static>(
    id: usize,
    shared: Arc<WorkerShared<P>>,
    shutdown: CancellationToken,
) {
    info!(worker = id, "worker started");
    while let Some(task) = shared.queue.dequeue(&shutdown).await {
        process_task(id, &shared, task, &shutdown).await;
    }
    info!(worker = id, "worker stopped");
}

async fn process_task<P: Send + 'static>(
    worker: usize,
    shared: &WorkerShared<P>,
    task: Task<P>,
    shutdown: &CancellationToken,
) {
    let span = start_task_span(&task.key, &task.id);
    let decision = shared
        .registry
        .decide(&task.key, task.manual, shared.debounce_window, Utc::now());
    record_decision(&span, &decision);

    let previous_last_run = match decision {
        Decision::Suppress { reason, last_run } => {
            span.in_scope(|| {
                warn!(
                    key = %task.key,
                    task_id = %task.id,
                    manual = task.manual,
                    %reason,
                    %last_run,
                    "task suppressed"
                );
            });
            metrics::tasks_suppressed().add(1, &[KeyValue::new("reason", reason.as_str())]);
            shared.events.emit(EventKind::TaskSuppressed {
                id: task.id,
                key: task.key,
                reason,
                last_run,
            });
            return;
        }
        Decision::Run { previous_last_run } => previous_last_run,
    };

    async {
        let guard = RunGuard::new(&shared.registry, &task.key);
        info!(worker, manual = task.manual, ?previous_last_run, "executing task");
        shared.events.emit(EventKind::TaskStarted {
            id: task.id,
            key: task.key.clone(),
            worker,
        });

        let ctx = TaskContext {
            id: task.id,
            key: task.key.clone(),
            manual: task.manual,
        };
        let start = Instant::now();
        let result = execute(shared, ctx, task.payload, shutdown).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let error = match result {
            Ok(()) => {
                info!(duration_ms, "task completed");
                None
            }
            Err(message) => {
                error!(duration_ms, error = %message, "task failed");
                Some(message)
            }
        };

        let outcome = if error.is_some() { "failure" } else { "success" };
        metrics::tasks_executed().add(1, &[KeyValue::new("outcome", outcome)]);
        metrics::task_duration_ms().record(duration_ms as f64, &[KeyValue::new("outcome", outcome)]);

        guard.finish(error.clone());
        shared.events.emit(EventKind::TaskFinished {
            id: task.id,
            key: task.key.clone(),
            error,
            duration_ms,
        });
    }
    .instrument(span.clone())
    .await
}

/// Run the executor on its own tokio task so a panic is contained, bounded
/// by the per-task deadline. Returns the error message to record.
async fn execute<P: Send + 'static>(
    shared: &WorkerShared<P>,
    ctx: TaskContext,
    payload: P,
    shutdown: &CancellationToken,
) -> Result<(), String> {
    let cancel = shutdown.child_token();
    let executor = Arc::clone(&shared.executor);
    let run_cancel = cancel.clone();
    let mut handle = tokio::spawn(async move { executor.run(ctx, payload, run_cancel).await });

    let joined = match shared.task_timeout {
        None => (&mut handle).await,
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                handle.abort();
                // Wait for the abandoned run to actually stop before the key
                // is released.
                let _ = handle.await;
                return Err(Error::Timeout(limit).to_string());
            }
        },
    };

    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(join) if join.is_panic() => {
            let payload = join.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("executor panicked: {message}"))
        }
        Err(join) => {
            debug!(error = %join, "executor task cancelled");
            Err("executor cancelled".to_string())
        }
    }
}
