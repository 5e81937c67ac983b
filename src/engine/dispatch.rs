//! Dispatch facade: the entry points producers and observers use.
//!
//! ```text
//!  webhook ──enqueue──► TaskQueue ──► worker 1 ─┐
//!                        (bounded)  ─► worker 2 ─┼─► StatusRegistry.decide ──► Executor.run
//!  /status ──snapshot──────────────────────────────► StatusRegistry          ──► complete
//! ```
//!
//! The dispatcher owns one queue, one registry and a fixed pool of workers.
//! Nothing here is global: every `Dispatcher` is an independent instance.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::queue::TaskQueue;
use super::registry::StatusRegistry;
use super::worker::{WorkerShared, run_worker};
use crate::error::{Error, Result};
use crate::event::{Event, EventBus, EventKind};
use crate::executor::Executor;
use crate::model::{Status, StatusSnapshot, Task, TaskId};
use crate::telemetry::metrics;

/// Parameters fixed at [`Dispatcher::start`].
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Minimum time after a key's last run before a non-manual task runs.
    pub debounce_window: Duration,
    /// Deadline for one executor run. `None` means unbounded.
    pub task_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 400,
            debounce_window: Duration::from_secs(600),
            task_timeout: Some(Duration::from_secs(1800)),
        }
    }
}

pub struct Dispatcher<P: Send + 'static> {
    queue: Arc<TaskQueue<P>>,
    registry: Arc<StatusRegistry>,
    events: Arc<EventBus>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: DispatchConfig,
}

impl<P: Send + 'static> Dispatcher<P> {
    /// Build the queue and registry and spawn the worker pool on the current
    /// tokio runtime.
    pub fn start(config: DispatchConfig, executor: Arc<dyn Executor<P>>) -> Result<Self> {
        Self::start_with_shutdown(config, executor, CancellationToken::new())
    }

    /// Like [`start`](Self::start), with workers stopping when `shutdown`
    /// is cancelled.
    pub fn start_with_shutdown(
        config: DispatchConfig,
        executor: Arc<dyn Executor<P>>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        if config.workers == 0 {
            return Err(Error::Config("worker count must be at least 1".to_string()));
        }
        let queue = Arc::new(TaskQueue::new(config.queue_capacity)?);
        let registry = Arc::new(StatusRegistry::new());
        let events = Arc::new(EventBus::new());

        let shared = Arc::new(WorkerShared {
            queue: Arc::clone(&queue),
            registry: Arc::clone(&registry),
            executor,
            events: Arc::clone(&events),
            debounce_window: config.debounce_window,
            task_timeout: config.task_timeout,
        });

        let workers = (1..=config.workers)
            .map(|id| tokio::spawn(run_worker(id, Arc::clone(&shared), shutdown.clone())))
            .collect();

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            debounce_secs = config.debounce_window.as_secs(),
            task_timeout_secs = config.task_timeout.map(|t| t.as_secs()),
            "dispatcher started"
        );

        Ok(Self {
            queue,
            registry,
            events,
            shutdown,
            workers: Mutex::new(workers),
            config,
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Queue a task for the worker pool. Waits while the queue is full.
    ///
    /// Never runs the executor inline. Fails only with
    /// [`Error::QueueClosed`] after [`shutdown`](Self::shutdown).
    #[instrument(skip(self, task), fields(key = %task.key, task_id = %task.id, manual = task.manual))]
    pub async fn enqueue(&self, task: Task<P>) -> Result<TaskId> {
        let id = task.id;
        let key = task.key.clone();
        let manual = task.manual;

        // Announce before handing over so TaskEnqueued always precedes the
        // worker's events for this task.
        let permit = self.queue.reserve().await?;
        self.events.emit(EventKind::TaskEnqueued { id, key, manual });
        permit.send(task);

        metrics::tasks_enqueued().add(1, &[KeyValue::new("manual", manual)]);
        debug!(depth = self.queue.len(), "task enqueued");
        Ok(id)
    }

    /// Independent copy of every key's status.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.registry.snapshot()
    }

    pub fn status(&self, key: &str) -> Option<Status> {
        self.registry.get(key)
    }

    /// Tasks waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting tasks, stop the workers, and wait for them.
    ///
    /// In-flight executors see their cancellation token fire and are waited
    /// on. Tasks still queued are dropped.
    pub async fn shutdown(&self) {
        self.queue.close();
        self.shutdown.cancel();

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker ended abnormally");
            }
        }

        let dropped = self.queue.drain().await;
        if !dropped.is_empty() {
            warn!(dropped = dropped.len(), "queued tasks dropped at shutdown");
        }
        info!("dispatcher stopped");
    }
}

impl<P: Send + 'static> Drop for Dispatcher<P> {
    fn drop(&mut self) {
        self.queue.close();
        self.shutdown.cancel();
    }
}
