//! The job body behind the dispatcher.
//!
//! The engine knows nothing about what a run does; it hands each accepted
//! task's payload to an [`Executor`] and records the result.

pub mod command;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::model::TaskId;

pub use command::CommandExecutor;

/// Failure of a single executor run. Recorded in the key's status, never
/// returned to the producer.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{0}")]
    Failed(String),

    #[error("job exited with status {code}")]
    Exit { code: i32 },

    #[error("job cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity of the task being run, for executors that need it.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub id: TaskId,
    pub key: String,
    pub manual: bool,
}

/// Runs the job for one accepted task.
///
/// Called at most once per accepted task, never concurrently for the same
/// key. `cancel` fires on deadline or shutdown; implementations should stop
/// promptly when it does.
#[async_trait]
pub trait Executor<P: Send + 'static>: Send + Sync {
    async fn run(
        &self,
        task: TaskContext,
        payload: P,
        cancel: CancellationToken,
    ) -> Result<(), ExecError>;
}
