//! Error types for hookq.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Enqueue attempted after the dispatcher shut its queue.
    #[error("task queue is closed")]
    QueueClosed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
