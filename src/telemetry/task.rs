//! Task execution span helpers.

use tracing::Span;

use crate::engine::Decision;
use crate::model::TaskId;

/// Start a span for one dequeued task.
///
/// The `task.decision` field is declared empty and filled by
/// [`record_decision`].
pub fn start_task_span(key: &str, task_id: &TaskId) -> Span {
    tracing::info_span!(
        "task.execute",
        "task.key" = key,
        "task.id" = %task_id,
        "task.decision" = tracing::field::Empty,
    )
}

/// Record the dispatcher's decision on the task span.
pub fn record_decision(span: &Span, decision: &Decision) {
    let value = match decision {
        Decision::Run { .. } => "run",
        Decision::Suppress { reason, .. } => reason.as_str(),
    };
    span.record("task.decision", value);
}
