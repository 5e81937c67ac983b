//! Metric instrument factories for hookq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"hookq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for hookq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("hookq")
}

/// Counter: tasks accepted into the queue.
/// Labels: `manual`.
pub fn tasks_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("hookq.tasks.enqueued")
        .with_description("Number of tasks accepted into the queue")
        .build()
}

/// Counter: tasks not executed because of the debounce policy.
/// Labels: `reason` ("running" | "debounced").
pub fn tasks_suppressed() -> Counter<u64> {
    meter()
        .u64_counter("hookq.tasks.suppressed")
        .with_description("Number of tasks suppressed by the debounce policy")
        .build()
}

/// Counter: executor runs.
/// Labels: `outcome` ("success" | "failure").
pub fn tasks_executed() -> Counter<u64> {
    meter()
        .u64_counter("hookq.tasks.executed")
        .with_description("Number of executor runs")
        .build()
}

/// Histogram: executor run duration in milliseconds.
/// Labels: `outcome`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("hookq.task.duration_ms")
        .with_description("Executor run duration in milliseconds")
        .with_unit("ms")
        .build()
}
