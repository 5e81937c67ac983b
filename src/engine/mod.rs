//! Debounced task dispatch: queue, status registry, worker pool, facade.

pub mod dispatch;
pub mod queue;
pub mod registry;
mod worker;

pub use dispatch::{DispatchConfig, Dispatcher};
pub use queue::TaskQueue;
pub use registry::{Decision, StatusRegistry, SuppressReason};
