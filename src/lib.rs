//! # hookq
//!
//! Push-triggered job dispatcher. Webhook deliveries become tasks on a
//! bounded queue; a fixed pool of workers runs the job for each task,
//! at most once at a time per submitter and no more often than a
//! debounce window allows.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod executor;
pub mod model;
pub mod telemetry;
pub mod webhook;
