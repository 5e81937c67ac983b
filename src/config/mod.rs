//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. Sensitive values wrapped in secrecy::SecretString to prevent
//! log leaks. The job itself is described by a TOML file, see [`job`].

pub mod job;
pub mod secrets;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::DispatchConfig;
use crate::error::{Error, Result};
use secrecy::SecretString;

pub use job::JobConfig;

const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080);
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_QUEUE_CAPACITY: usize = 400;
const DEFAULT_DEBOUNCE_SECS: u64 = 600;
const DEFAULT_TASK_TIMEOUT_SECS: u64 = 1800;

#[derive(Debug)]
pub struct Config {
    pub webhook_secret: SecretString,
    /// Enables the manual trigger endpoint when set.
    pub admin_token: Option<SecretString>,
    /// Handed to the job so it can clone and publish.
    pub github_token: Option<SecretString>,
    pub listen_addr: SocketAddr,
    pub workers: usize,
    pub queue_capacity: usize,
    pub debounce_window: Duration,
    /// `None` disables the per-task deadline.
    pub task_timeout: Option<Duration>,
    pub job_file: PathBuf,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        let workers = parsed_var("HOOKQ_WORKERS", DEFAULT_WORKERS)?;
        if workers == 0 {
            return Err(Error::Config("HOOKQ_WORKERS must be at least 1".to_string()));
        }
        let queue_capacity = parsed_var("HOOKQ_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?;
        if queue_capacity == 0 {
            return Err(Error::Config(
                "HOOKQ_QUEUE_CAPACITY must be at least 1".to_string(),
            ));
        }
        let timeout_secs: u64 = parsed_var("HOOKQ_TASK_TIMEOUT_SECS", DEFAULT_TASK_TIMEOUT_SECS)?;

        Ok(Self {
            webhook_secret: SecretString::from(required_var("HOOKQ_WEBHOOK_SECRET")?),
            admin_token: optional_var("HOOKQ_ADMIN_TOKEN").map(SecretString::from),
            github_token: optional_var("HOOKQ_GITHUB_TOKEN").map(SecretString::from),
            listen_addr: parsed_var("HOOKQ_LISTEN_ADDR", DEFAULT_LISTEN_ADDR)?,
            workers,
            queue_capacity,
            debounce_window: Duration::from_secs(parsed_var(
                "HOOKQ_DEBOUNCE_SECS",
                DEFAULT_DEBOUNCE_SECS,
            )?),
            task_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            job_file: optional_var("HOOKQ_JOB_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("hookq.toml")),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// The dispatcher parameters carried by this config.
    pub fn dispatch(&self) -> DispatchConfig {
        DispatchConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            debounce_window: self.debounce_window,
            task_timeout: self.task_timeout,
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

/// Unset and empty are treated the same.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {name}={raw:?}: {e}"))),
        None => Ok(default),
    }
}
