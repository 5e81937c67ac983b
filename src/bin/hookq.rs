//! hookq CLI: run the dispatcher, inspect it, trigger it by hand.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hookq::config::secrets::{ExposeSecret, SecretString};
use hookq::config::{Config, JobConfig};
use hookq::engine::Dispatcher;
use hookq::executor::{CommandExecutor, Executor};
use hookq::telemetry::{TelemetryConfig, init_telemetry};
use hookq::webhook::{AppState, PushEvent, StatusResponse, build_router};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "hookq", about = "Push-triggered job dispatcher")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dispatcher and its HTTP endpoints
    Serve {
        /// Job description (overrides HOOKQ_JOB_FILE)
        #[arg(long)]
        job: Option<PathBuf>,
    },
    /// Show queue depth and per-submitter status of a running server
    Status {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
    },
    /// Queue a push payload with the debounce window bypassed
    Trigger {
        /// JSON file holding a GitHub push payload
        payload: PathBuf,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { job } => cmd_serve(job).await,
        Command::Status { url } => cmd_status(&url).await,
        Command::Trigger { payload, url } => cmd_trigger(&payload, &url).await,
    }
}

async fn cmd_serve(job_override: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "hookq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let job_file = job_override.unwrap_or_else(|| config.job_file.clone());
    let job = JobConfig::load(&job_file)?;
    let skip_commit_message = job.skip_commit_message.clone();
    info!(job = %job.name, file = %job_file.display(), "job loaded");

    let shutdown = CancellationToken::new();
    let executor: Arc<dyn Executor<PushEvent>> =
        Arc::new(CommandExecutor::new(job, config.github_token.clone()));
    let dispatcher = Arc::new(Dispatcher::start_with_shutdown(
        config.dispatch(),
        executor,
        shutdown.child_token(),
    )?);

    let app = build_router(AppState::new(
        Arc::clone(&dispatcher),
        config.webhook_secret,
        config.admin_token,
        skip_commit_message,
    ));

    let signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown requested");
        signal.cancel();
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "listening");
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    dispatcher.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Err(_) => {
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
}

async fn cmd_status(url: &str) -> anyhow::Result<()> {
    let resp = reqwest::get(format!("{}/status", url.trim_end_matches('/')))
        .await?
        .error_for_status()?;
    let status: StatusResponse = resp.json().await?;

    println!("Waiting: {}", status.waiting_num);
    if status.status.is_empty() {
        println!("No submitters seen yet.");
        return Ok(());
    }

    println!(
        "{:<24}  {:<8}  {:<20}  {:>5}  {:>5}  LAST ERROR",
        "KEY", "STATE", "LAST RUN", "RUNS", "SKIP"
    );
    println!("{}", "-".repeat(90));
    for (key, s) in &status.status {
        println!(
            "{:<24}  {:<8}  {:<20}  {:>5}  {:>5}  {}",
            key,
            if s.running { "running" } else { "idle" },
            s.last_run.format("%Y-%m-%d %H:%M:%S"),
            s.runs,
            s.suppressed,
            s.last_error.as_deref().unwrap_or("-")
        );
    }
    println!("\n{} submitter(s)", status.status.len());
    Ok(())
}

async fn cmd_trigger(payload: &Path, url: &str) -> anyhow::Result<()> {
    let token = std::env::var("HOOKQ_ADMIN_TOKEN")
        .map(SecretString::from)
        .map_err(|_| anyhow::anyhow!("HOOKQ_ADMIN_TOKEN must be set to trigger manually"))?;

    let body = tokio::fs::read(payload).await?;
    // Validate locally so a typo fails before the request.
    let push: PushEvent = serde_json::from_slice(&body)?;

    let resp = reqwest::Client::new()
        .post(format!("{}/manual", url.trim_end_matches('/')))
        .bearer_auth(token.expose_secret())
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?;

    let status = resp.status();
    let reply: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
    if !status.is_success() {
        anyhow::bail!("trigger rejected ({status}): {reply}");
    }
    println!(
        "Queued manual run for {} ({}): task {}",
        push.pusher.name,
        push.short_commit(),
        reply["task_id"].as_str().unwrap_or("-")
    );
    Ok(())
}
