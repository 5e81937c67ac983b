//! Endpoint handlers.
//!
//! Producers only ever wait for the queue to accept a task; the job runs
//! later on a worker, so every accepted push is answered with 202.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::signature::verify_signature;
use super::{AppState, PushEvent};
use crate::config::secrets::token_matches;
use crate::error::Error;
use crate::model::StatusSnapshot;

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid or missing bearer token")]
    Unauthorized,

    #[error("manual triggers are disabled")]
    ManualDisabled,

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("dispatcher is shutting down")]
    QueueClosed,

    #[error("{0}")]
    Internal(String),
}

impl From<Error> for WebhookError {
    fn from(err: Error) -> Self {
        match err {
            Error::QueueClosed => WebhookError::QueueClosed,
            other => WebhookError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) | WebhookError::InvalidJson(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::InvalidSignature | WebhookError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::ManualDisabled => StatusCode::NOT_FOUND,
            WebhookError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

/// Body of `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
    /// Tasks waiting in the queue.
    pub waiting_num: usize,
    pub status: StatusSnapshot,
}

/// `POST /webhook`
///
/// - 202 Accepted: push queued (`task_id` in the body)
/// - 200 OK: event acknowledged without queueing
/// - 400 Bad Request: missing header or invalid JSON
/// - 401 Unauthorized: invalid signature
/// - 503 Service Unavailable: dispatcher shutting down
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let event_type = get_header(&headers, HEADER_EVENT)?;
    let signature = get_header(&headers, HEADER_SIGNATURE)?;
    let delivery = headers
        .get(HEADER_DELIVERY)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    // Verify before any parsing.
    if !verify_signature(
        &body,
        signature,
        state.webhook_secret().expose_secret().as_bytes(),
    ) {
        warn!(delivery, event_type, "invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    match event_type {
        "push" => {
            let push: PushEvent = serde_json::from_slice(&body)?;
            if push.head_commit.is_none() {
                debug!(delivery, git_ref = %push.git_ref, "ref deleted, nothing to run");
                return Ok(ack("ignored"));
            }
            if push.is_self_published(state.skip_commit_message()) {
                debug!(delivery, pusher = %push.pusher.name, "self-published push ignored");
                return Ok(ack("ignored"));
            }

            info!(
                delivery,
                pusher = %push.pusher.name,
                repo = %push.repository.full_name,
                commit = push.short_commit(),
                "push received"
            );
            let task_id = state.dispatcher().enqueue(push.into_task(false)).await?;
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({ "message": "OK", "task_id": task_id })),
            )
                .into_response())
        }
        "ping" | "watch" => {
            info!(delivery, event_type, "event acknowledged");
            Ok(ack("OK"))
        }
        other => {
            debug!(delivery, event_type = other, "unhandled event type");
            Ok(ack("ignored"))
        }
    }
}

/// `POST /manual`: queue a push with the debounce window bypassed.
pub async fn manual_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let token = state.admin_token().ok_or(WebhookError::ManualDisabled)?;
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(WebhookError::Unauthorized)?;
    if !token_matches(token, presented.trim()) {
        warn!("manual trigger with bad token");
        return Err(WebhookError::Unauthorized);
    }

    let push: PushEvent = serde_json::from_slice(&body)?;
    info!(pusher = %push.pusher.name, commit = push.short_commit(), "manual trigger");
    let task_id = state.dispatcher().enqueue(push.into_task(true)).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "OK", "task_id": task_id })),
    )
        .into_response())
}

/// `GET /status`
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let dispatcher = state.dispatcher();
    Json(StatusResponse {
        message: "ok".to_string(),
        waiting_num: dispatcher.queue_depth(),
        status: dispatcher.snapshot(),
    })
}

/// `GET /ping`
pub async fn ping_handler() -> Json<serde_json::Value> {
    Json(json!({ "message": "pong" }))
}

pub async fn not_found_handler() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "code": "PAGE_NOT_FOUND",
            "message": "No page found. Try /ping, /status or /webhook",
        })),
    )
}

fn ack(message: &str) -> Response {
    (StatusCode::OK, Json(json!({ "message": message }))).into_response()
}

fn get_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingHeader(name))
}
