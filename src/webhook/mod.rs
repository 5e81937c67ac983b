//! HTTP surface: GitHub webhook intake, manual trigger, status view.
//!
//! # Endpoints
//!
//! - `POST /webhook` - GitHub deliveries; pushes become tasks (202 Accepted)
//! - `POST /manual`  - bearer-authenticated push replay with `manual = true`
//! - `GET /status`   - queue depth and per-key status snapshot
//! - `GET /ping`     - liveness

mod handlers;
pub mod push;
pub mod signature;

use std::sync::Arc;

use secrecy::SecretString;

use crate::engine::Dispatcher;

pub use handlers::{StatusResponse, WebhookError};
pub use push::PushEvent;
pub use signature::{sign, verify_signature};

/// Shared state passed to every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    dispatcher: Arc<Dispatcher<PushEvent>>,
    webhook_secret: SecretString,
    /// `None` disables `POST /manual`.
    admin_token: Option<SecretString>,
    /// Head-commit message marking the job's own publishing pushes.
    skip_commit_message: String,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<Dispatcher<PushEvent>>,
        webhook_secret: SecretString,
        admin_token: Option<SecretString>,
        skip_commit_message: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                dispatcher,
                webhook_secret,
                admin_token,
                skip_commit_message: skip_commit_message.into(),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<PushEvent> {
        &self.inner.dispatcher
    }

    fn webhook_secret(&self) -> &SecretString {
        &self.inner.webhook_secret
    }

    fn admin_token(&self) -> Option<&SecretString> {
        self.inner.admin_token.as_ref()
    }

    fn skip_commit_message(&self) -> &str {
        &self.inner.skip_commit_message
    }
}

/// Build the router with all endpoints.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(handlers::webhook_handler))
        .route("/manual", post(handlers::manual_handler))
        .route("/status", get(handlers::status_handler))
        .route("/ping", get(handlers::ping_handler))
        .fallback(handlers::not_found_handler)
        .with_state(state)
}
