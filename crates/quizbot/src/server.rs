//! Administrative and webhook HTTP surface
//!
//! Endpoints:
//! - /webhook - One Telegram update per POST
//! - /health  - Liveness plus readiness (503 until initialized)
//! - /init    - Retry initialization
//! - /env     - Which variables are set, secrets masked
//! - /metrics - Prometheus metrics in text format

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::Update;

use crate::app::{self, AppState, InitOutcome};
use crate::config;
use crate::dispatch::DispatchError;

/// Header Telegram uses to echo the webhook secret.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/init", get(init_handler).post(init_handler))
        .route("/env", get(env_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Handler for /webhook
///
/// Answers as soon as the update is queued; the work itself happens on the
/// dispatch worker.
async fn webhook_handler(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(expected) = state.webhook_secret.as_deref() {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            state.metrics.updates_rejected.with_label_values(&["unauthorized"]).inc();
            log::warn!("Rejected webhook call with a missing or wrong secret token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let router = match state.router() {
        Some(router) if state.is_ready() => router,
        _ => return refuse(&state, &DispatchError::NotReady),
    };

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            state.metrics.updates_rejected.with_label_values(&["bad_request"]).inc();
            log::warn!("Undecodable webhook body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let (user_id, job) = router.job(update);
    let result = state.bridge.submit(user_id, job);
    state.metrics.queue_depth.set(state.bridge.queue_depth() as i64);
    match result {
        Ok(()) => {
            state.metrics.updates_received.with_label_values(&["webhook"]).inc();
            StatusCode::OK.into_response()
        }
        Err(e) => refuse(&state, &e),
    }
}

/// 503 for a refused submission; retryable ones carry Retry-After.
fn refuse(state: &AppState, error: &DispatchError) -> Response {
    state.metrics.updates_rejected.with_label_values(&[error.label()]).inc();
    match error {
        DispatchError::NotReady | DispatchError::Busy => {
            log::debug!("Asking Telegram to retry: {}", error);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, config::dispatch::RETRY_AFTER_SECS.to_string())],
                error.to_string(),
            )
                .into_response()
        }
        _ => {
            log::error!("Dispatch unavailable: {}", error);
            (StatusCode::SERVICE_UNAVAILABLE, error.to_string()).into_response()
        }
    }
}

/// Handler for /health
///
/// 200 once initialized, 503 while starting or after a failed start.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.uptime();
    let ready = state.is_ready();
    let init_error = state.init_error();
    state.metrics.queue_depth.set(state.bridge.queue_depth() as i64);

    let status = if ready {
        "ready"
    } else if state.is_initializing() {
        "initializing"
    } else if init_error.is_some() {
        "failed"
    } else {
        "starting"
    };

    let body = serde_json::json!({
        "status": status,
        "ready": ready,
        "init_error": init_error,
        "mode": format!("{:?}", state.mode).to_lowercase(),
        "bot": state.bot_username(),
        "questions_at_startup": state.question_count(),
        "queue": {
            "depth": state.bridge.queue_depth(),
            "capacity": state.bridge.capacity(),
        },
        "started_at": state.started_at().to_rfc3339(),
        "uptime_seconds": uptime.as_secs(),
        "uptime_human": format_duration(uptime),
        "service": "quizbot",
        "version": env!("CARGO_PKG_VERSION"),
    });

    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

/// Handler for /init
///
/// Waits for the attempt to finish (bounded by INIT_TIMEOUT_SECS).
async fn init_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match app::initialize(Arc::clone(&state)).await {
        InitOutcome::Ready => (StatusCode::OK, Json(serde_json::json!({"status": "ready"}))),
        InitOutcome::InProgress => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"status": "initializing"})),
        ),
        InitOutcome::Failed(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "failed", "error": error})),
        ),
    }
}

/// Handler for /env
async fn env_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let vars: serde_json::Map<String, serde_json::Value> = config::DIAGNOSTIC_VARS
        .iter()
        .map(|&(name, secret)| {
            let value = std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| if secret { config::mask(&v) } else { v });
            let entry = serde_json::json!({
                "present": value.is_some(),
                "value": value,
            });
            (name.to_string(), entry)
        })
        .collect();

    Json(serde_json::json!({
        "vars": vars,
        "subscription_required": *config::REQUIRE_SUBSCRIPTION,
        "init_error": state.init_error(),
    }))
}

/// Handler for /metrics
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.queue_depth.set(state.bridge.queue_depth() as i64);
    match state.metrics.render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            log::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Format duration as human-readable string
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let days = total_secs / 86400;
    let hours = (total_secs % 86400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
