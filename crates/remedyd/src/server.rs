//! HTTP control plane for remedyd.
//!
//! Local-only REST surface: a push-event webhook, a manual trigger, and
//! a status read. Trigger handlers run the cycle to completion so the
//! returned envelope is the cycle's real terminal report; a second
//! trigger racing an in-flight cycle is rejected with 409.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use remedy_core::report::{CycleOutcome, CycleReport};
use remedy_core::types::PushEvent;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::orchestrator::{CycleEntry, CycleRunner};

/// Shared state for HTTP handlers.
pub struct AppState {
    pub runner: Arc<dyn CycleRunner>,
    pub cancel: CancellationToken,
    pub auth_token: Option<String>,
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/hooks/push", post(push_hook))
        .route("/trigger", post(trigger))
        .route("/status", get(status))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server, bound to localhost only.
pub async fn start_server(
    state: Arc<AppState>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cancel = state.cancel.clone();
    let router = create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("HTTP server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: message.into(),
        }),
    )
}

/// Validate auth token if configured.
fn check_auth(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if let Some(expected) = &state.auth_token {
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.strip_prefix("Bearer ").unwrap_or(s));

        match provided {
            Some(token) if token == expected => Ok(()),
            Some(_) => Err(error_response(StatusCode::UNAUTHORIZED, "invalid auth token")),
            None => Err(error_response(StatusCode::UNAUTHORIZED, "missing auth token")),
        }
    } else {
        Ok(())
    }
}

/// Map a finished cycle report onto a response; entry-guard rejections
/// become 409, everything else carries the envelope with 200.
fn report_response(report: CycleReport) -> (StatusCode, Json<CycleReport>) {
    let status = if report.outcome == CycleOutcome::Rejected {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    };
    (status, Json(report))
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /hooks/push - push-event webhook.
async fn push_hook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(event): Json<PushEvent>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    check_auth(&state, &headers)?;

    info!(branch = event.branch(), commits = event.commits.len(), "push event received");
    let report = state
        .runner
        .run_cycle(CycleEntry::Push(event), state.cancel.child_token())
        .await;
    Ok(report_response(report))
}

/// POST /trigger - manual trigger, no body.
async fn trigger(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    check_auth(&state, &headers)?;

    info!("manual trigger received");
    let report = state
        .runner
        .run_cycle(CycleEntry::Manual, state.cancel.child_token())
        .await;
    Ok(report_response(report))
}

/// GET /status - orchestrator state snapshot.
async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    check_auth(&state, &headers)?;
    Ok(Json(state.runner.status()))
}
