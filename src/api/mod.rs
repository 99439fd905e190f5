//! HTTP surface: background jobs plus synchronous summaries.

mod sync;
mod upload;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::JobError;
use crate::jobs::{Job, JobCoordinator};
use crate::summarize::{Summarizer, SummaryRequest};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<JobCoordinator>,
    /// Same summarizer the jobs use, called inline by the synchronous routes.
    pub summarizer: Arc<dyn Summarizer>,
    pub config: Arc<ServiceConfig>,
}

/// Build the Axum router with job, summary, health and config routes.
pub fn job_routes(coordinator: Arc<JobCoordinator>, config: Arc<ServiceConfig>) -> Router {
    let state = AppState {
        summarizer: coordinator.summarizer(),
        coordinator,
        config,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/config", get(service_config))
        .route("/models", get(sync::list_models))
        .route("/summarize/text", post(sync::summarize_text))
        .route("/summarize/file", post(sync::summarize_file))
        .route("/summarize/batch", post(sync::summarize_batch))
        .route("/api/jobs", get(list_jobs).post(create_job))
        .route("/api/jobs/upload", post(upload::upload_job))
        .route("/api/jobs/cleanup", post(cleanup_jobs))
        .route("/api/jobs/{id}", get(get_job).delete(cancel_job))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}

fn job_error_response(err: JobError) -> Response {
    let status = match &err {
        JobError::NotFound { .. } => StatusCode::NOT_FOUND,
        JobError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        JobError::AlreadyTerminal { .. } => StatusCode::CONFLICT,
        JobError::Overloaded { .. } | JobError::PoolClosed => StatusCode::SERVICE_UNAVAILABLE,
        JobError::ExecutionFailure(_) | JobError::InvalidTransition { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        warn!(error = %err, "Job request failed");
    }
    error_response(status, err.to_string())
}

fn parse_job_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid job ID"))
}

/// 202 body for a freshly submitted job.
fn accepted(job: &Job) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "id": job.id,
            "status": job.status,
            "created_at": job.created_at,
            "message": format!("Job submitted. Poll /api/jobs/{} for status.", job.id),
        })),
    )
        .into_response()
}

// ── Health / Config ─────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "summarizer",
        "jobs": state.coordinator.summary().await,
    }))
}

async fn service_config(State(state): State<AppState>) -> impl IntoResponse {
    let config = &state.config;
    Json(serde_json::json!({
        "provider": config.llm.backend.as_str(),
        "default_model": config.llm.model,
        "max_tokens": config.llm.max_tokens,
        "temperature": config.llm.temperature,
        "supported_extensions": config.supported_extensions,
        "max_workers": state.coordinator.workers(),
        "max_queue_depth": config.max_queue_depth,
        "retention_hours": config.retention_hours,
    }))
}

// ── Jobs ────────────────────────────────────────────────────────────────

async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected job submission");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state.coordinator.start_job(request).await {
        Ok(job) => accepted(&job),
        Err(e) => {
            warn!(error = %e, "Job not started");
            job_error_response(e)
        }
    }
}

async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    let jobs: HashMap<Uuid, Job> = state.coordinator.list_all().await;
    Json(serde_json::json!({
        "total": jobs.len(),
        "jobs": jobs,
    }))
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let job_id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.coordinator.get_status(job_id).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => job_error_response(e),
    }
}

async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let job_id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.coordinator.cancel(job_id).await {
        Ok(job) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "id": job.id,
                "status": job.status,
                "message": "Cancellation requested",
            })),
        )
            .into_response(),
        Err(e) => job_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct CleanupParams {
    max_age_hours: Option<u64>,
}

async fn cleanup_jobs(
    State(state): State<AppState>,
    Query(params): Query<CleanupParams>,
) -> impl IntoResponse {
    let max_age_hours = params.max_age_hours.unwrap_or(state.config.retention_hours);
    let removed = state.coordinator.cleanup(max_age_hours).await;
    info!(removed, max_age_hours, "Manual cleanup");
    Json(serde_json::json!({
        "removed": removed,
        "max_age_hours": max_age_hours,
        "message": format!("Removed {removed} finished jobs older than {max_age_hours} hours"),
    }))
}
