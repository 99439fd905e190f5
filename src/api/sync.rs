//! Synchronous summarization routes: the caller waits for the summary.

use axum::{
    Json,
    extract::{Multipart, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{info, warn};

use super::upload::{Received, Storage, receive};
use super::{AppState, error_response, job_error_response};
use crate::error::SummarizeError;
use crate::summarize::{SummaryRequest, SummaryType};

#[derive(Debug, Deserialize)]
pub(super) struct TextBody {
    text: String,
    #[serde(default)]
    summary_type: SummaryType,
    #[serde(default)]
    model_name: Option<String>,
    /// Replaces the built-in instruction for basic summaries.
    #[serde(default)]
    custom_prompt: Option<String>,
}

/// `POST /summarize/text`
pub(super) async fn summarize_text(
    State(state): State<AppState>,
    payload: Result<Json<TextBody>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let request = SummaryRequest::TextSummarization {
        text: body.text,
        model_name: body.model_name,
    };
    if let Err(e) = request.validate(&state.config.supported_extensions).await {
        return job_error_response(e);
    }

    run(&state, &request, body.summary_type, body.custom_prompt.as_deref()).await
}

/// `POST /summarize/file`: multipart `file`, optional `summary_type` and `model_name`.
pub(super) async fn summarize_file(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let storage = Storage::scratch(&state.config);
    let response = match receive(&mut multipart, &state.config, &storage, false).await {
        Ok(received) => match received.paths.as_slice() {
            [path] => match summary_type(&received) {
                Ok(kind) => {
                    let request = SummaryRequest::FileSummarization {
                        file_path: path.display().to_string(),
                        model_name: received.field("model_name"),
                    };
                    run(&state, &request, kind, None).await
                }
                Err(resp) => resp,
            },
            [] => error_response(StatusCode::BAD_REQUEST, "no file provided"),
            _ => error_response(
                StatusCode::BAD_REQUEST,
                "send one file, or use /summarize/batch for several",
            ),
        },
        Err(resp) => resp,
    };
    storage.discard().await;
    response
}

/// `POST /summarize/batch`: repeated `files`; unsupported types are skipped.
pub(super) async fn summarize_batch(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let storage = Storage::scratch(&state.config);
    let response = match receive(&mut multipart, &state.config, &storage, true).await {
        Ok(received) if received.paths.is_empty() => error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "no supported files found. Supported: {}",
                state.config.supported_extensions.join(", ")
            ),
        ),
        Ok(received) => match summary_type(&received) {
            Ok(kind) => {
                let request = SummaryRequest::BatchSummarization {
                    file_paths: received
                        .paths
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect(),
                    model_name: received.field("model_name"),
                };
                run(&state, &request, kind, None).await
            }
            Err(resp) => resp,
        },
        Err(resp) => resp,
    };
    storage.discard().await;
    response
}

/// `GET /models`
pub(super) async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "provider": state.config.llm.backend.as_str(),
        "default_model": state.summarizer.default_model(),
        "models": state.config.llm.backend.known_models(),
    }))
}

fn summary_type(received: &Received) -> Result<SummaryType, Response> {
    match received.field("summary_type") {
        Some(raw) => raw
            .parse()
            .map_err(|e: String| error_response(StatusCode::BAD_REQUEST, e)),
        None => Ok(SummaryType::default()),
    }
}

async fn run(
    state: &AppState,
    request: &SummaryRequest,
    kind: SummaryType,
    custom_prompt: Option<&str>,
) -> Response {
    let outcome = match kind {
        SummaryType::Basic => state.summarizer.summarize_basic(request, custom_prompt).await,
        SummaryType::Advanced => state.summarizer.summarize(request).await,
    };

    match outcome {
        Ok(mut result) => {
            info!(kind = %request.kind(), summary_type = kind.as_str(), "Synchronous summary done");
            result["summary_type"] = serde_json::json!(kind);
            if result.get("model_used").is_none() {
                result["model_used"] = serde_json::json!(
                    request.model_name().unwrap_or(state.summarizer.default_model())
                );
            }
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(e) => summarize_error_response(e),
    }
}

fn summarize_error_response(err: SummarizeError) -> Response {
    match err {
        SummarizeError::EmptyInput(_) | SummarizeError::UnsupportedFileType { .. } => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        other => {
            warn!(error = %other, "Synchronous summary failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Summarization failed: {other}"),
            )
        }
    }
}
