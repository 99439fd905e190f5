//! Multipart document upload.
//!
//! `POST /api/jobs/upload` stores files for a background job; the synchronous
//! `/summarize/file` and `/summarize/batch` routes use a scratch directory
//! that is removed once the summary is returned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Response,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AppState, accepted, error_response, job_error_response};
use crate::config::ServiceConfig;
use crate::summarize::SummaryRequest;
use crate::summarize::documents::{extension_of, is_supported};

/// Where received files are written.
pub(super) enum Storage {
    /// `upload_<uuid><ext>` directly under the upload dir, kept for the job.
    Job,
    /// Original file names under a per-request directory.
    Scratch(PathBuf),
}

impl Storage {
    pub(super) fn scratch(config: &ServiceConfig) -> Self {
        Self::Scratch(config.upload_dir.join(format!("sync_{}", Uuid::new_v4())))
    }

    fn path_for(&self, upload_dir: &Path, original: &str, index: usize) -> PathBuf {
        match self {
            Self::Job => upload_dir.join(format!(
                "upload_{}{}",
                Uuid::new_v4(),
                extension_of(Path::new(original))
            )),
            Self::Scratch(dir) => {
                let name = Path::new(original)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("upload{}", extension_of(Path::new(original))));
                dir.join(index.to_string()).join(name)
            }
        }
    }

    /// Remove a scratch directory and everything in it.
    pub(super) async fn discard(&self) {
        if let Self::Scratch(dir) = self {
            if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                debug!(error = %e, dir = %dir.display(), "Could not remove scratch uploads");
            }
        }
    }
}

/// Files and text fields pulled out of a multipart body.
pub(super) struct Received {
    pub paths: Vec<PathBuf>,
    pub fields: HashMap<String, String>,
}

impl Received {
    pub(super) fn field(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Read every field: `file`/`files` parts are stored, anything else is kept as text.
///
/// Unsupported files are rejected, or skipped when `skip_unsupported` is set.
pub(super) async fn receive(
    multipart: &mut Multipart,
    config: &ServiceConfig,
    storage: &Storage,
    skip_unsupported: bool,
) -> Result<Received, Response> {
    let mut saved: Vec<PathBuf> = Vec::new();
    let mut fields = HashMap::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                remove_files(&saved).await;
                return Err(error_response(StatusCode::BAD_REQUEST, e.body_text()));
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if name != "file" && name != "files" {
            match field.text().await {
                Ok(text) => {
                    fields.insert(name, text);
                }
                Err(e) => {
                    remove_files(&saved).await;
                    return Err(error_response(StatusCode::BAD_REQUEST, e.body_text()));
                }
            }
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if !is_supported(Path::new(&original), &config.supported_extensions) {
            if skip_unsupported {
                debug!(file = %original, "Skipping unsupported upload");
                continue;
            }
            remove_files(&saved).await;
            warn!(file = %original, "Rejected upload with unsupported type");
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!(
                    "unsupported file type: {}. Supported: {}",
                    extension_of(Path::new(&original)),
                    config.supported_extensions.join(", ")
                ),
            ));
        }

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_files(&saved).await;
                return Err(error_response(StatusCode::BAD_REQUEST, e.body_text()));
            }
        };

        let path = storage.path_for(&config.upload_dir, &original, saved.len());
        if let Err(e) = save_file(&path, &bytes).await {
            remove_files(&saved).await;
            warn!(error = %e, path = %path.display(), "Could not store upload");
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("could not store upload: {e}"),
            ));
        }
        debug!(file = %original, path = %path.display(), bytes = bytes.len(), "Stored upload");
        saved.push(path);
    }

    Ok(Received {
        paths: saved,
        fields,
    })
}

/// `POST /api/jobs/upload`: fields `file` (one) or `files` (repeated), plus optional `model_name`.
pub(super) async fn upload_job(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let received = match receive(&mut multipart, &state.config, &Storage::Job, false).await {
        Ok(received) => received,
        Err(resp) => return resp,
    };
    let model_name = received.field("model_name");

    let paths: Vec<String> = received
        .paths
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    let request = match paths.as_slice() {
        [] => return error_response(StatusCode::BAD_REQUEST, "no files provided"),
        [single] => SummaryRequest::FileSummarization {
            file_path: single.clone(),
            model_name,
        },
        _ => SummaryRequest::BatchSummarization {
            file_paths: paths.clone(),
            model_name,
        },
    };

    match state.coordinator.start_job(request).await {
        Ok(job) => {
            info!(job_id = %job.id, files = paths.len(), "Upload job submitted");
            accepted(&job)
        }
        Err(e) => {
            remove_files(&received.paths).await;
            job_error_response(e)
        }
    }
}

async fn save_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, bytes).await
}

async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            debug!(error = %e, path = %path.display(), "Could not remove upload");
        }
    }
}
