//! Summarization requests and the collaborator that fulfils them.
//!
//! - `documents`: loads text documents from disk
//! - `llm_summarizer`: LLM-backed [`Summarizer`] (summary, key points, refine, polish)

pub mod documents;
mod llm_summarizer;

pub use llm_summarizer::{LlmSummarizer, SummarizerConfig};

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{JobError, SummarizeError};
use crate::jobs::model::{JobInput, JobKind};

/// Minimum length of text accepted for summarization, in characters.
pub const MIN_TEXT_LENGTH: usize = 10;

/// Depth of a synchronous summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    /// One LLM call, optionally steered by a custom prompt.
    #[default]
    Basic,
    /// The full multi-step workflow.
    Advanced,
}

impl SummaryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
        }
    }
}

impl std::str::FromStr for SummaryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            other => Err(format!("unknown summary_type {other:?} (expected basic or advanced)")),
        }
    }
}

/// A unit of summarization work, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummaryRequest {
    TextSummarization {
        text: String,
        #[serde(default)]
        model_name: Option<String>,
    },
    FileSummarization {
        file_path: String,
        #[serde(default)]
        model_name: Option<String>,
    },
    BatchSummarization {
        file_paths: Vec<String>,
        #[serde(default)]
        model_name: Option<String>,
    },
}

impl SummaryRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::TextSummarization { .. } => JobKind::TextSummarization,
            Self::FileSummarization { .. } => JobKind::FileSummarization,
            Self::BatchSummarization { .. } => JobKind::BatchSummarization,
        }
    }

    /// Requested model, ignoring blank values.
    pub fn model_name(&self) -> Option<&str> {
        let model = match self {
            Self::TextSummarization { model_name, .. }
            | Self::FileSummarization { model_name, .. }
            | Self::BatchSummarization { model_name, .. } => model_name.as_deref(),
        };
        model.map(str::trim).filter(|m| !m.is_empty())
    }

    /// Size-bounded description of the request for the job record.
    pub fn input(&self) -> JobInput {
        let model_name = self.model_name().map(str::to_string);
        match self {
            Self::TextSummarization { text, .. } => JobInput {
                text_length: Some(text.chars().count()),
                model_name,
                ..Default::default()
            },
            Self::FileSummarization { file_path, .. } => JobInput {
                file_path: Some(file_path.clone()),
                model_name,
                ..Default::default()
            },
            Self::BatchSummarization { file_paths, .. } => JobInput {
                file_count: Some(file_paths.len()),
                model_name,
                ..Default::default()
            },
        }
    }

    /// Reject malformed requests before any job is created.
    pub async fn validate(&self, supported_extensions: &[String]) -> Result<(), JobError> {
        match self {
            Self::TextSummarization { text, .. } => {
                if text.trim().chars().count() < MIN_TEXT_LENGTH {
                    return Err(JobError::InvalidRequest(format!(
                        "text must be at least {MIN_TEXT_LENGTH} characters"
                    )));
                }
                Ok(())
            }
            Self::FileSummarization { file_path, .. } => {
                validate_file(file_path, supported_extensions).await
            }
            Self::BatchSummarization { file_paths, .. } => {
                if file_paths.is_empty() {
                    return Err(JobError::InvalidRequest("no files provided".to_string()));
                }
                for path in file_paths {
                    validate_file(path, supported_extensions).await?;
                }
                Ok(())
            }
        }
    }
}

async fn validate_file(file_path: &str, supported_extensions: &[String]) -> Result<(), JobError> {
    let path = Path::new(file_path);
    if !documents::is_supported(path, supported_extensions) {
        return Err(JobError::InvalidRequest(format!(
            "unsupported file type: {}. Supported: {}",
            documents::extension_of(path),
            supported_extensions.join(", ")
        )));
    }
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(JobError::InvalidRequest(format!(
            "file not found: {file_path}"
        ))),
    }
}

/// The external summarization capability invoked on the worker pool.
///
/// A single blocking call per job: no progress is reported besides completion.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Full workflow. Jobs always run this.
    async fn summarize(&self, request: &SummaryRequest) -> Result<serde_json::Value, SummarizeError>;

    /// Quick summary for the synchronous routes. Defaults to the full workflow.
    async fn summarize_basic(
        &self,
        request: &SummaryRequest,
        _custom_prompt: Option<&str>,
    ) -> Result<serde_json::Value, SummarizeError> {
        self.summarize(request).await
    }

    /// Model used when a request names none.
    fn default_model(&self) -> &str;
}
