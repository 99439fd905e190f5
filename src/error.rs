//! Error types for the summarizer service.

use uuid::Uuid;

use crate::jobs::model::JobStatus;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Job tracking errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Recorded on the job as-is, so the message carries no prefix.
    #[error("{0}")]
    ExecutionFailure(String),

    #[error("Job {id} is already {status}")]
    AlreadyTerminal { id: Uuid, status: JobStatus },

    #[error("Job {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job queue is full ({max} queued)")]
    Overloaded { max: usize },

    #[error("Worker pool is shut down")]
    PoolClosed,
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited: {reason}")]
    RateLimited { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Errors raised by the summarization collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("Unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },

    #[error("Failed to read document {path}: {reason}")]
    DocumentRead { path: String, reason: String },

    #[error("Nothing to summarize: {0}")]
    EmptyInput(String),

    #[error("{0}")]
    Llm(#[from] LlmError),

    #[error("{0}")]
    Other(String),
}
