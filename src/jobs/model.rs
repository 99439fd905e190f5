//! Job record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;

/// Kind of summarization work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    TextSummarization,
    FileSummarization,
    BatchSummarization,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TextSummarization => "text_summarization",
            Self::FileSummarization => "file_summarization",
            Self::BatchSummarization => "batch_summarization",
        };
        write!(f, "{s}")
    }
}

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for a worker.
    Pending,
    /// A worker is calling the summarizer.
    Running,
    /// The summarizer returned a result.
    Completed,
    /// The summarizer failed, or execution never started.
    Failed,
}

impl JobStatus {
    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Pending, Running) | (Pending, Failed) | (Running, Completed) | (Running, Failed)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Sanitized description of what was submitted.
///
/// Holds sizes and paths, never the submitted text itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    pub model_name: Option<String>,
}

/// A tracked unit of summarization work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub input: JobInput,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Set when a client asked to cancel the job while it was in flight.
    pub cancel_requested_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(kind: JobKind, input: JobInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            input,
            result: None,
            error: None,
            cancel_requested_at: None,
        }
    }

    /// Move to `Running`.
    pub fn start(&mut self) -> Result<(), JobError> {
        self.transition_to(JobStatus::Running)
    }

    /// Move to `Completed`, capturing the result.
    pub fn complete(&mut self, result: serde_json::Value) -> Result<(), JobError> {
        self.transition_to(JobStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    /// Move to `Failed`, capturing the error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), JobError> {
        self.transition_to(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Record a best-effort cancellation request.
    ///
    /// Terminal jobs are left untouched.
    pub fn request_cancel(&mut self) -> Result<(), JobError> {
        if self.status.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                id: self.id,
                status: self.status,
            });
        }
        if self.cancel_requested_at.is_none() {
            self.cancel_requested_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Bump `updated_at`, never moving it backwards.
    pub(crate) fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// An illegal transition changes nothing.
    fn transition_to(&mut self, target: JobStatus) -> Result<(), JobError> {
        if !self.status.can_transition_to(target) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        if target.is_terminal() {
            self.completed_at = Some(Utc::now().max(self.updated_at));
        }
        Ok(())
    }
}
