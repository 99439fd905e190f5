//! Job coordinator: runs submitted summarization jobs on the worker pool.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::model::{Job, JobStatus};
use crate::jobs::pool::{WorkerPool, panic_message};
use crate::jobs::store::{JobStore, JobSummary};
use crate::summarize::{Summarizer, SummaryRequest};

/// Error recorded on a job cancelled before a worker picked it up.
pub const CANCELLED_BEFORE_START: &str = "cancelled before execution started";

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub max_workers: usize,
    pub max_queue_depth: Option<usize>,
    pub supported_extensions: Vec<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_workers: crate::jobs::pool::DEFAULT_POOL_SIZE,
            max_queue_depth: None,
            supported_extensions: crate::summarize::documents::SUPPORTED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Bridges the worker pool and the job store.
///
/// Only the worker running a job's closure writes its status, so per-job
/// transitions are strictly ordered. No store lock is held while the
/// summarizer runs.
pub struct JobCoordinator {
    store: Arc<JobStore>,
    pool: WorkerPool,
    summarizer: Arc<dyn Summarizer>,
    supported_extensions: Vec<String>,
}

impl JobCoordinator {
    /// Create a coordinator and start its worker pool.
    pub fn new(
        store: Arc<JobStore>,
        summarizer: Arc<dyn Summarizer>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            pool: WorkerPool::new(config.max_workers, config.max_queue_depth),
            summarizer,
            supported_extensions: config.supported_extensions,
        }
    }

    /// Validate, record and enqueue a job. Returns the pending snapshot
    /// without waiting for execution.
    pub async fn start_job(&self, request: SummaryRequest) -> Result<Job, JobError> {
        request.validate(&self.supported_extensions).await?;
        let slot = self.pool.reserve()?;

        let id = self.store.create(request.kind(), request.input()).await;
        let snapshot = self.store.get(id).await?;

        let store = Arc::clone(&self.store);
        let summarizer = Arc::clone(&self.summarizer);
        if let Err(e) = slot.submit(run_job(store, summarizer, id, request)) {
            warn!(job_id = %id, error = %e, "Job could not be queued");
            self.store.remove(id).await;
            return Err(e);
        }

        info!(job_id = %id, kind = %snapshot.kind, queued = self.pool.queued(), "Job submitted");
        Ok(snapshot)
    }

    /// The summarizer jobs run against, shared with the synchronous routes.
    pub fn summarizer(&self) -> Arc<dyn Summarizer> {
        Arc::clone(&self.summarizer)
    }

    /// Current snapshot of a job.
    pub async fn get_status(&self, id: Uuid) -> Result<Job, JobError> {
        self.store.get(id).await
    }

    /// Snapshot of every job, keyed by id.
    pub async fn list_all(&self) -> HashMap<Uuid, Job> {
        self.store
            .list()
            .await
            .into_iter()
            .map(|job| (job.id, job))
            .collect()
    }

    /// Request cancellation of an in-flight job.
    ///
    /// Terminal jobs are rejected unchanged. A pending job fails when a worker
    /// picks it up; a running job still runs to completion.
    pub async fn cancel(&self, id: Uuid) -> Result<Job, JobError> {
        let job = self.store.update(id, |job| job.request_cancel()).await?;
        info!(job_id = %id, status = %job.status, "Cancellation requested");
        Ok(job)
    }

    /// Evict terminal jobs that finished more than `max_age_hours` ago.
    pub async fn cleanup(&self, max_age_hours: u64) -> usize {
        let hours = i64::try_from(max_age_hours).unwrap_or(i64::MAX);
        let cutoff = chrono::Duration::try_hours(hours)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let removed = self
            .store
            .evict(cutoff, &[JobStatus::Completed, JobStatus::Failed])
            .await;
        if removed > 0 {
            info!(removed, max_age_hours, "Evicted finished jobs");
        }
        removed
    }

    /// Job counts by status.
    pub async fn summary(&self) -> JobSummary {
        self.store.summary().await
    }

    /// Worker pool size.
    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Stop accepting jobs and wait for queued and running ones to finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

/// Runs on a pool worker: Pending → Running → Completed/Failed.
async fn run_job(
    store: Arc<JobStore>,
    summarizer: Arc<dyn Summarizer>,
    id: Uuid,
    request: SummaryRequest,
) {
    let picked_up = store
        .update(id, |job| {
            if job.cancel_requested_at.is_some() {
                job.fail(CANCELLED_BEFORE_START)
            } else {
                job.start()
            }
        })
        .await;

    match picked_up {
        Ok(job) if job.status == JobStatus::Failed => {
            info!(job_id = %id, "Job cancelled before start");
            return;
        }
        Ok(_) => {}
        Err(e) => {
            error!(job_id = %id, error = %e, "Could not start job");
            return;
        }
    }

    let outcome = AssertUnwindSafe(summarizer.summarize(&request))
        .catch_unwind()
        .await;

    let recorded = match outcome {
        Ok(Ok(result)) => store.update(id, |job| job.complete(result)).await,
        Ok(Err(e)) => {
            let failure = JobError::ExecutionFailure(e.to_string());
            error!(job_id = %id, error = %failure, "Summarization failed");
            store.update(id, |job| job.fail(failure.to_string())).await
        }
        Err(panic) => {
            let failure = JobError::ExecutionFailure(format!(
                "summarizer panicked: {}",
                panic_message(panic.as_ref())
            ));
            error!(job_id = %id, error = %failure, "Summarization panicked");
            store.update(id, |job| job.fail(failure.to_string())).await
        }
    };

    match recorded {
        Ok(job) => info!(job_id = %id, status = %job.status, "Job finished"),
        Err(e) => error!(job_id = %id, error = %e, "Could not record job outcome"),
    }
}

/// Spawn a background task that periodically evicts old finished jobs.
pub fn spawn_cleanup_task(
    coordinator: Arc<JobCoordinator>,
    interval: Duration,
    retention_hours: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            coordinator.cleanup(retention_hours).await;
        }
    })
}
