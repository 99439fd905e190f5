//! In-memory job store shared by the coordinator and the HTTP layer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::model::{Job, JobInput, JobKind, JobStatus};

/// Owns every job record for the lifetime of the process.
///
/// All access goes through a single lock, so readers never observe a
/// half-applied update. Callers only ever get clones back.
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl JobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a new pending job and return its id.
    pub async fn create(&self, kind: JobKind, input: JobInput) -> Uuid {
        let mut jobs = self.jobs.write().await;
        // v4 collisions are practically impossible, but ids must never be reused.
        let mut job = Job::new(kind, input.clone());
        while jobs.contains_key(&job.id) {
            job = Job::new(kind, input.clone());
        }
        let id = job.id;
        jobs.insert(id, job);
        id
    }

    /// Get a snapshot of a job.
    pub async fn get(&self, id: Uuid) -> Result<Job, JobError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound { id })
    }

    /// Apply a mutation to a job atomically.
    ///
    /// The mutation runs against a copy; the copy replaces the stored record
    /// only if the mutation returns `Ok`. Returns the committed snapshot.
    pub async fn update<F>(&self, id: Uuid, f: F) -> Result<Job, JobError>
    where
        F: FnOnce(&mut Job) -> Result<(), JobError>,
    {
        let mut jobs = self.jobs.write().await;
        let stored = jobs.get_mut(&id).ok_or(JobError::NotFound { id })?;

        let mut next = stored.clone();
        f(&mut next)?;
        next.touch();
        *stored = next.clone();
        Ok(next)
    }

    /// Point-in-time copy of every job.
    pub async fn list(&self) -> Vec<Job> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// Remove terminal jobs in `statuses` that completed at or before `older_than`.
    ///
    /// Pending and running jobs are never removed, whatever `statuses` says.
    /// Returns the number of jobs removed.
    pub async fn evict(&self, older_than: DateTime<Utc>, statuses: &[JobStatus]) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            let expired = job.is_terminal()
                && statuses.contains(&job.status)
                && job.completed_at.is_some_and(|done| done <= older_than);
            !expired
        });
        before - jobs.len()
    }

    /// Drop a record that never reached a worker.
    pub async fn remove(&self, id: Uuid) -> Option<Job> {
        self.jobs.write().await.remove(&id)
    }

    /// Count jobs per status.
    pub async fn summary(&self) -> JobSummary {
        let jobs = self.jobs.read().await;

        let mut summary = JobSummary::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::Running => summary.running += 1,
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
            }
        }

        summary.total = jobs.len();
        summary
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Job counts by status.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct JobSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_input(len: usize) -> JobInput {
        JobInput {
            text_length: Some(len),
            ..Default::default()
        }
    }

    async fn finished_job(store: &JobStore, ok: bool) -> Uuid {
        let id = store.create(JobKind::TextSummarization, text_input(10)).await;
        store.update(id, |job| job.start()).await.unwrap();
        store
            .update(id, |job| {
                if ok {
                    job.complete(serde_json::json!({"summary": "done"}))
                } else {
                    job.fail("nope")
                }
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = JobStore::new();
        let id = store.create(JobKind::TextSummarization, text_input(300)).await;

        let job = store.get(id).await.unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.kind, JobKind::TextSummarization);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.input.text_length, Some(300));
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let store = JobStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.get(id).await, Err(JobError::NotFound { id: got }) if got == id));
    }

    #[tokio::test]
    async fn update_unknown_is_not_found() {
        let store = JobStore::new();
        let result = store.update(Uuid::new_v4(), |_| Ok(())).await;
        assert!(matches!(result, Err(JobError::NotFound { .. })));
    }

    #[tokio::test]
    async fn failed_mutation_leaves_record_untouched() {
        let store = JobStore::new();
        let id = store.create(JobKind::TextSummarization, text_input(10)).await;
        let before = store.get(id).await.unwrap();

        let result = store
            .update(id, |job| {
                job.error = Some("half-written".into());
                Err(JobError::InvalidRequest("rejected".into()))
            })
            .await;
        assert!(result.is_err());

        let after = store.get(id).await.unwrap();
        assert!(after.error.is_none());
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn update_never_moves_updated_at_backwards() {
        let store = JobStore::new();
        let id = store.create(JobKind::TextSummarization, text_input(10)).await;
        let created = store.get(id).await.unwrap();

        let started = store.update(id, |job| job.start()).await.unwrap();
        assert!(started.updated_at >= created.updated_at);
        assert!(started.updated_at >= started.created_at);
    }

    #[tokio::test]
    async fn evict_removes_only_old_terminal_jobs() {
        let store = JobStore::new();
        let pending = store.create(JobKind::TextSummarization, text_input(10)).await;
        let done = finished_job(&store, true).await;
        let failed = finished_job(&store, false).await;

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let removed = store
            .evict(cutoff, &[JobStatus::Completed, JobStatus::Failed])
            .await;

        assert_eq!(removed, 2);
        assert!(store.get(pending).await.is_ok());
        assert!(store.get(done).await.is_err());
        assert!(store.get(failed).await.is_err());
    }

    #[tokio::test]
    async fn evict_ignores_non_terminal_statuses_in_filter() {
        let store = JobStore::new();
        let pending = store.create(JobKind::FileSummarization, JobInput::default()).await;

        let cutoff = Utc::now() + chrono::Duration::hours(1);
        let removed = store.evict(cutoff, &[JobStatus::Pending]).await;

        assert_eq!(removed, 0);
        assert!(store.get(pending).await.is_ok());
    }

    #[tokio::test]
    async fn evict_respects_cutoff_and_status_filter() {
        let store = JobStore::new();
        let done = finished_job(&store, true).await;
        let failed = finished_job(&store, false).await;

        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(store.evict(past, &[JobStatus::Completed, JobStatus::Failed]).await, 0);

        let future = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(store.evict(future, &[JobStatus::Failed]).await, 1);
        assert!(store.get(done).await.is_ok());
        assert!(store.get(failed).await.is_err());
    }

    #[tokio::test]
    async fn summary_counts_statuses() {
        let store = JobStore::new();
        store.create(JobKind::TextSummarization, text_input(10)).await;
        finished_job(&store, true).await;
        finished_job(&store, false).await;

        let summary = store.summary().await;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn remove_drops_record() {
        let store = JobStore::new();
        let id = store.create(JobKind::TextSummarization, text_input(10)).await;

        assert_eq!(store.remove(id).await.map(|job| job.id), Some(id));
        assert!(matches!(store.get(id).await, Err(JobError::NotFound { .. })));
        assert!(store.remove(id).await.is_none());
        assert_eq!(store.summary().await.total, 0);
    }

    #[tokio::test]
    async fn concurrent_creates_produce_distinct_ids() {
        let store = std::sync::Arc::new(JobStore::new());
        let handles: Vec<_> = (0..50)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move {
                    store.create(JobKind::TextSummarization, text_input(i)).await
                })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 50);
        assert_eq!(store.list().await.len(), 50);
    }
}
