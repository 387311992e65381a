//! Job storage contract and the in-memory implementation.
//!
//! The conditional-update methods are the concurrency mechanism: each is an
//! atomic compare-and-swap against the row's current state, and reports
//! whether this caller was the one that applied the change.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use clipforge_core::{JobId, OwnerId};

use crate::types::{Job, JobStatus, ProviderRef};

/// Job store abstraction.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job row.
    async fn insert(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Point read by id.
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// List an owner's jobs, newest first.
    async fn list_for_owner(&self, owner: OwnerId, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// List non-terminal jobs across owners, oldest first (sweep input).
    async fn list_active(&self, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Record the provider's acceptance: set the provider ref and move
    /// `queued → processing`. Returns false if the job already left `queued`.
    async fn mark_processing(
        &self,
        job_id: JobId,
        provider_ref: &ProviderRef,
        progress: u8,
    ) -> Result<bool, JobStoreError>;

    /// Informational progress update; ignored once the job is terminal.
    async fn update_progress(&self, job_id: JobId, progress: u8) -> Result<(), JobStoreError>;

    /// Soft lock: set `done` + result + progress 100 **only if** the result
    /// ref is still unset. Returns true iff this caller won the race.
    async fn finalize_if_unset(
        &self,
        job_id: JobId,
        result_ref: &str,
    ) -> Result<bool, JobStoreError>;

    /// Move a non-terminal job to `failed` with the given error detail.
    /// Returns true iff this caller performed the transition.
    async fn fail_if_active(&self, job_id: JobId, error: &str) -> Result<bool, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.write();
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.read().get(&job_id).cloned())
    }

    async fn list_for_owner(
        &self,
        owner: OwnerId,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let mut result: Vec<_> = self
            .read()
            .values()
            .filter(|j| j.owner == owner)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn list_active(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let mut result: Vec<_> = self
            .read()
            .values()
            .filter(|j| !j.is_terminal())
            .cloned()
            .collect();
        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    async fn mark_processing(
        &self,
        job_id: JobId,
        provider_ref: &ProviderRef,
        progress: u8,
    ) -> Result<bool, JobStoreError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if job.status != JobStatus::Queued {
            return Ok(false);
        }
        job.status = JobStatus::Processing;
        job.provider_ref = Some(provider_ref.clone());
        job.progress = progress.min(100);
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_progress(&self, job_id: JobId, progress: u8) -> Result<(), JobStoreError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if job.is_terminal() {
            return Ok(());
        }
        job.status = JobStatus::Processing;
        job.progress = progress.min(100);
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn finalize_if_unset(
        &self,
        job_id: JobId,
        result_ref: &str,
    ) -> Result<bool, JobStoreError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if job.result_ref.is_some() || job.is_terminal() {
            return Ok(false);
        }
        job.status = JobStatus::Done;
        job.result_ref = Some(result_ref.to_string());
        job.progress = 100;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn fail_if_active(&self, job_id: JobId, error: &str) -> Result<bool, JobStoreError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if job.is_terminal() {
            return Ok(false);
        }
        job.status = JobStatus::Failed;
        job.error = Some(error.to_string());
        job.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl<T: JobStore + ?Sized> JobStore for Arc<T> {
    async fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).insert(job).await
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id).await
    }

    async fn list_for_owner(
        &self,
        owner: OwnerId,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_for_owner(owner, limit).await
    }

    async fn list_active(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_active(limit).await
    }

    async fn mark_processing(
        &self,
        job_id: JobId,
        provider_ref: &ProviderRef,
        progress: u8,
    ) -> Result<bool, JobStoreError> {
        (**self).mark_processing(job_id, provider_ref, progress).await
    }

    async fn update_progress(&self, job_id: JobId, progress: u8) -> Result<(), JobStoreError> {
        (**self).update_progress(job_id, progress).await
    }

    async fn finalize_if_unset(
        &self,
        job_id: JobId,
        result_ref: &str,
    ) -> Result<bool, JobStoreError> {
        (**self).finalize_if_unset(job_id, result_ref).await
    }

    async fn fail_if_active(&self, job_id: JobId, error: &str) -> Result<bool, JobStoreError> {
        (**self).fail_if_active(job_id, error).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued_job(owner: OwnerId) -> Job {
        Job::new_generate(owner, "a cat surfing".into(), "a cat surfing".into(), 1)
    }

    #[tokio::test]
    async fn insert_and_mark_processing() {
        let store = InMemoryJobStore::new();
        let job = queued_job(OwnerId::new());
        let id = store.insert(job).await.unwrap();

        let won = store
            .mark_processing(id, &ProviderRef::new("video_123"), 5)
            .await
            .unwrap();
        assert!(won);

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.provider_ref.as_ref().unwrap().as_str(), "video_123");

        // Second attempt loses: the row already left queued.
        let won = store
            .mark_processing(id, &ProviderRef::new("video_456"), 5)
            .await
            .unwrap();
        assert!(!won);
    }

    #[tokio::test]
    async fn finalize_is_single_winner() {
        let store = InMemoryJobStore::new();
        let job = queued_job(OwnerId::new());
        let id = store.insert(job).await.unwrap();
        store
            .mark_processing(id, &ProviderRef::new("video_123"), 0)
            .await
            .unwrap();

        assert!(store.finalize_if_unset(id, "https://cdn/a.mp4").await.unwrap());
        assert!(!store.finalize_if_unset(id, "https://cdn/b.mp4").await.unwrap());

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.result_ref.as_deref(), Some("https://cdn/a.mp4"));
        assert_eq!(job.progress, 100);
    }

    #[tokio::test]
    async fn fail_if_active_is_terminal_and_single_winner() {
        let store = InMemoryJobStore::new();
        let job = queued_job(OwnerId::new());
        let id = store.insert(job).await.unwrap();

        assert!(store.fail_if_active(id, "content_policy_violation").await.unwrap());
        assert!(!store.fail_if_active(id, "other").await.unwrap());

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("content_policy_violation"));

        // Terminal rows are immutable.
        store.update_progress(id, 50).await.unwrap();
        assert!(!store.finalize_if_unset(id, "https://cdn/a.mp4").await.unwrap());
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 0);
    }

    #[tokio::test]
    async fn list_active_is_oldest_first_and_bounded() {
        let store = InMemoryJobStore::new();
        let owner = OwnerId::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(store.insert(queued_job(owner)).await.unwrap());
        }
        store.fail_if_active(ids[1], "boom").await.unwrap();

        let active = store.list_active(10).await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active[0].created_at <= active[1].created_at);

        let bounded = store.list_active(1).await.unwrap();
        assert_eq!(bounded.len(), 1);
    }
}
