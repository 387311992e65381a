//! The job lifecycle controller: submission, reconciliation, finalization.
//!
//! Admission is a single atomic decision: the debit-if-covered insert either
//! wins and the job proceeds, or the submission is rejected with no job row
//! and no provider call. Finalization is a soft lock: the conditional write
//! on the result ref admits exactly one winner, and only the winner settles.

use std::sync::Arc;

use tracing::{info, warn};

use clipforge_core::{JobId, OwnerId};
use clipforge_jobs::{Job, JobKind, JobStatus, JobStore, JobStoreError, JobView, TemplateStore};
use clipforge_ledger::{LedgerReason, SettlementEngine, SettlementError};

use crate::ports::{ArtifactStore, ProviderClient, ProviderStatus};

/// Credits debited per job. Fixed at creation.
pub const DEFAULT_JOB_COST: i64 = 1;

const ARTIFACT_CONTENT_TYPE: &str = "video/mp4";

/// Engine-level failure taxonomy. The API layer maps these to status codes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("insufficient credits")]
    InsufficientCredits,
    #[error("{0}")]
    Validation(String),
    #[error("job not found")]
    NotFound,
    #[error("job belongs to another owner")]
    Forbidden,
    #[error("provider create failed: {0}")]
    ProviderCreateFailed(String),
    #[error("artifact fetch failed: {0}")]
    ArtifactFetchFailed(String),
    #[error("artifact upload failed: {0}")]
    ArtifactUploadFailed(String),
    #[error("storage error: {0}")]
    Store(String),
}

impl From<JobStoreError> for EngineError {
    fn from(e: JobStoreError) -> Self {
        match e {
            JobStoreError::NotFound(_) => EngineError::NotFound,
            other => EngineError::Store(other.to_string()),
        }
    }
}

impl From<SettlementError> for EngineError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::InsufficientCredits => EngineError::InsufficientCredits,
            SettlementError::Ledger(inner) => EngineError::Store(inner.to_string()),
        }
    }
}

/// Owns job state transitions and the settlement calls they trigger.
#[derive(Clone)]
pub struct JobLifecycleController {
    jobs: Arc<dyn JobStore>,
    templates: Arc<dyn TemplateStore>,
    provider: Arc<dyn ProviderClient>,
    artifacts: Arc<dyn ArtifactStore>,
    settlement: SettlementEngine,
}

impl JobLifecycleController {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        templates: Arc<dyn TemplateStore>,
        provider: Arc<dyn ProviderClient>,
        artifacts: Arc<dyn ArtifactStore>,
        settlement: SettlementEngine,
    ) -> Self {
        Self {
            jobs,
            templates,
            provider,
            artifacts,
            settlement,
        }
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    pub fn settlement(&self) -> &SettlementEngine {
        &self.settlement
    }

    /// Submit a fresh generation job.
    pub async fn submit(
        &self,
        owner: OwnerId,
        prompt: &str,
        template_id: Option<&str>,
    ) -> Result<Job, EngineError> {
        let prompt = validated_prompt(prompt)?;
        let prompt_final = match template_id {
            Some(id) => {
                let template = self
                    .templates
                    .get(id)
                    .await?
                    .ok_or_else(|| EngineError::Validation(format!("unknown template: {id}")))?;
                template.apply(&prompt)
            }
            None => prompt.clone(),
        };

        let job = Job::new_generate(owner, prompt, prompt_final, DEFAULT_JOB_COST);
        self.admit_and_start(job, None).await
    }

    /// Submit a remix of a previously completed job owned by the caller.
    pub async fn remix_submit(
        &self,
        owner: OwnerId,
        parent_id: JobId,
        prompt: &str,
    ) -> Result<Job, EngineError> {
        let prompt = validated_prompt(prompt)?;

        let parent = self.jobs.get(parent_id).await?.ok_or(EngineError::NotFound)?;
        if parent.owner != owner {
            return Err(EngineError::Forbidden);
        }
        let source = match (&parent.status, &parent.provider_ref) {
            (JobStatus::Done, Some(provider_ref)) if parent.result_ref.is_some() => {
                provider_ref.clone()
            }
            _ => {
                return Err(EngineError::Validation(
                    "parent job is not a completed video".into(),
                ));
            }
        };

        let job = Job::new_remix(owner, prompt, parent_id, DEFAULT_JOB_COST);
        self.admit_and_start(job, Some(source)).await
    }

    /// Debit, persist, then hand the job to the provider. The debit is keyed
    /// by the pre-generated job id so a rejected submission leaves nothing
    /// behind, and a provider failure nets to zero via the refund.
    async fn admit_and_start(
        &self,
        job: Job,
        remix_source: Option<clipforge_jobs::ProviderRef>,
    ) -> Result<Job, EngineError> {
        let job_id = job.id;
        let owner = job.owner;
        let cost = job.cost;
        let reason = debit_reason(job.kind);

        self.settlement
            .charge_for_submission(owner, job_id, cost, reason)
            .await?;
        self.jobs.insert(job.clone()).await?;

        let created = match &remix_source {
            Some(source) => self.provider.remix(source, &job.prompt_final).await,
            None => self.provider.create(&job.prompt_final).await,
        };

        match created {
            Ok(provider_job) => {
                self.jobs
                    .mark_processing(job_id, &provider_job.provider_ref, provider_job.progress)
                    .await?;
                info!(job_id = %job_id, provider_ref = %provider_job.provider_ref, "job accepted by provider");
                self.jobs
                    .get(job_id)
                    .await?
                    .ok_or(EngineError::NotFound)
            }
            Err(e) => {
                let detail = e.to_string();
                warn!(job_id = %job_id, error = %detail, "provider create failed");
                if self.jobs.fail_if_active(job_id, &detail).await? {
                    self.settlement.refund_on_failure(owner, job_id, cost).await?;
                }
                Err(EngineError::ProviderCreateFailed(detail))
            }
        }
    }

    /// Point read scoped to the owner.
    pub async fn get_for_owner(&self, owner: OwnerId, job_id: JobId) -> Result<Job, EngineError> {
        let job = self.jobs.get(job_id).await?.ok_or(EngineError::NotFound)?;
        if job.owner != owner {
            return Err(EngineError::Forbidden);
        }
        Ok(job)
    }

    pub async fn list_for_owner(
        &self,
        owner: OwnerId,
        limit: usize,
    ) -> Result<Vec<Job>, EngineError> {
        Ok(self.jobs.list_for_owner(owner, limit).await?)
    }

    /// Owner-triggered reconcile. Ownership is checked before any provider
    /// call is made.
    pub async fn reconcile_for_owner(
        &self,
        owner: OwnerId,
        job_id: JobId,
    ) -> Result<JobView, EngineError> {
        self.get_for_owner(owner, job_id).await?;
        self.reconcile(job_id).await
    }

    /// Bring local state in line with the provider's. Idempotent; any number
    /// of callers may run this concurrently for the same job.
    pub async fn reconcile(&self, job_id: JobId) -> Result<JobView, EngineError> {
        let job = self.jobs.get(job_id).await?.ok_or(EngineError::NotFound)?;

        // Settled rows are served from the store without a provider call.
        if job.result_ref.is_some() || job.is_terminal() {
            return Ok(job.view());
        }
        let Some(provider_ref) = job.provider_ref.clone() else {
            return Ok(job.view());
        };

        let status = match self.provider.retrieve(&provider_ref).await {
            Ok(status) => status,
            Err(e) => {
                // Transient. The next reconcile attempt retries naturally.
                warn!(job_id = %job_id, error = %e, "provider status check failed");
                return Ok(job
                    .view()
                    .with_warning(format!("provider status check failed: {e}")));
            }
        };

        match status.status {
            ProviderStatus::Completed => self.finalize(&job).await,
            ProviderStatus::Failed => {
                let detail = status
                    .error
                    .unwrap_or_else(|| "provider reported failure".into());
                self.fail_and_refund(&job, &detail).await?;
                self.current_view(job_id).await
            }
            ProviderStatus::Queued | ProviderStatus::Processing => {
                self.jobs.update_progress(job_id, status.progress).await?;
                self.current_view(job_id).await
            }
        }
    }

    /// Download, store, and conditionally publish the artifact. The
    /// conditional write admits one winner; losers return the winner's view.
    pub async fn finalize(&self, job: &Job) -> Result<JobView, EngineError> {
        let current = self.jobs.get(job.id).await?.ok_or(EngineError::NotFound)?;
        if current.result_ref.is_some() {
            return Ok(current.view());
        }
        let Some(provider_ref) = current.provider_ref.clone() else {
            return Ok(current.view());
        };

        let bytes = match self.provider.download_content(&provider_ref).await {
            Ok(bytes) => bytes,
            Err(e) => {
                // The provider said completed but the artifact is not
                // fetchable. Terminal by policy, not retried.
                let detail = format!("artifact download failed: {e}");
                self.fail_and_refund(&current, &detail).await?;
                return Err(EngineError::ArtifactFetchFailed(detail));
            }
        };

        let path = artifact_path(current.owner, current.id);
        let public_ref = match self
            .artifacts
            .upload(&path, bytes, ARTIFACT_CONTENT_TYPE)
            .await
        {
            Ok(public_ref) => public_ref,
            Err(e) => {
                let detail = e.to_string();
                self.fail_and_refund(&current, &detail).await?;
                return Err(EngineError::ArtifactUploadFailed(detail));
            }
        };

        if self.jobs.finalize_if_unset(current.id, &public_ref).await? {
            info!(job_id = %current.id, result_ref = %public_ref, "job finalized");
            // Backstop. Under charge-at-submission this is a duplicate and
            // settles as a no-op; it guarantees the debit exists either way.
            self.settlement
                .charge_on_completion(current.owner, current.id, current.cost, debit_reason(current.kind))
                .await?;
        }
        self.current_view(current.id).await
    }

    /// Terminal failure path: single transition winner performs the refund.
    async fn fail_and_refund(&self, job: &Job, detail: &str) -> Result<(), EngineError> {
        if self.jobs.fail_if_active(job.id, detail).await? {
            warn!(job_id = %job.id, error = %detail, "job failed");
            self.settlement
                .refund_on_failure(job.owner, job.id, job.cost)
                .await?;
        }
        Ok(())
    }

    async fn current_view(&self, job_id: JobId) -> Result<JobView, EngineError> {
        Ok(self
            .jobs
            .get(job_id)
            .await?
            .ok_or(EngineError::NotFound)?
            .view())
    }
}

fn debit_reason(kind: JobKind) -> LedgerReason {
    match kind {
        JobKind::Generate => LedgerReason::VideoDone,
        JobKind::Remix => LedgerReason::VideoRemix,
    }
}

fn validated_prompt(prompt: &str) -> Result<String, EngineError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation("prompt must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

/// Artifact object path, deterministic per (owner, job). Repeated uploads
/// overwrite the same object.
pub fn artifact_path(owner: OwnerId, job_id: JobId) -> String {
    format!("{owner}/{job_id}.mp4")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeArtifactStore, FakeProvider};
    use clipforge_jobs::{InMemoryJobStore, InMemoryTemplateStore, JobStatus, Template};
    use clipforge_ledger::{InMemoryLedgerStore, LedgerStore, PaymentReceipt};

    struct Harness {
        controller: JobLifecycleController,
        provider: Arc<FakeProvider>,
        artifacts: Arc<FakeArtifactStore>,
        ledger: Arc<InMemoryLedgerStore>,
        templates: Arc<InMemoryTemplateStore>,
    }

    fn harness() -> Harness {
        let jobs = InMemoryJobStore::arc();
        let templates = InMemoryTemplateStore::arc();
        let provider = Arc::new(FakeProvider::new());
        let artifacts = Arc::new(FakeArtifactStore::new());
        let ledger = InMemoryLedgerStore::arc();
        let controller = JobLifecycleController::new(
            jobs,
            templates.clone(),
            provider.clone(),
            artifacts.clone(),
            SettlementEngine::new(ledger.clone()),
        );
        Harness {
            controller,
            provider,
            artifacts,
            ledger,
            templates,
        }
    }

    async fn seed_credits(h: &Harness, owner: OwnerId, credits: i64) {
        h.controller
            .settlement()
            .credit_from_payment(owner, credits, format!("evt_seed_{owner}"), PaymentReceipt::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn submit_debits_once_and_starts_processing() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 1).await;

        let job = h.controller.submit(owner, "a cat surfing", None).await.unwrap();

        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.provider_ref.is_some());
        assert_eq!(h.provider.create_calls(), 1);
        assert_eq!(h.ledger.balance(owner).await.unwrap(), 0);
        assert_eq!(h.ledger.debit_count_for_job(job.id), 1);
    }

    /// Wraps the in-memory store to observe call order: the admission debit
    /// must already be in the ledger when the job row is inserted. The
    /// Postgres schema depends on this ordering (ledger_entries.job_ref
    /// carries no foreign key because the debit is written first).
    struct InsertOrderJobs {
        inner: Arc<InMemoryJobStore>,
        ledger: Arc<InMemoryLedgerStore>,
        debit_was_first: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl JobStore for InsertOrderJobs {
        async fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
            self.debit_was_first.store(
                self.ledger.debit_count_for_job(job.id) == 1,
                std::sync::atomic::Ordering::SeqCst,
            );
            self.inner.insert(job).await
        }

        async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
            self.inner.get(job_id).await
        }

        async fn list_for_owner(
            &self,
            owner: OwnerId,
            limit: usize,
        ) -> Result<Vec<Job>, JobStoreError> {
            self.inner.list_for_owner(owner, limit).await
        }

        async fn list_active(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
            self.inner.list_active(limit).await
        }

        async fn mark_processing(
            &self,
            job_id: JobId,
            provider_ref: &clipforge_jobs::ProviderRef,
            progress: u8,
        ) -> Result<bool, JobStoreError> {
            self.inner.mark_processing(job_id, provider_ref, progress).await
        }

        async fn update_progress(&self, job_id: JobId, progress: u8) -> Result<(), JobStoreError> {
            self.inner.update_progress(job_id, progress).await
        }

        async fn finalize_if_unset(
            &self,
            job_id: JobId,
            result_ref: &str,
        ) -> Result<bool, JobStoreError> {
            self.inner.finalize_if_unset(job_id, result_ref).await
        }

        async fn fail_if_active(&self, job_id: JobId, error: &str) -> Result<bool, JobStoreError> {
            self.inner.fail_if_active(job_id, error).await
        }
    }

    #[tokio::test]
    async fn admission_debit_lands_before_the_job_row() {
        let ledger = InMemoryLedgerStore::arc();
        let jobs = Arc::new(InsertOrderJobs {
            inner: InMemoryJobStore::arc(),
            ledger: ledger.clone(),
            debit_was_first: std::sync::atomic::AtomicBool::new(false),
        });
        let controller = JobLifecycleController::new(
            jobs.clone(),
            InMemoryTemplateStore::arc(),
            Arc::new(FakeProvider::new()),
            Arc::new(FakeArtifactStore::new()),
            SettlementEngine::new(ledger.clone()),
        );
        let owner = OwnerId::new();
        controller
            .settlement()
            .credit_from_payment(owner, 1, "evt_seed".into(), PaymentReceipt::default())
            .await
            .unwrap();

        controller.submit(owner, "a cat surfing", None).await.unwrap();

        assert!(jobs.debit_was_first.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn submit_below_balance_creates_nothing() {
        let h = harness();
        let owner = OwnerId::new();

        let err = h.controller.submit(owner, "a cat surfing", None).await.unwrap_err();

        assert!(matches!(err, EngineError::InsufficientCredits));
        assert_eq!(h.provider.create_calls(), 0);
        assert!(h.controller.list_for_owner(owner, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_applies_template_to_provider_prompt() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 1).await;
        h.templates.put(Template {
            id: "cinematic".into(),
            prompt_prefix: Some("Cinematic shot of".into()),
            prompt_suffix: None,
        });

        let job = h
            .controller
            .submit(owner, "a lighthouse", Some("cinematic"))
            .await
            .unwrap();

        assert_eq!(job.prompt, "a lighthouse");
        assert_eq!(job.prompt_final, "Cinematic shot of a lighthouse");
        assert_eq!(
            h.provider.last_prompt().as_deref(),
            Some("Cinematic shot of a lighthouse")
        );
    }

    #[tokio::test]
    async fn provider_create_failure_persists_failed_job_and_refunds() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 1).await;
        h.provider.fail_next_create("quota exhausted");

        let err = h.controller.submit(owner, "a cat surfing", None).await.unwrap_err();
        assert!(matches!(err, EngineError::ProviderCreateFailed(_)));

        let jobs = h.controller.list_for_owner(owner, 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert!(jobs[0].provider_ref.is_none());
        assert!(jobs[0].error.as_deref().unwrap().contains("quota exhausted"));
        // Failed job nets to zero.
        assert_eq!(h.ledger.balance(owner).await.unwrap(), 1);
        assert_eq!(h.ledger.recompute_balance(owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reconcile_completed_finalizes_and_uploads_artifact() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 1).await;

        let job = h.controller.submit(owner, "a cat surfing", None).await.unwrap();
        let view = h.controller.reconcile(job.id).await.unwrap();

        assert_eq!(view.status, JobStatus::Done);
        assert_eq!(view.progress, 100);
        let result_ref = view.result_ref.unwrap();
        assert!(result_ref.ends_with(&format!("{owner}/{}.mp4", job.id)));

        let uploads = h.artifacts.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].content_type, "video/mp4");
        assert_eq!(uploads[0].path, artifact_path(owner, job.id));

        assert_eq!(h.ledger.debit_count_for_job(job.id), 1);
        assert_eq!(h.ledger.balance(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reconcile_after_done_skips_the_provider() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 1).await;

        let job = h.controller.submit(owner, "a cat surfing", None).await.unwrap();
        h.controller.reconcile(job.id).await.unwrap();
        let retrieves = h.provider.retrieve_calls();

        let view = h.controller.reconcile(job.id).await.unwrap();

        assert_eq!(view.status, JobStatus::Done);
        assert_eq!(h.provider.retrieve_calls(), retrieves);
    }

    #[tokio::test]
    async fn concurrent_reconciles_converge_on_one_result() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 1).await;
        let job = h.controller.submit(owner, "a cat surfing", None).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let controller = h.controller.clone();
            let job_id = job.id;
            handles.push(tokio::spawn(async move {
                controller.reconcile(job_id).await.unwrap()
            }));
        }

        let mut refs = Vec::new();
        for handle in handles {
            let view = handle.await.unwrap();
            assert_eq!(view.status, JobStatus::Done);
            refs.push(view.result_ref.unwrap());
        }
        refs.dedup();
        assert_eq!(refs.len(), 1);
        assert_eq!(h.ledger.debit_count_for_job(job.id), 1);
        assert_eq!(h.ledger.balance(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn provider_failure_persists_detail_and_refunds_once() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 1).await;
        let job = h.controller.submit(owner, "a cat surfing", None).await.unwrap();
        h.provider.set_default_status(crate::ports::ProviderJobStatus::failed(
            "content_policy_violation",
        ));

        let view = h.controller.reconcile(job.id).await.unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error.as_deref(), Some("content_policy_violation"));

        // A second reconcile is a read-only no-op.
        let view = h.controller.reconcile(job.id).await.unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(h.ledger.balance(owner).await.unwrap(), 1);
        assert_eq!(
            h.ledger.count_where(|e| e.job_ref == Some(job.id) && e.delta > 0),
            1
        );
    }

    #[tokio::test]
    async fn transient_retrieve_failure_leaves_state_and_warns() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 1).await;
        let job = h.controller.submit(owner, "a cat surfing", None).await.unwrap();
        h.provider.fail_next_retrieve("connection reset");

        let view = h.controller.reconcile(job.id).await.unwrap();

        assert_eq!(view.status, JobStatus::Processing);
        assert!(view.warning.as_deref().unwrap().contains("connection reset"));
        assert_eq!(h.ledger.balance(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn artifact_download_failure_is_terminal_and_refunded() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 1).await;
        let job = h.controller.submit(owner, "a cat surfing", None).await.unwrap();
        h.provider.fail_next_download("content expired");

        let err = h.controller.reconcile(job.id).await.unwrap_err();
        assert!(matches!(err, EngineError::ArtifactFetchFailed(_)));

        let stored = h.controller.get_for_owner(owner, job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(h.ledger.balance(owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn artifact_upload_failure_is_terminal_and_refunded() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 1).await;
        let job = h.controller.submit(owner, "a cat surfing", None).await.unwrap();
        h.artifacts.fail_next_upload("bucket unavailable");

        let err = h.controller.reconcile(job.id).await.unwrap_err();
        assert!(matches!(err, EngineError::ArtifactUploadFailed(_)));

        let stored = h.controller.get_for_owner(owner, job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.result_ref.is_none());
        assert!(stored.error.as_deref().unwrap().contains("bucket unavailable"));
        // Failed job nets to zero.
        assert_eq!(h.ledger.balance(owner).await.unwrap(), 1);
        assert_eq!(h.ledger.recompute_balance(owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn remix_requires_owned_completed_parent() {
        let h = harness();
        let owner = OwnerId::new();
        let other = OwnerId::new();
        seed_credits(&h, owner, 3).await;
        seed_credits(&h, other, 1).await;

        let parent = h.controller.submit(owner, "a cat surfing", None).await.unwrap();

        // Parent still processing: rejected before any provider call.
        let creates = h.provider.create_calls();
        let err = h
            .controller
            .remix_submit(owner, parent.id, "make it sunset")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(h.provider.create_calls(), creates);

        h.controller.reconcile(parent.id).await.unwrap();

        // Another owner cannot remix it.
        let err = h
            .controller
            .remix_submit(other, parent.id, "make it sunset")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden));

        // The owner can.
        let remix = h
            .controller
            .remix_submit(owner, parent.id, "make it sunset")
            .await
            .unwrap();
        assert_eq!(remix.kind, JobKind::Remix);
        assert_eq!(remix.parent_ref, Some(parent.id));
        assert_eq!(remix.status, JobStatus::Processing);

        h.controller.reconcile(remix.id).await.unwrap();
        let entries = h.ledger.count_where(|e| {
            e.job_ref == Some(remix.id) && e.delta < 0 && e.reason == LedgerReason::VideoRemix
        });
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn remix_of_failed_parent_is_rejected() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 2).await;

        let parent = h.controller.submit(owner, "a cat surfing", None).await.unwrap();
        h.provider.set_default_status(crate::ports::ProviderJobStatus::failed(
            "content_policy_violation",
        ));
        h.controller.reconcile(parent.id).await.unwrap();

        let stored = h.controller.get_for_owner(owner, parent.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);

        // Terminal but not done: remix is rejected before any provider call.
        let creates = h.provider.create_calls();
        let err = h
            .controller
            .remix_submit(owner, parent.id, "make it sunset")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(h.provider.create_calls(), creates);
        assert_eq!(h.ledger.balance(owner).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn remix_of_missing_parent_is_not_found() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 1).await;

        let err = h
            .controller
            .remix_submit(owner, JobId::new(), "make it sunset")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound));
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_before_any_side_effect() {
        let h = harness();
        let owner = OwnerId::new();
        seed_credits(&h, owner, 1).await;

        let err = h.controller.submit(owner, "   ", None).await.unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(h.ledger.balance(owner).await.unwrap(), 1);
        assert_eq!(h.provider.create_calls(), 0);
    }
}
