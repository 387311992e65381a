//! Core job types and the status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clipforge_core::{JobId, OwnerId};

/// Opaque identifier the external video provider assigned to a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderRef(String);

impl ProviderRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job execution status.
///
/// `Queued` is transient: it is held only for the duration of the provider
/// create call. `Done` and `Failed` are terminal; no store operation mutates
/// a terminal row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Processing) => true,
            (JobStatus::Queued, JobStatus::Failed) => true,
            (JobStatus::Processing, JobStatus::Done) => true,
            (JobStatus::Processing, JobStatus::Failed) => true,
            // Self-transitions are no-ops the conditional writes tolerate.
            (a, b) if *a == b && !a.is_terminal() => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job kind: a fresh generation or a remix of a prior completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Generate,
    Remix,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Generate => "generate",
            JobKind::Remix => "remix",
        }
    }
}

/// One video-generation job row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: OwnerId,
    pub status: JobStatus,
    pub kind: JobKind,
    /// The prompt as the owner typed it.
    pub prompt: String,
    /// The prompt actually sent to the provider (template-wrapped).
    pub prompt_final: String,
    /// Set once the provider accepts the request; never reassigned.
    pub provider_ref: Option<ProviderRef>,
    /// Public artifact reference. Set at most once, by the finalize winner.
    pub result_ref: Option<String>,
    /// Informational progress, 0–100.
    pub progress: u8,
    /// Cost in credits, fixed at creation.
    pub cost: i64,
    /// Source job for remixes.
    pub parent_ref: Option<JobId>,
    /// Terminal failure detail.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new_generate(owner: OwnerId, prompt: String, prompt_final: String, cost: i64) -> Self {
        Self::new(owner, JobKind::Generate, prompt, prompt_final, cost, None)
    }

    pub fn new_remix(
        owner: OwnerId,
        prompt: String,
        parent_ref: JobId,
        cost: i64,
    ) -> Self {
        Self::new(
            owner,
            JobKind::Remix,
            prompt.clone(),
            prompt,
            cost,
            Some(parent_ref),
        )
    }

    fn new(
        owner: OwnerId,
        kind: JobKind,
        prompt: String,
        prompt_final: String,
        cost: i64,
        parent_ref: Option<JobId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner,
            status: JobStatus::Queued,
            kind,
            prompt,
            prompt_final,
            provider_ref: None,
            result_ref: None,
            progress: 0,
            cost,
            parent_ref,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Caller-facing projection of the row.
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            status: self.status,
            result_ref: self.result_ref.clone(),
            progress: self.progress,
            error: self.error.clone(),
            warning: None,
        }
    }
}

/// What reconcile/refresh callers see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    pub result_ref: Option<String>,
    pub progress: u8,
    pub error: Option<String>,
    /// Non-fatal note, e.g. a transient provider retrieve failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl JobView {
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn terminal_states_admit_no_transition() {
        for terminal in [JobStatus::Done, JobStatus::Failed] {
            for next in [
                JobStatus::Queued,
                JobStatus::Processing,
                JobStatus::Done,
                JobStatus::Failed,
            ] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} must be rejected"
                );
            }
        }
    }

    #[test]
    fn queued_moves_to_processing_or_failed() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Done));
    }

    #[test]
    fn new_job_starts_queued_without_provider_ref() {
        let job = Job::new_generate(OwnerId::new(), "a cat".into(), "a cat".into(), 1);
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.provider_ref.is_none());
        assert!(job.result_ref.is_none());
        assert_eq!(job.progress, 0);
    }

    proptest! {
        /// Any walk the state machine permits never leaves a terminal state.
        #[test]
        fn permitted_walks_are_monotonic(steps in prop::collection::vec(0usize..4, 1..20)) {
            let all = [
                JobStatus::Queued,
                JobStatus::Processing,
                JobStatus::Done,
                JobStatus::Failed,
            ];
            let mut current = JobStatus::Queued;
            let mut reached_terminal = false;

            for s in steps {
                let next = all[s];
                if current.can_transition_to(next) {
                    prop_assert!(!reached_terminal, "transition out of terminal state");
                    current = next;
                    reached_terminal = current.is_terminal();
                }
            }
        }
    }
}
