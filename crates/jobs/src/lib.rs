//! `clipforge-jobs` — the video job row model and its storage contract.
//!
//! A job moves through a bounded state machine (`Queued → Processing →
//! Done | Failed`, both terminal). The store trait exposes the conditional
//! updates that make concurrent reconciliation safe without locks.

pub mod store;
pub mod template;
pub mod types;

pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use template::{InMemoryTemplateStore, Template, TemplateStore};
pub use types::{Job, JobKind, JobStatus, JobView, ProviderRef};
