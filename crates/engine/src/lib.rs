//! `clipforge-engine` — job lifecycle orchestration and payment ingestion.
//!
//! The controller drives a job from submission through provider
//! reconciliation to its terminal state, settling credits through the ledger.
//! Every path is safe to invoke concurrently and repeatedly: single-winner
//! semantics come from the stores' conditional writes, never from locks.

pub mod controller;
pub mod fakes;
pub mod ports;
pub mod sweeper;
pub mod webhook;

pub use controller::{EngineError, JobLifecycleController, DEFAULT_JOB_COST};
pub use ports::{
    ArtifactError, ArtifactStore, ChargeDetails, GatewayError, PaymentEvent, PaymentGateway,
    ProviderClient, ProviderError, ProviderJob, ProviderJobStatus, ProviderStatus,
};
pub use sweeper::{ReconcileSweeper, SweepReport, DEFAULT_SWEEP_BATCH};
pub use webhook::{WebhookError, WebhookIngester, WebhookOutcome};
