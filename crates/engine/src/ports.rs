//! Collaborator contracts: the video provider, artifact storage, and the
//! payment gateway. The engine only sees these traits; HTTP implementations
//! live in the infra crate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use clipforge_jobs::ProviderRef;

/// Status the external provider reports for one of its jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// A job the provider has accepted.
#[derive(Debug, Clone)]
pub struct ProviderJob {
    pub provider_ref: ProviderRef,
    pub progress: u8,
}

/// One retrieve-status response.
#[derive(Debug, Clone)]
pub struct ProviderJobStatus {
    pub status: ProviderStatus,
    pub progress: u8,
    /// Provider-supplied failure detail, present when `status` is `Failed`.
    pub error: Option<String>,
}

impl ProviderJobStatus {
    pub fn completed() -> Self {
        Self {
            status: ProviderStatus::Completed,
            progress: 100,
            error: None,
        }
    }

    pub fn processing(progress: u8) -> Self {
        Self {
            status: ProviderStatus::Processing,
            progress,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Failed,
            progress: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The provider rejected the request outright.
    #[error("provider rejected request: {0}")]
    Rejected(String),
    /// Transport-level failure. Absorbed by reconciliation as transient.
    #[error("provider transport error: {0}")]
    Transport(String),
}

/// External async video-generation API.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn create(&self, prompt: &str) -> Result<ProviderJob, ProviderError>;

    async fn retrieve(&self, provider_ref: &ProviderRef)
        -> Result<ProviderJobStatus, ProviderError>;

    async fn download_content(&self, provider_ref: &ProviderRef)
        -> Result<Vec<u8>, ProviderError>;

    async fn remix(
        &self,
        source: &ProviderRef,
        prompt: &str,
    ) -> Result<ProviderJob, ProviderError>;
}

#[async_trait]
impl<T: ProviderClient + ?Sized> ProviderClient for Arc<T> {
    async fn create(&self, prompt: &str) -> Result<ProviderJob, ProviderError> {
        (**self).create(prompt).await
    }

    async fn retrieve(
        &self,
        provider_ref: &ProviderRef,
    ) -> Result<ProviderJobStatus, ProviderError> {
        (**self).retrieve(provider_ref).await
    }

    async fn download_content(
        &self,
        provider_ref: &ProviderRef,
    ) -> Result<Vec<u8>, ProviderError> {
        (**self).download_content(provider_ref).await
    }

    async fn remix(
        &self,
        source: &ProviderRef,
        prompt: &str,
    ) -> Result<ProviderJob, ProviderError> {
        (**self).remix(source, prompt).await
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("artifact store error: {0}")]
pub struct ArtifactError(pub String);

/// Durable object storage. Upload overwrites by path, so repeating it for
/// the same job is harmless.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` at `path` and return a stable public reference.
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ArtifactError>;
}

#[async_trait]
impl<T: ArtifactStore + ?Sized> ArtifactStore for Arc<T> {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ArtifactError> {
        (**self).upload(path, bytes, content_type).await
    }
}

/// A signature-verified inbound payment event.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    /// Gateway event id. The credit idempotency key.
    pub event_ref: String,
    pub event_type: String,
    pub payment_status: Option<String>,
    /// Caller-supplied metadata echoed back by the gateway.
    pub metadata: HashMap<String, String>,
    pub payment_ref: Option<String>,
    pub session_ref: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
}

/// Receipt details looked up after the event is accepted. All best-effort.
#[derive(Debug, Clone, Default)]
pub struct ChargeDetails {
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub receipt_url: Option<String>,
    pub charge_ref: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("malformed webhook payload: {0}")]
    Malformed(String),
    #[error("gateway transport error: {0}")]
    Transport(String),
}

/// External payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Verify the raw body against the signature header and parse the event.
    fn verify_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<PaymentEvent, GatewayError>;

    /// Look up receipt details for a confirmed payment.
    async fn fetch_charge_details(
        &self,
        payment_ref: &str,
    ) -> Result<ChargeDetails, GatewayError>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    fn verify_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<PaymentEvent, GatewayError> {
        (**self).verify_signature(payload, signature)
    }

    async fn fetch_charge_details(
        &self,
        payment_ref: &str,
    ) -> Result<ChargeDetails, GatewayError> {
        (**self).fetch_charge_details(payment_ref).await
    }
}
