//! In-memory collaborator doubles for tests and local development.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use clipforge_jobs::ProviderRef;

use crate::ports::{
    ArtifactError, ArtifactStore, ChargeDetails, GatewayError, PaymentEvent, PaymentGateway,
    ProviderClient, ProviderError, ProviderJob, ProviderJobStatus,
};

/// Scriptable video provider. Defaults to accepting every create and
/// reporting every job as completed on the first retrieve.
pub struct FakeProvider {
    inner: Mutex<ProviderInner>,
}

struct ProviderInner {
    next_id: u64,
    prompts: Vec<String>,
    create_calls: usize,
    retrieve_calls: usize,
    fail_next_create: Option<String>,
    fail_next_retrieve: Option<String>,
    fail_next_download: Option<String>,
    scripted: HashMap<String, VecDeque<ProviderJobStatus>>,
    default_status: ProviderJobStatus,
    content: Vec<u8>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ProviderInner {
                next_id: 0,
                prompts: Vec::new(),
                create_calls: 0,
                retrieve_calls: 0,
                fail_next_create: None,
                fail_next_retrieve: None,
                fail_next_download: None,
                scripted: HashMap::new(),
                default_status: ProviderJobStatus::completed(),
                content: b"fake mp4 bytes".to_vec(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProviderInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_next_create(&self, message: impl Into<String>) {
        self.lock().fail_next_create = Some(message.into());
    }

    pub fn fail_next_retrieve(&self, message: impl Into<String>) {
        self.lock().fail_next_retrieve = Some(message.into());
    }

    pub fn fail_next_download(&self, message: impl Into<String>) {
        self.lock().fail_next_download = Some(message.into());
    }

    /// Status returned when no per-job script is queued.
    pub fn set_default_status(&self, status: ProviderJobStatus) {
        self.lock().default_status = status;
    }

    /// Queue a status for one specific provider job; each retrieve pops one.
    pub fn script_status(&self, provider_ref: &ProviderRef, status: ProviderJobStatus) {
        self.lock()
            .scripted
            .entry(provider_ref.as_str().to_string())
            .or_default()
            .push_back(status);
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    pub fn retrieve_calls(&self) -> usize {
        self.lock().retrieve_calls
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.lock().prompts.last().cloned()
    }

    fn accept(&self, prompt: &str) -> Result<ProviderJob, ProviderError> {
        let mut inner = self.lock();
        inner.create_calls += 1;
        if let Some(message) = inner.fail_next_create.take() {
            return Err(ProviderError::Rejected(message));
        }
        inner.next_id += 1;
        inner.prompts.push(prompt.to_string());
        Ok(ProviderJob {
            provider_ref: ProviderRef::new(format!("vid_{}", inner.next_id)),
            progress: 0,
        })
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn create(&self, prompt: &str) -> Result<ProviderJob, ProviderError> {
        self.accept(prompt)
    }

    async fn retrieve(
        &self,
        provider_ref: &ProviderRef,
    ) -> Result<ProviderJobStatus, ProviderError> {
        let mut inner = self.lock();
        inner.retrieve_calls += 1;
        if let Some(message) = inner.fail_next_retrieve.take() {
            return Err(ProviderError::Transport(message));
        }
        if let Some(queue) = inner.scripted.get_mut(provider_ref.as_str()) {
            if let Some(status) = queue.pop_front() {
                return Ok(status);
            }
        }
        Ok(inner.default_status.clone())
    }

    async fn download_content(
        &self,
        _provider_ref: &ProviderRef,
    ) -> Result<Vec<u8>, ProviderError> {
        let mut inner = self.lock();
        if let Some(message) = inner.fail_next_download.take() {
            return Err(ProviderError::Transport(message));
        }
        Ok(inner.content.clone())
    }

    async fn remix(
        &self,
        _source: &ProviderRef,
        prompt: &str,
    ) -> Result<ProviderJob, ProviderError> {
        self.accept(prompt)
    }
}

/// One recorded artifact upload.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub path: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Artifact store double that records uploads and serves deterministic refs.
#[derive(Default)]
pub struct FakeArtifactStore {
    uploads: Mutex<Vec<RecordedUpload>>,
    fail_next: Mutex<Option<String>>,
}

impl FakeArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_upload(&self, message: impl Into<String>) {
        *self.fail_next.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.into());
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ArtifactStore for FakeArtifactStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ArtifactError> {
        if let Some(message) = self.fail_next.lock().unwrap_or_else(|e| e.into_inner()).take() {
            return Err(ArtifactError(message));
        }
        // Overwrite-by-path: keep only the latest object for a path.
        let mut uploads = self.uploads.lock().unwrap_or_else(|e| e.into_inner());
        uploads.retain(|u| u.path != path);
        uploads.push(RecordedUpload {
            path: path.to_string(),
            bytes,
            content_type: content_type.to_string(),
        });
        Ok(format!("https://cdn.test/{path}"))
    }
}

/// Gateway double: one fixed accepted signature, a configurable event, and
/// optional charge details.
pub struct FakePaymentGateway {
    accepted_signature: String,
    event: Mutex<Option<PaymentEvent>>,
    charge_details: Mutex<Result<ChargeDetails, GatewayError>>,
}

impl FakePaymentGateway {
    pub fn new(accepted_signature: impl Into<String>) -> Self {
        Self {
            accepted_signature: accepted_signature.into(),
            event: Mutex::new(None),
            charge_details: Mutex::new(Ok(ChargeDetails::default())),
        }
    }

    /// Event returned by the next successful verification.
    pub fn set_event(&self, event: PaymentEvent) {
        *self.event.lock().unwrap_or_else(|e| e.into_inner()) = Some(event);
    }

    pub fn set_charge_details(&self, details: Result<ChargeDetails, GatewayError>) {
        *self.charge_details.lock().unwrap_or_else(|e| e.into_inner()) = details;
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    fn verify_signature(
        &self,
        _payload: &[u8],
        signature: &str,
    ) -> Result<PaymentEvent, GatewayError> {
        if signature != self.accepted_signature {
            return Err(GatewayError::InvalidSignature);
        }
        self.event
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| GatewayError::Malformed("no event configured".into()))
    }

    async fn fetch_charge_details(
        &self,
        _payment_ref: &str,
    ) -> Result<ChargeDetails, GatewayError> {
        self.charge_details
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Convenience builder for well-formed completed-checkout events.
pub fn paid_checkout_event(
    event_ref: &str,
    owner: clipforge_core::OwnerId,
    credits: i64,
) -> PaymentEvent {
    let mut metadata = HashMap::new();
    metadata.insert("owner_id".to_string(), owner.to_string());
    metadata.insert("credits".to_string(), credits.to_string());
    PaymentEvent {
        event_ref: event_ref.to_string(),
        event_type: "checkout.session.completed".to_string(),
        payment_status: Some("paid".to_string()),
        metadata,
        payment_ref: Some("pi_test".to_string()),
        session_ref: Some("cs_test".to_string()),
        amount_total: Some(credits * 100),
        currency: Some("usd".to_string()),
    }
}
