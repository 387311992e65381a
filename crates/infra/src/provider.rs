//! HTTP client for the external video-generation API.

use serde::Deserialize;

use async_trait::async_trait;
use clipforge_engine::{ProviderClient, ProviderError, ProviderJob, ProviderJobStatus, ProviderStatus};
use clipforge_jobs::ProviderRef;

/// Generation parameters sent with every create/remix request.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub seconds: String,
    pub size: String,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: "sora-2-pro".to_string(),
            seconds: "12".to_string(),
            size: "720x1280".to_string(),
        }
    }
}

/// Wire shape of the provider's video job resource.
#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
    status: String,
    #[serde(default)]
    progress: Option<u8>,
    #[serde(default)]
    error: Option<VideoError>,
}

#[derive(Debug, Deserialize)]
struct VideoError {
    #[serde(default)]
    message: Option<String>,
}

pub struct HttpProviderClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl HttpProviderClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn send_create(
        &self,
        path: String,
        body: serde_json::Value,
    ) -> Result<ProviderJob, ProviderError> {
        let response = self
            .http
            .post(path)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!("{status}: {detail}")));
        }

        let resource: VideoResource = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(ProviderJob {
            provider_ref: ProviderRef::new(resource.id),
            progress: resource.progress.unwrap_or(0).min(100),
        })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn create(&self, prompt: &str) -> Result<ProviderJob, ProviderError> {
        self.send_create(
            self.url("/videos"),
            serde_json::json!({
                "model": self.config.model,
                "prompt": prompt,
                "seconds": self.config.seconds,
                "size": self.config.size,
            }),
        )
        .await
    }

    async fn retrieve(
        &self,
        provider_ref: &ProviderRef,
    ) -> Result<ProviderJobStatus, ProviderError> {
        let response = self
            .http
            .get(self.url(&format!("/videos/{provider_ref}")))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!("{status}: {detail}")));
        }

        let resource: VideoResource = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = match resource.status.as_str() {
            "completed" => ProviderStatus::Completed,
            "failed" => ProviderStatus::Failed,
            "queued" => ProviderStatus::Queued,
            // Unknown states count as still in flight.
            _ => ProviderStatus::Processing,
        };
        Ok(ProviderJobStatus {
            status,
            progress: resource.progress.unwrap_or(0).min(100),
            error: resource.error.and_then(|e| e.message),
        })
    }

    async fn download_content(
        &self,
        provider_ref: &ProviderRef,
    ) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .http
            .get(self.url(&format!("/videos/{provider_ref}/content")))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Transport(format!(
                "content download returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn remix(
        &self,
        source: &ProviderRef,
        prompt: &str,
    ) -> Result<ProviderJob, ProviderError> {
        self.send_create(
            self.url(&format!("/videos/{source}/remix")),
            serde_json::json!({ "prompt": prompt }),
        )
        .await
    }
}
