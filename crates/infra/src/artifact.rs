//! HTTP object-storage client for finished video artifacts.
//!
//! Uploads are keyed by path and overwrite in place, so repeating an upload
//! for the same job is harmless.

use async_trait::async_trait;

use clipforge_engine::{ArtifactError, ArtifactStore};

pub struct HttpArtifactStore {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

impl HttpArtifactStore {
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        service_key: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            bucket: bucket.into(),
            service_key: service_key.into(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/object/{}/{path}",
            self.base_url.trim_end_matches('/'),
            self.bucket
        )
    }

    /// Stable public reference for an object path.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/object/public/{}/{path}",
            self.base_url.trim_end_matches('/'),
            self.bucket
        )
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ArtifactError> {
        let response = self
            .http
            .post(self.object_url(path))
            .bearer_auth(&self.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ArtifactError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ArtifactError(format!("upload returned {status}: {detail}")));
        }

        Ok(self.public_url(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_is_deterministic_per_path() {
        let store = HttpArtifactStore::new("https://storage.test/v1/", "videos", "key");
        assert_eq!(
            store.public_url("owner/job.mp4"),
            "https://storage.test/v1/object/public/videos/owner/job.mp4"
        );
    }
}
