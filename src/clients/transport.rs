use async_trait::async_trait;

use crate::models::call::{BatchRequestEntry, BatchResponseEntry};

/// Carries one batch to an endpoint and brings back the per-call answers.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        url: &str,
        batch: &[BatchRequestEntry],
    ) -> Result<Vec<BatchResponseEntry>, String>;
}

pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        format!("{}/{}", self.base_url, url.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        url: &str,
        batch: &[BatchRequestEntry],
    ) -> Result<Vec<BatchResponseEntry>, String> {
        let endpoint = self.endpoint(url);
        let response = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(batch)
            .send()
            .await
            .map_err(|e| format!("Request to {} failed: {}", endpoint, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response from {}: {}", endpoint, e))?;

        if !status.is_success() {
            tracing::debug!(%endpoint, %status, body = %text, "batch rejected");
            return Err(format!("Request to {} failed with status {}", endpoint, status));
        }

        serde_json::from_str(&text)
            .map_err(|e| format!("Failed to parse batch response from {}: {}", endpoint, e))
    }
}
