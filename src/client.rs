//! reqwest implementation of [`GenerationBackend`].
//!
//! Endpoints, relative to `backend.base_url`:
//!
//! | Endpoint | Used by |
//! |----------|---------|
//! | `POST /generate/cost` | [`estimate_cost`](GenerationBackend::estimate_cost) |
//! | `POST /generate/stream` | [`open_stream`](GenerationBackend::open_stream) |
//! | `POST /generate/non-stream` | [`generate_once`](GenerationBackend::generate_once) |
//!
//! The client itself only carries a connect timeout. Cost requests get the
//! full `timeout_secs`; stream bodies are bounded by the session's idle
//! timeout instead, since a healthy generation can run for minutes.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;

use diagram_stream_core::error::{GenerationError, COST_FAILED_MESSAGE};
use diagram_stream_core::models::{CostResponse, GenerationRequest, WireMessage};

use crate::backend::{ByteStream, GenerationBackend};
use crate::config::BackendConfig;

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: std::time::Duration,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/generate/{}", self.base_url, endpoint)
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn estimate_cost(
        &self,
        req: &GenerationRequest,
    ) -> Result<Option<String>, GenerationError> {
        let response = self
            .client
            .post(self.url("cost"))
            .timeout(self.timeout)
            .json(req)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "cost request failed");
                GenerationError::Cost(COST_FAILED_MESSAGE.to_string())
            })?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited);
        }

        let status = response.status();
        let body: CostResponse = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, %status, "unreadable cost response");
            GenerationError::Cost(COST_FAILED_MESSAGE.to_string())
        })?;

        if let Some(error) = body.error.filter(|e| !e.is_empty()) {
            return Err(GenerationError::Cost(error));
        }
        Ok(body.cost)
    }

    async fn open_stream(&self, req: &GenerationRequest) -> Result<ByteStream, GenerationError> {
        let response = self
            .client
            .post(self.url("stream"))
            .header("Accept", "text/event-stream")
            .json(req)
            .send()
            .await
            .map_err(|e| GenerationError::start_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::start_failed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| GenerationError::transport("Stream interrupted", e.to_string()))
        });
        Ok(body.boxed())
    }

    async fn generate_once(&self, req: &GenerationRequest) -> Result<WireMessage, GenerationError> {
        let response = self
            .client
            .post(self.url("non-stream"))
            .json(req)
            .send()
            .await
            .map_err(|e| GenerationError::transport("Failed to generate diagram", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::transport(
                "Failed to generate diagram",
                format!("HTTP {}: {}", status, body),
            ));
        }

        response
            .json::<WireMessage>()
            .await
            .map_err(|e| GenerationError::transport("Failed to generate diagram", e.to_string()))
    }
}
