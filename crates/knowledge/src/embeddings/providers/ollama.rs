//! Ollama embedding provider.
//!
//! Calls the batch endpoint `POST /api/embed`, which accepts a list of inputs
//! and returns one vector per input. Retrying is left to the gateway: HTTP
//! 429 is reported as [`AppError::RateLimited`], every other failure as
//! [`AppError::Llm`].

use crate::embeddings::config::EmbeddingConfig;
use crate::embeddings::provider::EmbeddingProvider;
use async_trait::async_trait;
use docchat_core::{AppError, AppResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBED_ENDPOINT: &str = "/api/embed";
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to create HTTP client for Ollama: {}", e)))?;

        let base_url = config
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_OLLAMA_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Map a non-success response to the error taxonomy.
fn status_error(status: StatusCode, body: &str) -> AppError {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string());

    if status == StatusCode::TOO_MANY_REQUESTS {
        AppError::RateLimited(format!("Ollama API error ({}): {}", status, detail))
    } else {
        AppError::Llm(format!("Ollama API error ({}): {}", status, detail))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "ollama", model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}{}", self.base_url, EMBED_ENDPOINT);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        debug!("Sending embedding request to {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        debug!("Received {} embeddings", body.embeddings.len());
        Ok(body.embeddings)
    }
}
