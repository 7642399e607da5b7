//! Ollama LLM provider.
//!
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use docchat_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ollama `/api/generate` request body.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Default, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama `/api/generate` response body (non-streaming).
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Ollama LLM client.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Client against `base_url` with reqwest's default settings.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Client with a whole-request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn to_ollama_request(&self, request: &LlmRequest) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    fn convert_response(&self, response: OllamaResponse) -> LlmResponse {
        LlmResponse {
            content: response.response,
            model: response.model,
            usage: LlmUsage::new(
                response.prompt_eval_count.unwrap_or(0),
                response.eval_count.unwrap_or(0),
            ),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::info!(model = %request.model, prompt_len = request.prompt.len(), "Sending completion request to Ollama");

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.to_ollama_request(request))
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!(
            eval_count = ollama_response.eval_count.unwrap_or(0),
            "Received completion from Ollama"
        );

        Ok(self.convert_response(ollama_response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let client = OllamaClient::with_base_url("http://localhost:11434/");
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_ollama_request_conversion() {
        let client = OllamaClient::with_base_url("http://localhost:11434");
        let request = LlmRequest::new("Hello", "llama3.2")
            .with_temperature(0.7)
            .with_max_tokens(2000);

        let body = serde_json::to_value(client.to_ollama_request(&request)).unwrap();
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["prompt"], "Hello");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 2000);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_response_conversion() {
        let client = OllamaClient::with_base_url("http://localhost:11434");
        let raw: OllamaResponse = serde_json::from_str(
            r#"{"model":"llama3.2","response":"FBO means...","done":true,"prompt_eval_count":10,"eval_count":5}"#,
        )
        .unwrap();

        let response = client.convert_response(raw);
        assert_eq!(response.content, "FBO means...");
        assert_eq!(response.usage.total_tokens, 15);
    }
}
