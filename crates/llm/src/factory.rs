//! LLM provider factory.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use crate::types::ProviderType;
use docchat_core::config::LlmSettings;
use docchat_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Create an LLM client from the `llm` config section.
///
/// # Errors
/// `AppError::Config` for unknown providers, `AppError::Llm` when the HTTP
/// client cannot be built.
pub fn create_client(settings: &LlmSettings) -> AppResult<Arc<dyn LlmClient>> {
    match ProviderType::parse(&settings.provider) {
        Some(ProviderType::Ollama) => {
            let base_url = settings
                .endpoint
                .as_deref()
                .unwrap_or(DEFAULT_OLLAMA_URL);
            let client =
                OllamaClient::with_timeout(base_url, Duration::from_secs(settings.timeout_secs))?;
            Ok(Arc::new(client))
        }
        None => Err(AppError::Config(format!(
            "Unknown provider: {}",
            settings.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client(&LlmSettings::default()).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_ollama_with_custom_endpoint() {
        let settings = LlmSettings {
            endpoint: Some("http://localhost:8080".to_string()),
            ..LlmSettings::default()
        };
        assert!(create_client(&settings).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        let settings = LlmSettings {
            provider: "gemini".to_string(),
            ..LlmSettings::default()
        };
        match create_client(&settings) {
            Err(err) => assert!(err.to_string().contains("Unknown provider")),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
