//! Embedding provider and gateway configuration.

use super::retry::RetryPolicy;
use docchat_core::config::EmbeddingSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which provider to build and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "trigram" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Provider base URL, for HTTP providers
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

impl From<&EmbeddingSettings> for EmbeddingConfig {
    fn from(settings: &EmbeddingSettings) -> Self {
        Self {
            provider: settings.provider.clone(),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
            endpoint: settings.endpoint.clone(),
        }
    }
}

impl EmbeddingConfig {
    /// Identifies the embedding space; stored next to persisted vectors.
    pub fn fingerprint(&self) -> String {
        format!("{}/{}/{}", self.provider, self.model, self.dimensions)
    }
}

/// Batching, pacing and retry behaviour of the embedding gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Texts per provider call
    pub batch_size: usize,
    /// Pause per embedded item
    pub item_delay: Duration,
    /// Pause between batches
    pub batch_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            item_delay: Duration::ZERO,
            batch_delay: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&EmbeddingSettings> for GatewayConfig {
    fn from(settings: &EmbeddingSettings) -> Self {
        Self {
            batch_size: settings.batch_size.max(1),
            item_delay: Duration::from_millis(settings.item_delay_ms),
            batch_delay: Duration::from_millis(settings.batch_delay_ms),
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                base_delay: Duration::from_millis(settings.base_delay_ms),
                factor: settings.backoff_factor,
                max_delay: Duration::from_millis(settings.max_delay_ms),
                ..RetryPolicy::default()
            },
        }
    }
}
