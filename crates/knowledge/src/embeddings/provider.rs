//! Embedding provider trait and factory.

use super::config::EmbeddingConfig;
use super::providers::{ollama::OllamaProvider, trigram::TrigramProvider};
use docchat_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "trigram", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in one call.
    ///
    /// Providers signal throttling with [`AppError::RateLimited`].
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Knowledge("No embedding returned".to_string()))
    }
}

/// Create an embedding provider based on configuration.
pub fn create_provider(config: &EmbeddingConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "trigram" => Ok(Arc::new(TrigramProvider::new(config.dimensions))),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: trigram, ollama",
            config.provider
        ))),
    }
}
