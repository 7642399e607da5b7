//! Embedding generation.
//!
//! Providers turn text into vectors; the [`EmbeddingGateway`] in front of
//! them batches requests, backs off on rate limits and reports which inputs
//! could not be embedded.

pub mod config;
pub mod gateway;
pub mod instructions;
pub mod provider;
pub mod providers;
pub mod retry;

pub use config::{EmbeddingConfig, GatewayConfig};
pub use gateway::{BatchFailure, EmbeddingBatchReport, EmbeddingGateway, FailureKind};
pub use instructions::{
    resolve_instruction, DOCUMENT_INSTRUCTION, QUERY_INSTRUCTION, TECHNICAL_INSTRUCTION,
};
pub use provider::{create_provider, EmbeddingProvider};
pub use retry::{is_rate_limited, RetryPolicy};

use docchat_core::config::EmbeddingSettings;
use docchat_core::AppResult;

/// Build a gateway over the configured provider.
pub fn create_gateway(settings: &EmbeddingSettings) -> AppResult<EmbeddingGateway> {
    let config = EmbeddingConfig::from(settings);
    let provider = create_provider(&config)?;

    tracing::debug!(
        "Creating embedding gateway: provider={}, model={}, dimensions={}, batch_size={}",
        config.provider,
        config.model,
        config.dimensions,
        settings.batch_size
    );

    Ok(EmbeddingGateway::new(provider, GatewayConfig::from(settings)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_default_gateway_embeds_offline() {
        let gateway = create_gateway(&EmbeddingSettings::default()).unwrap();
        assert_eq!(gateway.provider().provider_name(), "trigram");

        let report = gateway
            .embed(
                &["hello world".to_string()],
                Some(DOCUMENT_INSTRUCTION),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.vectors[0].as_ref().map(Vec::len), Some(384));
    }
}
