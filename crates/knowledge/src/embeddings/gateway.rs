//! Batched, rate-limit aware access to an embedding provider.

use super::config::GatewayConfig;
use super::provider::EmbeddingProvider;
use super::retry::sleep_or_cancel;
use docchat_core::{AppError, AppResult};
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Why a batch produced no vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimitExhausted,
    TransientProviderError,
}

/// A skipped batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    /// Input positions covered by the batch.
    pub indices: Range<usize>,
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
}

/// Vectors aligned with the input texts; `None` where the batch failed.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingBatchReport {
    pub vectors: Vec<Option<Vec<f32>>>,
    pub failures: Vec<BatchFailure>,
}

impl EmbeddingBatchReport {
    fn with_len(len: usize) -> Self {
        Self {
            vectors: vec![None; len],
            failures: Vec::new(),
        }
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures
            .iter()
            .flat_map(|f| f.indices.clone())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn embedded_count(&self) -> usize {
        self.vectors.iter().filter(|v| v.is_some()).count()
    }
}

/// Splits work into provider batches, retries throttled batches and skips
/// the ones that keep failing.
#[derive(Debug, Clone)]
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    config: GatewayConfig,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: GatewayConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Embed `texts`, prefixing each provider input with `instruction`.
    ///
    /// Only cancellation is an error; provider failures are recorded in the
    /// report per batch.
    pub async fn embed(
        &self,
        texts: &[String],
        instruction: Option<&str>,
        cancel: &CancellationToken,
    ) -> AppResult<EmbeddingBatchReport> {
        let mut report = EmbeddingBatchReport::with_len(texts.len());
        if texts.is_empty() {
            return Ok(report);
        }

        let inputs: Vec<String> = match instruction {
            Some(prefix) => texts.iter().map(|t| format!("{}{}", prefix, t)).collect(),
            None => texts.to_vec(),
        };

        let batch_size = self.config.batch_size.max(1);
        let batch_count = inputs.len().div_ceil(batch_size);

        tracing::info!(
            "Embedding {} texts in {} batches using provider '{}' (model: {})",
            inputs.len(),
            batch_count,
            self.provider.provider_name(),
            self.provider.model_name()
        );

        for (batch_index, batch) in inputs.chunks(batch_size).enumerate() {
            let start = batch_index * batch_size;
            let indices = start..start + batch.len();

            let result = self
                .config
                .retry
                .run(cancel, || self.provider.embed_batch(batch))
                .await;

            match result {
                Ok((vectors, _)) if vectors.len() == batch.len() => {
                    for (offset, vector) in vectors.into_iter().enumerate() {
                        report.vectors[start + offset] = Some(vector);
                    }
                }
                Ok((vectors, attempts)) => {
                    let message = format!(
                        "provider returned {} vectors for {} texts",
                        vectors.len(),
                        batch.len()
                    );
                    tracing::warn!("Skipping batch {}: {}", batch_index, message);
                    report.failures.push(BatchFailure {
                        indices,
                        kind: FailureKind::TransientProviderError,
                        message,
                        attempts,
                    });
                }
                Err(failure) => match failure.error {
                    AppError::Cancelled => return Err(AppError::Cancelled),
                    AppError::RateLimitExhausted { attempts, message } => {
                        tracing::warn!(
                            "Skipping batch {} after {} rate-limited attempts",
                            batch_index,
                            attempts
                        );
                        report.failures.push(BatchFailure {
                            indices,
                            kind: FailureKind::RateLimitExhausted,
                            message,
                            attempts,
                        });
                    }
                    error => {
                        tracing::warn!("Skipping batch {}: {}", batch_index, error);
                        report.failures.push(BatchFailure {
                            indices,
                            kind: FailureKind::TransientProviderError,
                            message: error.to_string(),
                            attempts: failure.attempts,
                        });
                    }
                },
            }

            if batch_index + 1 < batch_count {
                let pause = self.config.item_delay.saturating_mul(batch.len() as u32)
                    + self.config.batch_delay;
                sleep_or_cancel(pause, cancel).await?;
            }
        }

        tracing::debug!(
            "Embedded {}/{} texts, {} failed batches",
            report.embedded_count(),
            texts.len(),
            report.failures.len()
        );

        Ok(report)
    }

    /// Embed a single text, turning a skipped batch into an error.
    pub async fn embed_one(
        &self,
        text: &str,
        instruction: Option<&str>,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<f32>> {
        let mut report = self.embed(&[text.to_string()], instruction, cancel).await?;

        if let Some(failure) = report.failures.pop() {
            return Err(match failure.kind {
                FailureKind::RateLimitExhausted => AppError::RateLimitExhausted {
                    attempts: failure.attempts,
                    message: failure.message,
                },
                FailureKind::TransientProviderError => AppError::TransientProvider(failure.message),
            });
        }

        report
            .vectors
            .pop()
            .flatten()
            .ok_or_else(|| AppError::TransientProvider("no embedding returned".to_string()))
    }
}
