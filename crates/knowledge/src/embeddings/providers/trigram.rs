//! Deterministic hashing embedder for offline use.

use crate::embeddings::provider::EmbeddingProvider;
use docchat_core::AppResult;
use std::collections::HashMap;
use unicode_segmentation::UnicodeSegmentation;

const STOP_WORDS: [&str; 24] = [
    "the", "is", "at", "which", "on", "an", "as", "are", "was", "were", "for", "to", "of", "in",
    "and", "or", "but", "with", "by", "from", "be", "it", "its", "và",
];

/// Hashes words and their character trigrams into a fixed number of buckets.
///
/// Vectors are L2-normalised, so texts sharing vocabulary score a high cosine
/// similarity. There is no semantic understanding; it exists so the pipeline
/// runs without a model server.
#[derive(Debug)]
pub struct TrigramProvider {
    dimensions: usize,
}

impl TrigramProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();

        let mut frequencies: HashMap<&str, u32> = HashMap::new();
        for word in lower.unicode_words() {
            if !STOP_WORDS.contains(&word) {
                *frequencies.entry(word).or_insert(0) += 1;
            }
        }

        for (word, count) in frequencies {
            let weight = count as f32;
            vector[self.bucket(word.as_bytes())] += weight;

            let padded: Vec<char> = std::iter::once('^')
                .chain(word.chars())
                .chain(std::iter::once('$'))
                .collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                vector[self.bucket(trigram.as_bytes())] += weight.sqrt() * 0.5;
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn bucket(&self, bytes: &[u8]) -> usize {
        // FNV-1a
        let hash = bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
            (acc ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
        });
        (hash % self.dimensions as u64) as usize
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramProvider {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_unit_length_and_dimensions() {
        let provider = TrigramProvider::new(384);
        let embeddings = provider
            .embed_batch(&["hello world".to_string(), "Quy trình nhập kho".to_string()])
            .await
            .unwrap();

        assert_eq!(embeddings.len(), 2);
        for embedding in &embeddings {
            assert_eq!(embedding.len(), 384);
            let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 0.001);
        }
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = TrigramProvider::new(128);
        let first = provider.embed("deterministic test").await.unwrap();
        let second = provider.embed("deterministic test").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_scores_higher() {
        let provider = TrigramProvider::new(384);
        let query = provider.embed("warehouse inbound process").await.unwrap();
        let related = provider
            .embed("The inbound process at the warehouse starts with receiving")
            .await
            .unwrap();
        let unrelated = provider.embed("quarterly marketing budget").await.unwrap();

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let provider = TrigramProvider::new(64);
        let embedding = provider.embed("").await.unwrap();
        assert_eq!(embedding.len(), 64);
        assert!(embedding.iter().all(|&x| x == 0.0));
    }
}
