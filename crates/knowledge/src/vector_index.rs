//! Vector store abstraction.
//!
//! Defines the backend-agnostic contract for storing embedded chunks and
//! retrieving the most similar ones for a query.

use crate::types::{Chunk, SearchHit};
use docchat_core::AppResult;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// An embedded chunk. `id` is the insertion ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub id: u64,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// A submitted chunk that was not stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedChunk {
    /// Position in the submitted list.
    pub index: usize,
    pub unit_id: Option<String>,
    pub reason: String,
}

/// Outcome of one `add` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AddReport {
    pub added: usize,
    pub skipped_blank: usize,
    pub failed: Vec<FailedChunk>,
    /// Whether the new records reached storage.
    pub persisted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Empty,
    Ready,
}

/// Snapshot of an index for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub status: IndexStatus,
    pub records: usize,
    pub dimension: Option<usize>,
    /// Records exist that storage has not seen yet.
    pub dirty: bool,
    pub path: Option<PathBuf>,
}

/// Trait for vector store backends.
///
/// Adds are serialised; searches run concurrently with each other but never
/// observe a partially applied add.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and append chunks, then persist.
    async fn add(&self, chunks: Vec<Chunk>, cancel: &CancellationToken) -> AppResult<AddReport>;

    /// The `k` stored chunks most similar to `query`, best first.
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<SearchHit>>;

    /// Write pending records. `false` when there was nothing to write.
    async fn save(&self) -> AppResult<bool>;

    /// Replace in-memory state with what storage holds; returns the record count.
    async fn load(&self) -> AppResult<usize>;

    async fn stats(&self) -> IndexStats;
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Exact top-k over `records`: descending score, ties in insertion order.
pub fn rank(records: &[EmbeddingRecord], query: &[f32], k: usize) -> Vec<SearchHit> {
    let mut scored: Vec<(f32, &EmbeddingRecord)> = records
        .iter()
        .map(|record| (cosine_similarity(query, &record.vector), record))
        .collect();

    // Stable sort keeps insertion order among equal scores.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(score, record)| SearchHit {
            chunk: record.chunk.clone(),
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentUnit, Metadata};

    fn record(id: u64, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id,
            vector,
            chunk: DocumentUnit::new(format!("r{}", id), Metadata::new()),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let records = vec![
            record(0, vec![0.0, 1.0]),
            record(1, vec![1.0, 0.0]),
            record(2, vec![1.0, 1.0]),
        ];

        let hits = rank(&records, &[1.0, 0.0], 2);
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["r1", "r2"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_rank_ties_keep_insertion_order() {
        let records = vec![
            record(0, vec![2.0, 0.0]),
            record(1, vec![1.0, 0.0]),
            record(2, vec![3.0, 0.0]),
        ];

        let hits = rank(&records, &[1.0, 0.0], 3);
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["r0", "r1", "r2"]);
    }

    #[test]
    fn test_rank_k_larger_than_index() {
        let records = vec![record(0, vec![1.0])];
        assert_eq!(rank(&records, &[1.0], 10).len(), 1);
        assert!(rank(&records, &[1.0], 0).is_empty());
    }
}
