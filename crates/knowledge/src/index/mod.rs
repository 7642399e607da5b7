//! Local vector index: exact search in memory, persisted to SQLite.

pub mod storage;

pub use storage::STORE_FILE;

use crate::embeddings::{
    resolve_instruction, EmbeddingConfig, EmbeddingGateway, DOCUMENT_INSTRUCTION, QUERY_INSTRUCTION,
};
use crate::types::{Chunk, SearchHit};
use crate::vector_index::{
    rank, AddReport, EmbeddingRecord, FailedChunk, IndexStats, IndexStatus, VectorStore,
};
use docchat_core::{AppConfig, AppError, AppResult};
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Where the index lives and how texts are prefixed before embedding.
#[derive(Debug, Clone, Default)]
pub struct IndexConfig {
    /// Storage directory; `None` keeps the index in memory only.
    pub dir: Option<PathBuf>,
    pub document_instruction: Option<String>,
    pub query_instruction: Option<String>,
}

impl IndexConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            dir: config.index_dir(),
            document_instruction: resolve_instruction(
                config.embedding.document_instruction.as_deref(),
                DOCUMENT_INSTRUCTION,
            ),
            query_instruction: resolve_instruction(
                config.embedding.query_instruction.as_deref(),
                QUERY_INSTRUCTION,
            ),
        }
    }

    pub fn storage_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(STORE_FILE))
    }
}

#[derive(Debug, Default)]
struct IndexState {
    records: Vec<EmbeddingRecord>,
    dimension: Option<usize>,
    /// Records below this position are in storage.
    persisted: usize,
    /// Storage must be rebuilt from scratch on the next write.
    rewrite: bool,
}

impl IndexState {
    fn fresh() -> Self {
        Self {
            rewrite: true,
            ..Self::default()
        }
    }

    fn is_dirty(&self) -> bool {
        self.persisted < self.records.len()
    }
}

/// Brute-force cosine index over all records.
#[derive(Debug)]
pub struct LocalIndex {
    config: IndexConfig,
    gateway: EmbeddingGateway,
    state: RwLock<IndexState>,
    write_gate: Mutex<()>,
}

impl LocalIndex {
    /// An empty index; nothing is read from storage.
    pub fn new(config: IndexConfig, gateway: EmbeddingGateway) -> Self {
        Self {
            config,
            gateway,
            state: RwLock::new(IndexState::fresh()),
            write_gate: Mutex::new(()),
        }
    }

    /// Create an index and load its storage. A corrupt store is logged and
    /// the index starts empty.
    pub async fn open(config: IndexConfig, gateway: EmbeddingGateway) -> AppResult<Self> {
        let index = Self::new(config, gateway);
        match index.load().await {
            Ok(count) => {
                tracing::info!("Opened vector index with {} records", count);
                Ok(index)
            }
            Err(AppError::CorruptIndex(message)) => {
                tracing::error!("Vector index is corrupt, starting empty: {}", message);
                Ok(index)
            }
            Err(e) => Err(e),
        }
    }

    fn fingerprint(&self) -> String {
        let provider = self.gateway.provider();
        EmbeddingConfig {
            provider: provider.provider_name().to_string(),
            model: provider.model_name().to_string(),
            dimensions: provider.dimensions(),
            endpoint: None,
        }
        .fingerprint()
    }

    /// Write pending records while the caller holds the write lock.
    async fn persist(&self, state: &mut IndexState) -> AppResult<bool> {
        let Some(path) = self.config.storage_path() else {
            return Ok(false);
        };
        if !state.rewrite && !state.is_dirty() {
            return Ok(false);
        }

        let rewrite = state.rewrite;
        let pending: Vec<EmbeddingRecord> = if rewrite {
            state.records.clone()
        } else {
            state.records[state.persisted..].to_vec()
        };
        let count = pending.len();
        let dimension = state.dimension;
        let fingerprint = self.fingerprint();

        tokio::task::spawn_blocking(move || {
            if rewrite {
                storage::rewrite(&path, &pending, dimension, &fingerprint)
            } else {
                storage::append(&path, &pending, dimension, &fingerprint)
            }
        })
        .await
        .map_err(|e| AppError::Persistence(format!("index write task failed: {}", e)))??;

        state.persisted = state.records.len();
        state.rewrite = false;

        tracing::debug!(
            "Persisted {} records ({})",
            count,
            if rewrite { "rewrite" } else { "append" }
        );
        Ok(true)
    }
}

#[async_trait::async_trait]
impl VectorStore for LocalIndex {
    async fn add(&self, chunks: Vec<Chunk>, cancel: &CancellationToken) -> AppResult<AddReport> {
        let _gate = self.write_gate.lock().await;

        let submitted = chunks.len();
        let candidates: Vec<(usize, Chunk)> = chunks
            .into_iter()
            .enumerate()
            .filter(|(_, chunk)| !chunk.is_blank())
            .collect();

        let mut report = AddReport {
            skipped_blank: submitted - candidates.len(),
            ..AddReport::default()
        };
        if candidates.is_empty() {
            return Ok(report);
        }

        let texts: Vec<String> = candidates.iter().map(|(_, c)| c.text.clone()).collect();
        let embedded = self
            .gateway
            .embed(&texts, self.config.document_instruction.as_deref(), cancel)
            .await?;

        let mut state = self.state.write().await;

        for ((index, chunk), vector) in candidates.into_iter().zip(embedded.vectors) {
            let reason = match vector {
                None => Some("embedding failed".to_string()),
                Some(vector) => {
                    let dimension = *state.dimension.get_or_insert(vector.len());
                    if vector.len() == dimension {
                        let id = state.records.len() as u64;
                        state.records.push(EmbeddingRecord { id, vector, chunk: chunk.clone() });
                        report.added += 1;
                        None
                    } else {
                        Some(format!(
                            "dimension {} does not match index dimension {}",
                            vector.len(),
                            dimension
                        ))
                    }
                }
            };

            if let Some(reason) = reason {
                report.failed.push(FailedChunk {
                    index,
                    unit_id: chunk.unit_id().map(str::to_string),
                    reason,
                });
            }
        }

        if !report.failed.is_empty() {
            tracing::warn!("{} chunks were not indexed", report.failed.len());
        }

        match self.persist(&mut state).await {
            Ok(persisted) => {
                report.persisted = persisted;
                tracing::info!(
                    "Indexed {} chunks ({} records total)",
                    report.added,
                    state.records.len()
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(
                    "Indexed {} chunks in memory but could not persist: {}",
                    report.added,
                    e
                );
                Err(match e {
                    AppError::Persistence(_) => e,
                    other => AppError::Persistence(other.to_string()),
                })
            }
        }
    }

    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<SearchHit>> {
        if k == 0 || self.state.read().await.records.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self
            .gateway
            .embed_one(
                query,
                self.config.query_instruction.as_deref(),
                &CancellationToken::new(),
            )
            .await?;

        let state = self.state.read().await;
        if let Some(dimension) = state.dimension {
            if vector.len() != dimension {
                return Err(AppError::Knowledge(format!(
                    "Query embedding has dimension {}, index has {}",
                    vector.len(),
                    dimension
                )));
            }
        }

        let hits = rank(&state.records, &vector, k);
        tracing::debug!(
            "Retrieved {} chunks (requested top-{}) from {} records",
            hits.len(),
            k,
            state.records.len()
        );
        Ok(hits)
    }

    async fn save(&self) -> AppResult<bool> {
        let _gate = self.write_gate.lock().await;
        let mut state = self.state.write().await;
        self.persist(&mut state).await
    }

    async fn load(&self) -> AppResult<usize> {
        let _gate = self.write_gate.lock().await;
        let mut state = self.state.write().await;

        let Some(path) = self.config.storage_path() else {
            return Ok(state.records.len());
        };

        let loaded = tokio::task::spawn_blocking(move || storage::load(&path))
            .await
            .map_err(|e| AppError::Persistence(format!("index read task failed: {}", e)))?;

        match loaded {
            Ok(None) => {
                *state = IndexState::fresh();
                Ok(0)
            }
            Ok(Some(stored)) => {
                let fingerprint = self.fingerprint();
                if let Some(found) = stored.fingerprint.as_deref() {
                    if found != fingerprint {
                        tracing::warn!(
                            "Index was built with embeddings '{}', now using '{}'",
                            found,
                            fingerprint
                        );
                    }
                }

                let count = stored.records.len();
                *state = IndexState {
                    records: stored.records,
                    dimension: stored.dimension,
                    persisted: count,
                    rewrite: false,
                };
                Ok(count)
            }
            Err(e) => {
                tracing::error!("Failed to load vector index: {}", e);
                *state = IndexState::fresh();
                Err(e)
            }
        }
    }

    async fn stats(&self) -> IndexStats {
        let state = self.state.read().await;
        IndexStats {
            status: if state.records.is_empty() {
                IndexStatus::Empty
            } else {
                IndexStatus::Ready
            },
            records: state.records.len(),
            dimension: state.dimension,
            dirty: state.is_dirty(),
            path: self.config.storage_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::gateway::fakes::ScriptedProvider;
    use crate::embeddings::providers::trigram::TrigramProvider;
    use crate::embeddings::{GatewayConfig, RetryPolicy};
    use crate::types::{DocumentUnit, Metadata};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn gateway() -> EmbeddingGateway {
        EmbeddingGateway::new(
            Arc::new(TrigramProvider::new(64)),
            GatewayConfig {
                batch_delay: Duration::ZERO,
                ..GatewayConfig::default()
            },
        )
    }

    fn config(dir: Option<PathBuf>) -> IndexConfig {
        IndexConfig {
            dir,
            document_instruction: None,
            query_instruction: None,
        }
    }

    fn chunk(text: &str) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert("unit_id".into(), json!(format!("{}#0", text)));
        DocumentUnit::new(text, metadata)
    }

    fn texts(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.chunk.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_empty_index_search_skips_embedding() {
        let provider = Arc::new(ScriptedProvider::default());
        let index = LocalIndex::new(
            config(None),
            EmbeddingGateway::new(provider.clone(), GatewayConfig::default()),
        );

        assert!(index.search("anything", 5).await.unwrap().is_empty());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_and_search() {
        let index = LocalIndex::new(config(None), gateway());
        let cancel = CancellationToken::new();

        let report = index
            .add(
                vec![
                    chunk("warehouse inbound receiving process"),
                    chunk("   "),
                    chunk("quarterly marketing budget review"),
                ],
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(report.added, 2);
        assert_eq!(report.skipped_blank, 1);
        assert!(!report.persisted);

        let hits = index.search("inbound warehouse", 1).await.unwrap();
        assert_eq!(texts(&hits), vec!["warehouse inbound receiving process"]);
        assert!(index.search("inbound warehouse", 0).await.unwrap().is_empty());
        assert_eq!(index.search("budget", 10).await.unwrap().len(), 2);

        let stats = index.stats().await;
        assert_eq!(stats.status, IndexStatus::Ready);
        assert_eq!(stats.records, 2);
        assert_eq!(stats.dimension, Some(64));
        assert!(stats.path.is_none());
    }

    #[tokio::test]
    async fn test_failed_and_mismatched_vectors_are_reported() {
        let provider = Arc::new(ScriptedProvider::with_script(vec![
            Ok(vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]),
            Err(AppError::Llm("down".into())),
        ]));
        let index = LocalIndex::new(
            config(None),
            EmbeddingGateway::new(
                provider,
                GatewayConfig {
                    batch_size: 2,
                    batch_delay: Duration::ZERO,
                    retry: RetryPolicy::default(),
                    ..GatewayConfig::default()
                },
            ),
        );

        let report = index
            .add(vec![chunk("a"), chunk("b"), chunk("c")], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.added, 1);
        let failed: Vec<usize> = report.failed.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![1, 2]);
        assert!(report.failed[0].reason.contains("dimension"));
        assert_eq!(report.failed[1].unit_id.as_deref(), Some("c#0"));
    }

    #[tokio::test]
    async fn test_cancelled_add_appends_nothing() {
        let index = LocalIndex::new(config(None), gateway());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = index.add(vec![chunk("text")], &cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(index.stats().await.records, 0);
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let temp = TempDir::new().unwrap();
        let dir = Some(temp.path().join("index"));
        let cancel = CancellationToken::new();

        let index = LocalIndex::new(config(dir.clone()), gateway());
        let report = index
            .add(vec![chunk("alpha beta"), chunk("gamma delta")], &cancel)
            .await
            .unwrap();
        assert!(report.persisted);
        index.add(vec![chunk("epsilon zeta")], &cancel).await.unwrap();
        assert!(!index.stats().await.dirty);
        assert!(!index.save().await.unwrap());

        let before = index.search("gamma", 3).await.unwrap();

        let reopened = LocalIndex::open(config(dir), gateway()).await.unwrap();
        let stats = reopened.stats().await;
        assert_eq!(stats.records, 3);
        assert_eq!(stats.dimension, Some(64));
        assert!(!stats.dirty);
        assert_eq!(reopened.search("gamma", 3).await.unwrap(), before);

        reopened.add(vec![chunk("eta theta")], &cancel).await.unwrap();
        let again = LocalIndex::open(config(Some(temp.path().join("index"))), gateway())
            .await
            .unwrap();
        assert_eq!(again.stats().await.records, 4);
    }

    #[tokio::test]
    async fn test_missing_storage_loads_empty() {
        let temp = TempDir::new().unwrap();
        let index = LocalIndex::new(config(Some(temp.path().to_path_buf())), gateway());
        assert_eq!(index.load().await.unwrap(), 0);
        assert_eq!(index.stats().await.status, IndexStatus::Empty);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_records_dirty() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"file, not a directory").unwrap();

        let index = LocalIndex::new(config(Some(blocker.join("index"))), gateway());
        let result = index
            .add(vec![chunk("kept in memory")], &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AppError::Persistence(_))));
        let stats = index.stats().await;
        assert_eq!(stats.records, 1);
        assert!(stats.dirty);
        assert_eq!(index.search("memory", 1).await.unwrap().len(), 1);

        std::fs::remove_file(&blocker).unwrap();
        assert!(index.save().await.unwrap());
        assert!(!index.stats().await.dirty);
    }

    #[tokio::test]
    async fn test_corrupt_storage_recovers() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();
        std::fs::write(dir.join(STORE_FILE), b"garbage bytes").unwrap();

        let index = LocalIndex::new(config(Some(dir.clone())), gateway());
        assert!(matches!(index.load().await, Err(AppError::CorruptIndex(_))));
        assert_eq!(index.stats().await.records, 0);

        let index = LocalIndex::open(config(Some(dir.clone())), gateway()).await.unwrap();
        index.add(vec![chunk("fresh start")], &CancellationToken::new()).await.unwrap();

        let reopened = LocalIndex::open(config(Some(dir)), gateway()).await.unwrap();
        assert_eq!(reopened.stats().await.records, 1);
    }

    #[tokio::test]
    async fn test_concurrent_adds_get_distinct_ids() {
        let temp = TempDir::new().unwrap();
        let dir = Some(temp.path().to_path_buf());
        let index = Arc::new(LocalIndex::new(config(dir.clone()), gateway()));
        let cancel = CancellationToken::new();

        let mut tasks = Vec::new();
        for i in 0..4 {
            let index = index.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                index
                    .add(vec![chunk(&format!("doc {} one", i)), chunk(&format!("doc {} two", i))], &cancel)
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = storage::load(&temp.path().join(STORE_FILE)).unwrap().unwrap();
        let ids: Vec<u64> = stored.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, (0..8).collect::<Vec<u64>>());
    }
}
