//! Document knowledge base and retrieval-augmented chat.
//!
//! Write path: [`extract`] → [`chunker`] → [`embeddings`] → [`index`].
//! Read path: [`rag::ContextAssembler`] → [`rag::ChatOrchestrator`].

pub mod chunker;
pub mod embeddings;
pub mod extract;
pub mod index;
pub mod progress;
pub mod rag;
pub mod types;
pub mod vector_index;

pub use chunker::ChunkConfig;
pub use extract::{extract, extract_uploads, ExtractOptions, FileFormat, FileOutcome, UploadedFile};
pub use index::{IndexConfig, LocalIndex};
pub use progress::{ProgressEvent, ProgressReporter};
pub use types::{Chunk, DocumentUnit, Metadata, SearchHit};
pub use vector_index::{AddReport, FailedChunk, IndexStats, IndexStatus, VectorStore};

use docchat_core::{AppConfig, AppError, AppResult};
use rag::{
    ChatConfig, ChatOrchestrator, ContextAssembler, ContextConfig, JsonHistoryStore,
    LlmAnswerGenerator,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Outcome of an ingest run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub files: Vec<FileOutcome>,
    pub units: usize,
    pub chunks: usize,
    pub added: usize,
    pub skipped_blank: usize,
    pub failed: Vec<FailedChunk>,
    pub persisted: bool,
    pub duration_secs: f64,
}

impl IngestReport {
    pub fn failed_files(&self) -> usize {
        self.files.iter().filter(|f| !f.success).count()
    }
}

/// A file to ingest and the name its units are indexed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Path below the walked directory (`/`-separated), or the bare file
    /// name for files named explicitly.
    pub name: String,
}

impl DiscoveredFile {
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name }
    }

    fn under(root: &Path, path: &Path) -> Self {
        let name = path
            .strip_prefix(root)
            .ok()
            .map(|relative| {
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .filter(|name| !name.is_empty());
        match name {
            Some(name) => Self {
                path: path.to_path_buf(),
                name,
            },
            None => Self::new(path.to_path_buf()),
        }
    }
}

/// Expand `paths` into the files to ingest.
///
/// Files named explicitly are kept whatever their extension, so unsupported
/// ones are reported; directories are walked for supported files only.
pub fn discover_files(paths: &[PathBuf]) -> AppResult<Vec<DiscoveredFile>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(DiscoveredFile::new(path.clone()));
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let entry_path = entry.path();
                let supported = entry_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(FileFormat::from_filename)
                    .is_some();
                if entry_path.is_file() && supported && !is_hidden(entry_path, path) {
                    files.push(DiscoveredFile::under(path, entry_path));
                }
            }
        } else {
            return Err(AppError::Knowledge(format!("Path not found: {:?}", path)));
        }
    }

    Ok(files)
}

/// Hidden files and anything under a hidden directory below `root`.
fn is_hidden(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root)
        .map(|relative| {
            relative
                .components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
        })
        .unwrap_or(false)
}

/// Extract, chunk and index `files`.
///
/// A file that cannot be read is recorded in the report and skipped; index
/// errors (persistence, cancellation) abort the run.
pub async fn ingest(
    store: &dyn VectorStore,
    files: &[DiscoveredFile],
    chunking: &ChunkConfig,
    progress: &ProgressReporter,
    cancel: &CancellationToken,
) -> AppResult<IngestReport> {
    let start = Instant::now();
    let mut report = IngestReport::default();
    let mut units = Vec::new();

    progress.discover(files.len() as u64);
    tracing::info!("Ingesting {} files", files.len());

    for (i, file) in files.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let name = file.name.clone();
        progress.extract(i as u64 + 1, files.len() as u64, &name);

        let path = file.path.clone();
        let display_name = name.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&path)?;
            extract(&bytes, &display_name, &ExtractOptions::default())
        })
        .await
        .map_err(|e| AppError::Other(format!("extraction task failed: {}", e)))?;

        match extracted {
            Ok(file_units) => {
                report.files.push(FileOutcome {
                    filename: name,
                    success: true,
                    unit_count: file_units.len(),
                    error: None,
                });
                units.extend(file_units);
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {}", name, e);
                report.files.push(FileOutcome {
                    filename: name,
                    success: false,
                    unit_count: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    report.units = units.len();
    let chunks = chunker::chunk_all(units, chunking);
    report.chunks = chunks.len();
    progress.chunk(report.units as u64, report.chunks as u64);

    if !chunks.is_empty() {
        progress.embed(report.chunks as u64);
        let added = store.add(chunks, cancel).await?;
        progress.index(added.added as u64, report.chunks as u64);

        report.added = added.added;
        report.skipped_blank = added.skipped_blank;
        report.failed = added.failed;
        report.persisted = added.persisted;
    }

    report.duration_secs = start.elapsed().as_secs_f64();
    tracing::info!(
        "Ingest completed: {} files ({} failed), {} chunks, {} indexed in {:.2}s",
        report.files.len(),
        report.failed_files(),
        report.chunks,
        report.added,
        report.duration_secs
    );

    Ok(report)
}

/// Open the configured vector index, loading what storage holds.
pub async fn open_index(config: &AppConfig) -> AppResult<Arc<LocalIndex>> {
    let gateway = embeddings::create_gateway(&config.embedding)?;
    let index = LocalIndex::open(IndexConfig::from_app(config), gateway).await?;
    Ok(Arc::new(index))
}

/// Build a chat orchestrator over `store` with the configured LLM and
/// file-backed history.
pub fn open_chat(config: &AppConfig, store: Arc<dyn VectorStore>) -> AppResult<ChatOrchestrator> {
    let assembler = ContextAssembler::new(store, ContextConfig::from(&config.chat));
    let generator = Arc::new(LlmAnswerGenerator::from_config(config)?);
    let history = Arc::new(JsonHistoryStore::new(config.sessions_dir()));

    Ok(ChatOrchestrator::new(
        assembler,
        generator,
        history,
        ChatConfig::from(&config.chat),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::trigram::TrigramProvider;
    use crate::embeddings::{EmbeddingGateway, GatewayConfig};
    use std::time::Duration;
    use tempfile::TempDir;

    fn memory_index() -> LocalIndex {
        LocalIndex::new(
            IndexConfig::default(),
            EmbeddingGateway::new(
                Arc::new(TrigramProvider::new(128)),
                GatewayConfig {
                    batch_delay: Duration::ZERO,
                    ..GatewayConfig::default()
                },
            ),
        )
    }

    #[test]
    fn test_discover_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("docs/nested")).unwrap();
        std::fs::create_dir_all(root.join(".docchat")).unwrap();
        std::fs::write(root.join("docs/a.txt"), "a").unwrap();
        std::fs::write(root.join("docs/nested/b.csv"), "x\n1").unwrap();
        std::fs::write(root.join("docs/skip.pdf"), "%PDF").unwrap();
        std::fs::write(root.join(".docchat/c.txt"), "hidden").unwrap();
        std::fs::write(root.join("explicit.pdf"), "%PDF").unwrap();

        let files = discover_files(&[root.to_path_buf(), root.join("explicit.pdf")]).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["docs/a.txt", "docs/nested/b.csv", "explicit.pdf"]);
        assert_eq!(files[1].path, root.join("docs").join("nested").join("b.csv"));

        assert!(discover_files(&[root.join("missing")]).is_err());
    }

    #[tokio::test]
    async fn test_ingest_then_search() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::write(
            root.join("policy.txt"),
            "Refunds are approved by the finance team within five days.",
        )
        .unwrap();
        std::fs::write(
            root.join("orders.csv"),
            "order_id,status\n1001,shipped\n1002,pending\n",
        )
        .unwrap();
        std::fs::write(root.join("broken.docx"), "not a zip").unwrap();

        let index = memory_index();
        let files = discover_files(&[root.to_path_buf()]).unwrap();
        let report = ingest(
            &index,
            &files,
            &ChunkConfig::default(),
            &ProgressReporter::noop(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.files.len(), 3);
        assert_eq!(report.failed_files(), 1);
        assert_eq!(report.units, 3);
        assert_eq!(report.added, 3);
        assert!(!report.persisted);

        let hits = index.search("who approves refunds", 1).await.unwrap();
        assert_eq!(hits[0].chunk.source_filename(), Some("policy.txt"));
    }

    #[tokio::test]
    async fn test_same_file_name_in_two_folders_keeps_distinct_ids() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for folder in ["alpha", "beta"] {
            std::fs::create_dir_all(root.join(folder)).unwrap();
            std::fs::write(root.join(folder).join("notes.txt"), format!("{} notes", folder))
                .unwrap();
        }

        let index = memory_index();
        let files = discover_files(&[root.to_path_buf()]).unwrap();
        ingest(
            &index,
            &files,
            &ChunkConfig::default(),
            &ProgressReporter::noop(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let hits = index.search("notes", 2).await.unwrap();
        let mut ids: Vec<&str> = hits.iter().filter_map(|h| h.chunk.unit_id()).collect();
        ids.sort();
        assert_eq!(ids, vec!["alpha/notes.txt#0", "beta/notes.txt#0"]);
    }

    #[tokio::test]
    async fn test_ingest_honours_cancellation() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "text").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = ingest(
            &memory_index(),
            &[DiscoveredFile::new(temp.path().join("a.txt"))],
            &ChunkConfig::default(),
            &ProgressReporter::noop(),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn test_open_index_uses_workspace_state_dir() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig {
            workspace: temp.path().to_path_buf(),
            ..AppConfig::default()
        };

        let index = open_index(&config).await.unwrap();
        let stats = index.stats().await;
        assert_eq!(stats.records, 0);
        assert_eq!(
            stats.path,
            Some(temp.path().join(".docchat").join("index").join(crate::index::STORE_FILE))
        );
    }
}
