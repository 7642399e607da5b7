//! Configuration management for docchat.
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - the YAML config file (`.docchat/config.yaml` or `DOCCHAT_CONFIG`)
//! - `DOCCHAT_*` environment variables
//! - command-line flags (`with_overrides`)
//!
//! All on-disk state (index, sessions) lives under `<workspace>/.docchat/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

const STATE_DIR: &str = ".docchat";

const KNOWN_LLM_PROVIDERS: &[&str] = &["ollama"];
const KNOWN_EMBEDDING_PROVIDERS: &[&str] = &["trigram", "ollama"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Workspace root (contains `.docchat/`)
    pub workspace: PathBuf,

    /// Config file that was merged, if any
    pub config_file: Option<PathBuf>,

    /// Log filter override
    pub log_level: Option<String>,

    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub chunking: ChunkingSettings,
    pub chat: ChatSettings,
}

/// Chat-completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LlmSettings {
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            endpoint: None,
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 120,
        }
    }
}

/// Embedding provider and gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EmbeddingSettings {
    /// "trigram" (offline, deterministic) or "ollama"
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub endpoint: Option<String>,

    /// Texts per provider call
    pub batch_size: usize,

    /// Retries of a rate-limited batch before it is skipped
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: u32,
    pub max_delay_ms: u64,

    /// Pause after each embedded item
    pub item_delay_ms: u64,

    /// Pause between batches
    pub batch_delay_ms: u64,

    /// Instruction for stored chunks: a preset name or literal prefix
    pub document_instruction: Option<String>,

    /// Instruction for search queries: a preset name or literal prefix
    pub query_instruction: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
            batch_size: 5,
            max_retries: 5,
            base_delay_ms: 1000,
            backoff_factor: 2,
            max_delay_ms: 60_000,
            item_delay_ms: 0,
            batch_delay_ms: 500,
            document_instruction: None,
            query_instruction: None,
        }
    }
}

/// Vector index storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexSettings {
    /// Storage directory; defaults to `.docchat/index`
    pub dir: Option<PathBuf>,

    /// Keep the index purely in memory
    pub in_memory: bool,
}

/// Chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkingSettings {
    pub max_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_size: 512,
            overlap: 0,
        }
    }
}

/// Retrieval and conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatSettings {
    pub top_k: usize,
    pub max_carry_chars: usize,
    pub history_window: usize,
    pub max_upload_chars: usize,

    /// Replaces the built-in continuation marker list when set
    pub continuation_markers: Option<Vec<String>>,

    /// Conversation files; defaults to `.docchat/sessions`
    pub sessions_dir: Option<PathBuf>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_carry_chars: 2000,
            history_window: 10,
            max_upload_chars: 3000,
            continuation_markers: None,
            sessions_dir: None,
        }
    }
}

/// Shape of the YAML config file. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    llm: Option<LlmSettings>,
    embedding: Option<EmbeddingSettings>,
    index: Option<IndexSettings>,
    chunking: Option<ChunkingSettings>,
    chat: Option<ChatSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            log_json: false,
            verbose: false,
            no_color: false,
            llm: LlmSettings::default(),
            embedding: EmbeddingSettings::default(),
            index: IndexSettings::default(),
            chunking: ChunkingSettings::default(),
            chat: ChatSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration for an explicit workspace and/or config file.
    ///
    /// Environment variables:
    /// - `DOCCHAT_WORKSPACE`, `DOCCHAT_CONFIG`
    /// - `DOCCHAT_PROVIDER`, `DOCCHAT_MODEL`, `DOCCHAT_LLM_ENDPOINT`
    /// - `DOCCHAT_EMBEDDING_PROVIDER`, `DOCCHAT_EMBEDDING_MODEL`
    /// - `NO_COLOR`
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) =
            workspace.or_else(|| std::env::var("DOCCHAT_WORKSPACE").ok().map(PathBuf::from))
        {
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var("DOCCHAT_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
            config.config_file = Some(config_path);
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var("DOCCHAT_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("DOCCHAT_MODEL") {
            self.llm.model = model;
        }
        if let Ok(endpoint) = std::env::var("DOCCHAT_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }
        if let Ok(provider) = std::env::var("DOCCHAT_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Ok(model) = std::env::var("DOCCHAT_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if std::env::var_os("NO_COLOR").is_some() {
            self.no_color = true;
        }
    }

    /// Merge a YAML config file into a copy of this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(path) = file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        if let Some(llm) = file.llm {
            result.llm = llm;
        }
        if let Some(embedding) = file.embedding {
            result.embedding = embedding;
        }
        if let Some(index) = file.index {
            result.index = index;
        }
        if let Some(chunking) = file.chunking {
            result.chunking = chunking;
        }
        if let Some(chat) = file.chat {
            result.chat = chat;
        }

        Ok(result)
    }

    /// Apply command-line flags on top of the loaded configuration.
    pub fn with_overrides(
        mut self,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(provider) = provider {
            self.llm.provider = provider;
        }

        if let Some(model) = model {
            self.llm.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Path to the `.docchat` state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the `.docchat` directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Where the vector index is persisted, or `None` for an in-memory index.
    pub fn index_dir(&self) -> Option<PathBuf> {
        if self.index.in_memory {
            return None;
        }
        Some(resolve(
            &self.workspace,
            self.index.dir.clone(),
            || self.state_dir().join("index"),
        ))
    }

    /// Where conversation files are written.
    pub fn sessions_dir(&self) -> PathBuf {
        resolve(&self.workspace, self.chat.sessions_dir.clone(), || {
            self.state_dir().join("sessions")
        })
    }

    /// Check provider names and numeric limits.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.llm.provider,
                KNOWN_LLM_PROVIDERS.join(", ")
            )));
        }

        if !KNOWN_EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 || self.embedding.batch_size == 0 {
            return Err(AppError::Config(
                "embedding.dimensions and embedding.batchSize must be positive".to_string(),
            ));
        }

        if self.chunking.max_size == 0 {
            return Err(AppError::Config(
                "chunking.maxSize must be positive".to_string(),
            ));
        }

        if self.chunking.overlap >= self.chunking.max_size {
            return Err(AppError::Config(format!(
                "chunking.overlap ({}) must be smaller than chunking.maxSize ({})",
                self.chunking.overlap, self.chunking.max_size
            )));
        }

        if self.chat.top_k == 0 {
            return Err(AppError::Config("chat.topK must be positive".to_string()));
        }

        Ok(())
    }
}

fn resolve(workspace: &Path, configured: Option<PathBuf>, default: impl FnOnce() -> PathBuf) -> PathBuf {
    match configured {
        Some(path) if path.is_absolute() => path,
        Some(path) => workspace.join(path),
        None => default(),
    }
}
