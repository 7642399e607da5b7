//! Conversation history storage.
//!
//! The store owns a session's message history; the chat orchestrator only
//! appends to it. `JsonHistoryStore` keeps one conversation file per session
//! under `.docchat/sessions/`.

use chrono::{DateTime, Utc};
use docchat_core::{AppError, AppResult};
use docchat_llm::{ChatMessage, ChatRole};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const TITLE_MAX_CHARS: usize = 60;
const STEM_PREFIX_CHARS: usize = 40;
const STEM_HASH_BYTES: usize = 6;

/// Persisted conversation for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: "New conversation".to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append messages; the first user message names the conversation.
    pub fn push(&mut self, messages: &[ChatMessage]) {
        if !self.messages.iter().any(|m| m.role == ChatRole::User) {
            if let Some(first) = messages.iter().find(|m| m.role == ChatRole::User) {
                self.title = title_from(&first.content);
            }
        }
        self.messages.extend_from_slice(messages);
        self.updated_at = Utc::now();
    }
}

fn title_from(content: &str) -> String {
    let content = content.trim();
    if content.chars().count() > TITLE_MAX_CHARS {
        let cut: String = content.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", cut)
    } else {
        content.to_string()
    }
}

/// Where session histories live.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// All messages of a session, oldest first; empty for an unknown session.
    async fn read(&self, session_key: &str) -> AppResult<Vec<ChatMessage>>;

    /// Append messages to a session, creating it when needed.
    async fn append(&self, session_key: &str, messages: &[ChatMessage]) -> AppResult<()>;
}

/// Process-local history.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    conversations: Mutex<HashMap<String, Conversation>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn conversation(&self, session_key: &str) -> Option<Conversation> {
        self.conversations.lock().await.get(session_key).cloned()
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn read(&self, session_key: &str) -> AppResult<Vec<ChatMessage>> {
        Ok(self
            .conversations
            .lock()
            .await
            .get(session_key)
            .map(|c| c.messages.clone())
            .unwrap_or_default())
    }

    async fn append(&self, session_key: &str, messages: &[ChatMessage]) -> AppResult<()> {
        self.conversations
            .lock()
            .await
            .entry(session_key.to_string())
            .or_insert_with(|| Conversation::new(session_key))
            .push(messages);
        Ok(())
    }
}

/// One JSON conversation file per session, replaced atomically on write.
#[derive(Debug)]
pub struct JsonHistoryStore {
    dir: PathBuf,
    write_gate: Mutex<()>,
}

impl JsonHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_gate: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get path to the conversation file of a session.
    pub fn session_path(&self, session_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(session_key)))
    }

    /// The stored conversation, if the session has one.
    pub async fn conversation(&self, session_key: &str) -> AppResult<Option<Conversation>> {
        let path = self.session_path(session_key);
        let key = session_key.to_string();
        tokio::task::spawn_blocking(move || read_session(&path, &key))
            .await
            .map_err(|e| AppError::Persistence(format!("history read task failed: {}", e)))?
    }

    /// Session keys with a conversation file, as recorded in each file.
    pub fn list_sessions(&self) -> AppResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match read_conversation(&path) {
                Ok(Some(conversation)) => sessions.push(conversation.id),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping unreadable conversation: {}", e),
            }
        }
        sessions.sort();
        Ok(sessions)
    }
}

#[async_trait::async_trait]
impl HistoryStore for JsonHistoryStore {
    async fn read(&self, session_key: &str) -> AppResult<Vec<ChatMessage>> {
        Ok(self
            .conversation(session_key)
            .await?
            .map(|c| c.messages)
            .unwrap_or_default())
    }

    async fn append(&self, session_key: &str, messages: &[ChatMessage]) -> AppResult<()> {
        let _gate = self.write_gate.lock().await;

        let path = self.session_path(session_key);
        let key = session_key.to_string();
        let messages = messages.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut conversation =
                read_session(&path, &key)?.unwrap_or_else(|| Conversation::new(key));
            conversation.push(&messages);
            write_conversation(&path, &conversation)
        })
        .await
        .map_err(|e| AppError::Persistence(format!("history write task failed: {}", e)))?
    }
}

/// Session keys become file names: a readable prefix (anything but
/// alphanumerics, `-` and `_` replaced) followed by a hash of the raw key, so
/// distinct keys never share a file.
fn file_stem(session_key: &str) -> String {
    let prefix: String = session_key
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(STEM_PREFIX_CHARS)
        .collect();
    let prefix = if prefix.trim_matches('_').is_empty() {
        "session"
    } else {
        prefix.as_str()
    };

    let digest = Sha256::digest(session_key.as_bytes());
    let suffix: String = digest[..STEM_HASH_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("{}-{}", prefix, suffix)
}

fn read_conversation(path: &Path) -> AppResult<Option<Conversation>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::Persistence(format!("Failed to read conversation {:?}: {}", path, e))
    })?;
    let conversation = serde_json::from_str(&content).map_err(|e| {
        AppError::Persistence(format!("Failed to parse conversation {:?}: {}", path, e))
    })?;
    Ok(Some(conversation))
}

/// The conversation at `path`, which must belong to `session_key`.
fn read_session(path: &Path, session_key: &str) -> AppResult<Option<Conversation>> {
    match read_conversation(path)? {
        Some(conversation) if conversation.id != session_key => Err(AppError::Persistence(
            format!(
                "Conversation {:?} belongs to session '{}', not '{}'",
                path, conversation.id, session_key
            ),
        )),
        found => Ok(found),
    }
}

fn write_conversation(path: &Path, conversation: &Conversation) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::Persistence(format!("Failed to create sessions directory: {}", e))
        })?;
    }

    let json = serde_json::to_string_pretty(conversation)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| {
        AppError::Persistence(format!("Failed to write conversation {:?}: {}", tmp, e))
    })?;
    std::fs::rename(&tmp, path).map_err(|e| {
        AppError::Persistence(format!("Failed to replace conversation {:?}: {}", path, e))
    })?;

    tracing::debug!(
        "Saved conversation {} ({} messages)",
        conversation.id,
        conversation.messages.len()
    );
    Ok(())
}
