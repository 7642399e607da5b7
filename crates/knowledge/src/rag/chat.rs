//! Chat orchestration: one question in, one grounded answer out.

use crate::extract::{extract_uploads, UploadedFile};
use crate::rag::context::ContextAssembler;
use crate::rag::generator::AnswerGenerator;
use crate::rag::session::HistoryStore;
use crate::rag::sources::map_hits_to_sources;
use crate::rag::types::{ChatAnswer, ConversationTurn, SessionPhase};
use docchat_core::config::ChatSettings;
use docchat_core::AppResult;
use docchat_llm::ChatMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::Instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Most recent history messages given to the generator.
    pub history_window: usize,
    /// Characters kept from each uploaded file.
    pub max_upload_chars: usize,
    /// Put an `[Unable to read ...]` note in the context for failed uploads.
    pub upload_placeholders: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::from(&ChatSettings::default())
    }
}

impl From<&ChatSettings> for ChatConfig {
    fn from(settings: &ChatSettings) -> Self {
        Self {
            history_window: settings.history_window,
            max_upload_chars: settings.max_upload_chars,
            upload_placeholders: true,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    turn: Option<ConversationTurn>,
    /// History as read from the store, kept in step with our appends.
    history: Option<Vec<ChatMessage>>,
}

#[derive(Debug)]
struct Session {
    phase: watch::Sender<SessionPhase>,
    state: Mutex<SessionState>,
}

impl Session {
    fn new() -> Self {
        Self {
            phase: watch::channel(SessionPhase::Idle).0,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn set_phase(&self, key: &str, phase: SessionPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            tracing::debug!(session = %key, "Session phase {} -> {}", previous.as_str(), phase.as_str());
        }
    }
}

/// Runs chat turns against the index, the generator and a history store.
///
/// Turns of one session are serialised; different sessions run in parallel.
pub struct ChatOrchestrator {
    assembler: ContextAssembler,
    generator: Arc<dyn AnswerGenerator>,
    history: Arc<dyn HistoryStore>,
    config: ChatConfig,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl ChatOrchestrator {
    pub fn new(
        assembler: ContextAssembler,
        generator: Arc<dyn AnswerGenerator>,
        history: Arc<dyn HistoryStore>,
        config: ChatConfig,
    ) -> Self {
        Self {
            assembler,
            generator,
            history,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    async fn session(&self, key: &str) -> Arc<Session> {
        self.sessions
            .lock()
            .await
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Session::new()))
            .clone()
    }

    async fn existing_session(&self, key: &str) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(key).cloned()
    }

    /// Answer `question` for `session_key`, using any uploaded files as
    /// extra context.
    ///
    /// On failure nothing is recorded: history and the follow-up state are
    /// left as they were.
    pub async fn answer(
        &self,
        session_key: &str,
        question: &str,
        uploads: &[UploadedFile],
    ) -> AppResult<ChatAnswer> {
        let session = self.session(session_key).await;
        let mut state = session.state.lock().await;

        let result = self
            .run_turn(&session, &mut state, session_key, question, uploads)
            .instrument(tracing::info_span!("chat_turn", session = %session_key))
            .await;
        session.set_phase(session_key, SessionPhase::Idle);

        match &result {
            Ok(answer) => tracing::info!(
                session = %session_key,
                continuation = answer.continuation,
                context_chars = answer.context_chars,
                "Answered question"
            ),
            Err(e) => tracing::warn!(session = %session_key, "Chat turn failed: {}", e),
        }
        result
    }

    async fn run_turn(
        &self,
        session: &Session,
        state: &mut SessionState,
        session_key: &str,
        question: &str,
        uploads: &[UploadedFile],
    ) -> AppResult<ChatAnswer> {
        session.set_phase(session_key, SessionPhase::Retrieving);

        let batch = extract_uploads(
            uploads,
            self.config.max_upload_chars,
            self.config.upload_placeholders,
        )
        .await;
        let unreadable = batch.failed().count();
        if unreadable > 0 {
            tracing::info!("{} of {} uploads unreadable", unreadable, uploads.len());
        }
        let assembled = self
            .assembler
            .build_context(question, &batch.units, state.turn.as_ref())
            .await;

        if state.history.is_none() {
            state.history = Some(self.history.read(session_key).await?);
        }
        let history = state.history.as_deref().unwrap_or_default();
        let window = &history[history.len().saturating_sub(self.config.history_window)..];

        session.set_phase(session_key, SessionPhase::Generating);
        let answer = self
            .generator
            .complete(&assembled.context, window, question)
            .await?;

        let messages = [ChatMessage::user(question), ChatMessage::assistant(answer.clone())];
        if let Err(e) = self.history.append(session_key, &messages).await {
            tracing::warn!(session = %session_key, "Failed to store chat history: {}", e);
        }
        state
            .history
            .get_or_insert_with(Vec::new)
            .extend_from_slice(&messages);
        state.turn = Some(assembled.next_turn);

        Ok(ChatAnswer {
            answer,
            retrieval_query: assembled.retrieval_query,
            continuation: assembled.continuation,
            upload_outcomes: batch.outcomes,
            context_chars: assembled.context.chars().count(),
            sources: map_hits_to_sources(&assembled.hits),
        })
    }

    /// Full history of a session, from the store.
    pub async fn history(&self, session_key: &str) -> AppResult<Vec<ChatMessage>> {
        self.history.read(session_key).await
    }

    /// Current phase of a session; `Idle` for unknown sessions.
    pub async fn phase(&self, session_key: &str) -> SessionPhase {
        match self.sessions.lock().await.get(session_key) {
            Some(session) => *session.phase.borrow(),
            None => SessionPhase::Idle,
        }
    }

    /// The follow-up state a session will use for its next question.
    pub async fn turn(&self, session_key: &str) -> Option<ConversationTurn> {
        let session = self.existing_session(session_key).await?;
        let state = session.state.lock().await;
        state.turn.clone()
    }

    /// Forget the cached follow-up state and history of a session. Stored
    /// history is kept.
    pub async fn reset(&self, session_key: &str) {
        let Some(session) = self.existing_session(session_key).await else {
            return;
        };
        let mut state = session.state.lock().await;
        *state = SessionState::default();
        tracing::info!(session = %session_key, "Session reset");
    }
}
