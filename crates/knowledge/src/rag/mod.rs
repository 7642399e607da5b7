//! Retrieval-augmented chat.
//!
//! [`ContextAssembler`] merges uploaded text with knowledge-base retrieval and
//! carries context across follow-up questions; [`ChatOrchestrator`] runs a
//! turn end to end and records history through a [`HistoryStore`].

pub mod chat;
pub mod context;
pub mod generator;
pub mod session;
pub mod sources;
pub mod types;

pub use chat::{ChatConfig, ChatOrchestrator};
pub use context::{ContextAssembler, ContextConfig, DEFAULT_CONTINUATION_MARKERS};
pub use generator::{AnswerGenerator, LlmAnswerGenerator};
pub use session::{Conversation, HistoryStore, JsonHistoryStore, MemoryHistoryStore};
pub use sources::map_hits_to_sources;
pub use types::{AssembledContext, ChatAnswer, ConversationTurn, SessionPhase, SourceRef};
