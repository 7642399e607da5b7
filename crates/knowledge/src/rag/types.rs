//! Conversation and answer types.

use crate::extract::FileOutcome;
use crate::types::SearchHit;
use serde::{Deserialize, Serialize};

/// What a session remembers between questions for follow-up handling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub last_query: String,
    /// Knowledge-base text retrieved for `last_query`, bounded in length.
    pub last_context: String,
}

/// Output of context assembly for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// Labelled context block handed to the answer generator; may be empty.
    pub context: String,
    /// Query actually sent to the vector index.
    pub retrieval_query: String,
    /// Whether the question was treated as a follow-up.
    pub continuation: bool,
    /// Fresh hits for this question, best first.
    pub hits: Vec<SearchHit>,
    /// Turn state to keep if the answer succeeds.
    pub next_turn: ConversationTurn,
}

/// Where a piece of retrieved context came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// File name the text was extracted from
    pub source: String,

    /// Human-readable location, e.g. "row 4" or "sheet Orders, row 2"
    pub location: String,

    /// Short excerpt of the retrieved text
    pub snippet: String,
}

/// Lifecycle of a chat session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Retrieving,
    Generating,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Retrieving => "retrieving",
            Self::Generating => "generating",
        }
    }
}

/// Result of one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    /// Generator output, unchanged
    pub answer: String,

    pub retrieval_query: String,
    pub continuation: bool,

    /// Per-file extraction results for this turn's uploads
    pub upload_outcomes: Vec<FileOutcome>,

    /// Length of the context block in characters
    pub context_chars: usize,

    pub sources: Vec<SourceRef>,
}
