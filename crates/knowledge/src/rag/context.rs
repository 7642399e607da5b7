//! Context assembly: uploaded text, retrieval and follow-up carry-over.

use crate::rag::types::{AssembledContext, ConversationTurn};
use crate::types::DocumentUnit;
use crate::vector_index::VectorStore;
use docchat_core::config::ChatSettings;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

/// Words and phrases that mark a question as a follow-up.
pub const DEFAULT_CONTINUATION_MARKERS: &[&str] = &[
    "that", "this", "continue", "more", "detail", "details", "elaborate", "đó", "này", "tiếp tục",
    "thêm", "nữa",
];

const FILE_LABEL: &str = "### Information from newly uploaded files:";
const KNOWLEDGE_LABEL: &str = "### Information from knowledge base:";
const FRESH_SEPARATOR: &str = "--- Newly retrieved context ---";

#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    pub top_k: usize,
    /// Bound on the retrieval text carried to the next turn.
    pub max_carry_chars: usize,
    pub markers: Vec<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self::from(&ChatSettings::default())
    }
}

impl From<&ChatSettings> for ContextConfig {
    fn from(settings: &ChatSettings) -> Self {
        let markers = match &settings.continuation_markers {
            Some(markers) => markers.clone(),
            None => DEFAULT_CONTINUATION_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        };
        Self {
            top_k: settings.top_k,
            max_carry_chars: settings.max_carry_chars,
            markers,
        }
    }
}

/// Builds the context block for a question from uploads and the index.
pub struct ContextAssembler {
    store: Arc<dyn VectorStore>,
    config: ContextConfig,
    /// Markers split into lower-cased words.
    marker_words: Vec<Vec<String>>,
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn VectorStore>, config: ContextConfig) -> Self {
        let marker_words = config
            .markers
            .iter()
            .map(|m| words(m))
            .filter(|w| !w.is_empty())
            .collect();
        Self {
            store,
            config,
            marker_words,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// True when the question contains a continuation marker as whole words.
    pub fn is_continuation(&self, question: &str) -> bool {
        let question = words(question);
        self.marker_words.iter().any(|marker| {
            question
                .windows(marker.len())
                .any(|window| window == marker.as_slice())
        })
    }

    /// Assemble the context for `question`.
    ///
    /// Never fails: a retrieval error leaves the knowledge-base part empty.
    pub async fn build_context(
        &self,
        question: &str,
        uploaded: &[DocumentUnit],
        prior: Option<&ConversationTurn>,
    ) -> AssembledContext {
        let file_context = uploaded
            .iter()
            .filter(|unit| !unit.is_blank())
            .map(|unit| unit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let continuation = self.is_continuation(question);
        let retrieval_query = match prior {
            Some(turn) if continuation && !turn.last_query.trim().is_empty() => {
                format!("{} {}", turn.last_query, question)
            }
            _ => question.to_string(),
        };

        let hits = match self.store.search(&retrieval_query, self.config.top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("Retrieval failed, continuing without knowledge base: {}", e);
                Vec::new()
            }
        };
        let fresh = hits
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let carried = prior
            .map(|turn| turn.last_context.as_str())
            .filter(|context| continuation && !context.is_empty());
        let vector_context = match carried {
            Some(last) if fresh.is_empty() => last.to_string(),
            Some(last) => format!("{}\n\n{}\n\n{}", last, FRESH_SEPARATOR, fresh),
            None => fresh.clone(),
        };

        let mut sections = Vec::new();
        if !file_context.is_empty() {
            sections.push(format!("{}\n{}", FILE_LABEL, file_context));
        }
        if !vector_context.is_empty() {
            sections.push(format!("{}\n{}", KNOWLEDGE_LABEL, vector_context));
        }
        let context = sections.join("\n\n");

        tracing::debug!(
            continuation,
            hits = hits.len(),
            file_chars = file_context.chars().count(),
            context_chars = context.chars().count(),
            "Assembled context"
        );

        AssembledContext {
            context,
            retrieval_query,
            continuation,
            next_turn: ConversationTurn {
                last_query: question.to_string(),
                last_context: take_chars(&vector_context, self.config.max_carry_chars),
            },
            hits,
        }
    }
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .unicode_words()
        .map(str::to_string)
        .collect()
}

fn take_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}


#[cfg(test)]
mod tests {
    use super::fakes::FixedStore;
    use super::*;
    use crate::types::Metadata;

    fn assembler(store: Arc<FixedStore>) -> ContextAssembler {
        ContextAssembler::new(store, ContextConfig::default())
    }

    fn upload(text: &str) -> DocumentUnit {
        DocumentUnit::new(text, Metadata::new())
    }

    fn turn(query: &str, context: &str) -> ConversationTurn {
        ConversationTurn {
            last_query: query.into(),
            last_context: context.into(),
        }
    }

    #[test]
    fn test_markers_match_whole_words() {
        let assembler = assembler(Arc::new(FixedStore::default()));

        assert!(assembler.is_continuation("Tell me MORE"));
        assert!(assembler.is_continuation("What about that?"));
        assert!(assembler.is_continuation("Giải thích thêm về quy trình"));
        assert!(assembler.is_continuation("tiếp tục đi"));
        assert!(!assembler.is_continuation("What is the thesis deadline?"));
        assert!(!assembler.is_continuation("Summarise the furthermore clause"));
        assert!(!assembler.is_continuation("tiếp nhận hàng"));
    }

    #[test]
    fn test_custom_markers_replace_defaults() {
        let settings = ChatSettings {
            continuation_markers: Some(vec!["go on".into()]),
            ..ChatSettings::default()
        };
        let assembler = ContextAssembler::new(
            Arc::new(FixedStore::default()),
            ContextConfig::from(&settings),
        );

        assert!(assembler.is_continuation("please go on"));
        assert!(!assembler.is_continuation("tell me more"));
    }

    #[tokio::test]
    async fn test_uploads_and_retrieval_are_labelled() {
        let store = Arc::new(FixedStore::with_texts(&["FBO means fulfilled by operator."]));
        let result = assembler(store.clone())
            .build_context(
                "What is FBO?",
                &[upload("uploaded one"), upload("  "), upload("uploaded two")],
                None,
            )
            .await;

        assert_eq!(
            result.context,
            "### Information from newly uploaded files:\nuploaded one\n\nuploaded two\n\n\
             ### Information from knowledge base:\nFBO means fulfilled by operator."
        );
        assert_eq!(result.retrieval_query, "What is FBO?");
        assert!(!result.continuation);
        assert_eq!(store.queries.lock().unwrap()[0], ("What is FBO?".to_string(), 5));
        assert_eq!(result.next_turn, turn("What is FBO?", "FBO means fulfilled by operator."));
    }

    #[tokio::test]
    async fn test_empty_everything_gives_empty_context() {
        let result = assembler(Arc::new(FixedStore::default()))
            .build_context("hello", &[], None)
            .await;

        assert_eq!(result.context, "");
        assert_eq!(result.next_turn, turn("hello", ""));
    }

    #[tokio::test]
    async fn test_follow_up_merges_prior_turn() {
        let store = Arc::new(FixedStore::with_texts(&["fresh a", "fresh b"]));
        let prior = turn("What is FBO?", "old context");

        let result = assembler(store.clone())
            .build_context("tell me more", &[], Some(&prior))
            .await;

        assert!(result.continuation);
        assert_eq!(result.retrieval_query, "What is FBO? tell me more");
        assert_eq!(
            result.context,
            "### Information from knowledge base:\nold context\n\n\
             --- Newly retrieved context ---\n\nfresh a\n\nfresh b"
        );
        assert_eq!(
            result.next_turn,
            turn(
                "tell me more",
                "old context\n\n--- Newly retrieved context ---\n\nfresh a\n\nfresh b"
            )
        );
    }

    #[tokio::test]
    async fn test_follow_up_with_nothing_fresh_keeps_prior_context() {
        let store = Arc::new(FixedStore::default());
        let prior = turn("What is FBO?", "old context");

        let result = assembler(store)
            .build_context("explain that", &[], Some(&prior))
            .await;

        assert_eq!(result.context, "### Information from knowledge base:\nold context");
        assert_eq!(result.next_turn.last_context, "old context");
    }

    #[tokio::test]
    async fn test_chained_follow_ups_keep_carried_context() {
        let first = assembler(Arc::new(FixedStore::with_texts(&["FBO means fulfilled by operator."])))
            .build_context("What is FBO?", &[], None)
            .await;

        let quiet = assembler(Arc::new(FixedStore::default()));
        let second = quiet
            .build_context("tell me more", &[], Some(&first.next_turn))
            .await;
        let third = quiet
            .build_context("continue with that", &[], Some(&second.next_turn))
            .await;

        assert!(second.context.contains("FBO means"));
        assert!(third.context.contains("FBO means"));
        assert_eq!(third.next_turn.last_context, "FBO means fulfilled by operator.");
    }

    #[tokio::test]
    async fn test_new_topic_ignores_prior_turn() {
        let store = Arc::new(FixedStore::with_texts(&["fresh"]));
        let prior = turn("What is FBO?", "old context");

        let result = assembler(store)
            .build_context("Who approves refunds?", &[], Some(&prior))
            .await;

        assert_eq!(result.retrieval_query, "Who approves refunds?");
        assert!(!result.context.contains("old context"));
    }

    #[tokio::test]
    async fn test_follow_up_without_prior_query_searches_question() {
        let store = Arc::new(FixedStore::with_texts(&["fresh"]));
        let result = assembler(store)
            .build_context("more", &[], Some(&turn("", "")))
            .await;

        assert!(result.continuation);
        assert_eq!(result.retrieval_query, "more");
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_not_fatal() {
        let result = assembler(Arc::new(FixedStore::failing()))
            .build_context("What is FBO?", &[upload("from file")], None)
            .await;

        assert_eq!(
            result.context,
            "### Information from newly uploaded files:\nfrom file"
        );
        assert!(result.hits.is_empty());
    }

    #[tokio::test]
    async fn test_carried_context_is_bounded() {
        let long = "đ".repeat(50);
        let store = Arc::new(FixedStore::with_texts(&[long.as_str()]));
        let config = ContextConfig {
            max_carry_chars: 10,
            ..ContextConfig::default()
        };

        let result = ContextAssembler::new(store, config)
            .build_context("q", &[], None)
            .await;

        assert_eq!(result.next_turn.last_context, "đ".repeat(10));
    }
}
