//! Prompt definition types.

use serde::{Deserialize, Serialize};

/// Identifier of the prompt used for chat answers.
pub const CHAT_PROMPT_ID: &str = "chat.default";

const DEFAULT_SYSTEM: &str = "You are a helpful assistant that answers questions using the \
provided document context and the chat history. Answer in the language of the question. \
If the context does not contain the answer, say so plainly instead of guessing. When the \
user refers back to an earlier answer (for example \"that\", \"this\", \"continue\" or \
\"more detail\"), expand on it using the chat history.";

const DEFAULT_TEMPLATE: &str = "{{#if context}}Context:\n{{context}}\n\n{{/if}}\
{{#if history}}Chat history:{{#each history}}\n{{role}}: {{content}}{{/each}}\n\n{{/if}}\
Question: {{question}}\nAnswer:";

/// A prompt definition, loaded from YAML or built in.
///
/// Templates see three variables: `context` (string), `history` (list of
/// `{role, content}`) and `question` (string).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// Schema version, `x.y`
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Tone/style hints, informational only
    #[serde(default)]
    pub behavior: PromptBehavior,

    /// System message template
    #[serde(default)]
    pub system: Option<String>,

    /// User message template
    pub template: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptBehavior {
    #[serde(default)]
    pub tone: String,

    #[serde(default)]
    pub style: String,
}

impl PromptDefinition {
    /// The built-in chat prompt.
    pub fn builtin_chat() -> Self {
        Self {
            id: CHAT_PROMPT_ID.to_string(),
            title: "Document chat".to_string(),
            api_version: "1.0".to_string(),
            behavior: PromptBehavior {
                tone: "helpful".to_string(),
                style: "grounded".to_string(),
            },
            system: Some(DEFAULT_SYSTEM.to_string()),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// A rendered prompt ready for an LLM request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    pub system: Option<String>,
    pub user: String,
    pub source_prompt_id: String,

    /// Number of history messages rendered into the prompt
    pub history_len: usize,

    /// Whether any context block was supplied
    pub has_context: bool,
}
