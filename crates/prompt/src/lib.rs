//! Prompt templates for docchat.
//!
//! - YAML prompt definitions under `.docchat/prompts/`
//! - a built-in chat prompt used when no override exists
//! - Handlebars rendering of `{context, history, question}`

pub mod builder;
pub mod loader;
pub mod types;

pub use builder::build_chat_prompt;
pub use loader::{load_chat_prompt, load_prompt};
pub use types::{BuiltPrompt, PromptBehavior, PromptDefinition, CHAT_PROMPT_ID};
