//! Prompt rendering.

use crate::types::{BuiltPrompt, PromptDefinition};
use docchat_core::{AppError, AppResult};
use docchat_llm::ChatMessage;
use handlebars::Handlebars;
use serde_json::json;

/// Render the chat prompt for one turn.
///
/// # Example
/// ```
/// use docchat_prompt::{build_chat_prompt, PromptDefinition};
///
/// let def = PromptDefinition::builtin_chat();
/// let built = build_chat_prompt(&def, "FBO is ...", &[], "What is FBO?").unwrap();
/// assert!(built.user.contains("Question: What is FBO?"));
/// ```
pub fn build_chat_prompt(
    definition: &PromptDefinition,
    context: &str,
    history: &[ChatMessage],
    question: &str,
) -> AppResult<BuiltPrompt> {
    tracing::debug!(
        prompt = %definition.id,
        history = history.len(),
        context_len = context.len(),
        "Building chat prompt"
    );

    let history_values: Vec<_> = history
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let variables = json!({
        "context": context,
        "history": history_values,
        "question": question,
    });

    let handlebars = renderer();
    let user = render(&handlebars, &definition.template, &variables)?;
    let system = definition
        .system
        .as_deref()
        .map(|template| render(&handlebars, template, &variables))
        .transpose()?;

    Ok(BuiltPrompt {
        system,
        user,
        source_prompt_id: definition.id.clone(),
        history_len: history.len(),
        has_context: !context.trim().is_empty(),
    })
}

fn renderer() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    // Plain text, not HTML.
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
}

fn render(
    handlebars: &Handlebars<'static>,
    template: &str,
    variables: &serde_json::Value,
) -> AppResult<String> {
    handlebars
        .render_template(template, variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
