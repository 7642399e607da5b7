//! Loading prompt definitions from `<state dir>/prompts/<id>.yml`.

use crate::types::{PromptDefinition, CHAT_PROMPT_ID};
use docchat_core::{AppError, AppResult};
use std::path::Path;

const PROMPTS_DIR: &str = "prompts";

/// Load a prompt definition by id.
///
/// Fails when the file is missing, unreadable or invalid.
pub fn load_prompt(state_dir: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = state_dir
        .join(PROMPTS_DIR)
        .join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// The chat prompt: a workspace override when one exists, else the built-in.
///
/// An override that exists but is invalid is an error rather than a silent
/// fallback.
pub fn load_chat_prompt(state_dir: &Path) -> AppResult<PromptDefinition> {
    let override_file = state_dir
        .join(PROMPTS_DIR)
        .join(format!("{}.yml", CHAT_PROMPT_ID));

    if override_file.exists() {
        load_prompt(state_dir, CHAT_PROMPT_ID)
    } else {
        Ok(PromptDefinition::builtin_chat())
    }
}

fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_prompt(dir: &Path, id: &str, body: &str) {
        let prompts_dir = dir.join(PROMPTS_DIR);
        fs::create_dir_all(&prompts_dir).unwrap();
        fs::write(prompts_dir.join(format!("{}.yml", id)), body).unwrap();
    }

    fn valid_body(id: &str) -> String {
        format!(
            "id: {}\ntitle: Test\napiVersion: \"1.0\"\ntemplate: \"Q: {{{{question}}}}\"\n",
            id
        )
    }

    #[test]
    fn test_load_valid_prompt() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "test.prompt", &valid_body("test.prompt"));

        let prompt = load_prompt(temp_dir.path(), "test.prompt").unwrap();
        assert_eq!(prompt.id, "test.prompt");
        assert_eq!(prompt.template, "Q: {{question}}");
    }

    #[test]
    fn test_load_nonexistent_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_invalid_api_version() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            "bad",
            "id: bad\ntitle: Bad\napiVersion: \"1\"\ntemplate: x\n",
        );
        assert!(load_prompt(temp_dir.path(), "bad").is_err());
    }

    #[test]
    fn test_chat_prompt_falls_back_to_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let def = load_chat_prompt(temp_dir.path()).unwrap();
        assert_eq!(def, PromptDefinition::builtin_chat());

        write_prompt(temp_dir.path(), CHAT_PROMPT_ID, &valid_body(CHAT_PROMPT_ID));
        let def = load_chat_prompt(temp_dir.path()).unwrap();
        assert_eq!(def.template, "Q: {{question}}");
    }
}
