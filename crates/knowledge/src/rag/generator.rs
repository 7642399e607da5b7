//! Answer generation over an LLM client.

use docchat_core::config::LlmSettings;
use docchat_core::{AppConfig, AppResult};
use docchat_llm::{create_client, ChatMessage, LlmClient, LlmRequest};
use docchat_prompt::{build_chat_prompt, load_chat_prompt, PromptDefinition};
use std::sync::Arc;

/// Turns assembled context, recent history and the question into an answer.
#[async_trait::async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn complete(
        &self,
        context: &str,
        history: &[ChatMessage],
        question: &str,
    ) -> AppResult<String>;
}

/// Renders the chat prompt and sends it to an [`LlmClient`].
pub struct LlmAnswerGenerator {
    client: Arc<dyn LlmClient>,
    prompt: PromptDefinition,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmAnswerGenerator {
    pub fn new(client: Arc<dyn LlmClient>, prompt: PromptDefinition, settings: &LlmSettings) -> Self {
        Self {
            client,
            prompt,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    /// Client from the `llm` section, prompt from the state directory.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let client = create_client(&config.llm)?;
        let prompt = load_chat_prompt(&config.state_dir())?;
        Ok(Self::new(client, prompt, &config.llm))
    }
}

#[async_trait::async_trait]
impl AnswerGenerator for LlmAnswerGenerator {
    async fn complete(
        &self,
        context: &str,
        history: &[ChatMessage],
        question: &str,
    ) -> AppResult<String> {
        let built = build_chat_prompt(&self.prompt, context, history, question)?;

        let mut request = LlmRequest::new(built.user, &self.model)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        tracing::debug!(
            "Generating answer with {} (model: {}, history: {})",
            self.client.provider_name(),
            self.model,
            history.len()
        );

        let response = self.client.complete(&request).await?;
        Ok(response.content)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use docchat_llm::{LlmResponse, LlmUsage};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        requests: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmClient for RecordingClient {
        fn provider_name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(LlmResponse {
                content: "  FBO is fulfilled by operator.\n".to_string(),
                model: request.model.clone(),
                usage: LlmUsage::new(10, 5),
            })
        }
    }

    #[tokio::test]
    async fn test_generator_renders_prompt_and_returns_content() {
        let client = Arc::new(RecordingClient::default());
        let generator = LlmAnswerGenerator::new(
            client.clone(),
            PromptDefinition::builtin_chat(),
            &LlmSettings::default(),
        );

        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let answer = generator
            .complete("### Information from knowledge base:\nFBO ...", &history, "What is FBO?")
            .await
            .unwrap();

        assert_eq!(answer, "  FBO is fulfilled by operator.\n");

        let requests = client.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.model, "llama3.2");
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(2000));
        assert!(request.system.is_some());
        assert!(request.prompt.contains("FBO ..."));
        assert!(request.prompt.contains("assistant: hello"));
        assert!(request.prompt.contains("Question: What is FBO?"));
    }
}
