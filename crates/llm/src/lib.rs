//! LLM integration for docchat.
//!
//! Provider-agnostic chat completion behind the `LlmClient` trait, plus the
//! conversation message types shared with history storage.
//!
//! # Example
//! ```no_run
//! use docchat_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::with_base_url("http://localhost:11434");
//! let request = LlmRequest::new("Hello, world!", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::OllamaClient;
pub use types::{ChatMessage, ChatRole, ProviderType};
