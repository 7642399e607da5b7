//! Error types for docchat.
//!
//! A single enum covers configuration, I/O, provider, pipeline and
//! persistence failures. The pipeline variants are distinct so that retry
//! and logging decisions can branch on the kind, while `user_message`
//! collapses them into the coarse text shown at the API boundary.

use thiserror::Error;

/// Unified error type for docchat.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Knowledge pipeline errors that have no dedicated kind
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// File extension is not one of the supported formats
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// File of a known type whose bytes cannot be parsed
    #[error("Corrupt input: {0}")]
    CorruptInput(String),

    /// A provider signalled rate limiting for a single call
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Rate limiting persisted after every retry
    #[error("Rate limit exhausted after {attempts} attempts: {message}")]
    RateLimitExhausted { attempts: u32, message: String },

    /// Any other provider failure
    #[error("Provider error: {0}")]
    TransientProvider(String),

    /// Index state is valid in memory but could not be written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Persisted index exists but cannot be decoded
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Coarse failure text for end users.
    ///
    /// Internal kinds stay visible in logs; callers outside the core only
    /// learn which stage failed.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::UnsupportedFormat(_) => "unsupported file type",
            AppError::CorruptInput(_) => "file could not be read",
            AppError::RateLimited(_)
            | AppError::RateLimitExhausted { .. }
            | AppError::TransientProvider(_) => "embedding failed",
            AppError::Llm(_) | AppError::Prompt(_) => "answer generation failed",
            AppError::Persistence(_) | AppError::CorruptIndex(_) => "index storage failed",
            AppError::Cancelled => "request cancelled",
            _ => "internal error",
        }
    }

    /// Whether the error came from a provider asking us to slow down.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited(_) | AppError::RateLimitExhausted { .. }
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
