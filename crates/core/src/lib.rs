//! docchat core library
//!
//! Shared foundations for the other crates:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging setup
//! - Configuration loading

pub mod config;
pub mod error;
pub mod logging;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
