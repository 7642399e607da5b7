//! Logging setup.
//!
//! Everything goes to stderr so stdout stays free for command output
//! (answers, `--json` payloads).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppError, AppResult};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Initialize the global tracing subscriber.
///
/// `log_level` accepts any `EnvFilter` directive (`debug`,
/// `docchat_knowledge=trace,info`). When absent, `RUST_LOG` is used, then
/// `info`.
///
/// # Example
/// ```no_run
/// use docchat_core::logging::{init_logging, LogFormat};
///
/// init_logging(Some("debug"), false, LogFormat::Pretty).expect("logging");
/// ```
pub fn init_logging(log_level: Option<&str>, no_color: bool, format: LogFormat) -> AppResult<()> {
    let default_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_str = log_level.unwrap_or(&default_level);

    let env_filter = EnvFilter::try_new(filter_str)
        .map_err(|e| AppError::Config(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(!no_color && supports_color()),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true),
            )
            .try_init(),
    };

    result.map_err(|e| AppError::Config(format!("Failed to init logging: {}", e)))
}

fn supports_color() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}
