//! docchat CLI
//!
//! Main entry point for the docchat command-line tool: ingest documents into
//! a local vector index and chat with them.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, IndexCommand, IngestCommand, SearchCommand};
use docchat_core::logging::{self, LogFormat};
use docchat_core::{AppConfig, AppResult};
use std::path::PathBuf;
use tracing::Instrument;

/// docchat - chat with your documents using local retrieval
#[derive(Parser, Debug)]
#[command(name = "docchat")]
#[command(about = "Chat with DOCX, XLSX, CSV and TXT documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "DOCCHAT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "DOCCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// LLM provider
    #[arg(short, long, global = true)]
    provider: Option<String>,

    /// LLM model identifier
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract, chunk and index documents
    Ingest(IngestCommand),

    /// Show the indexed chunks most similar to a query
    Search(SearchCommand),

    /// Ask one question
    Ask(AskCommand),

    /// Interactive chat session
    Chat(ChatCommand),

    /// Inspect or save the vector index
    Index(IndexCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(cli.workspace, cli.config)?.with_overrides(
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    if cli.log_json {
        config.log_json = true;
    }

    let format = if config.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init_logging(config.log_level.as_deref(), config.no_color, format)?;

    tracing::info!("docchat starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("LLM: {} / {}", config.llm.provider, config.llm.model);
    tracing::debug!(
        "Embeddings: {} / {}",
        config.embedding.provider,
        config.embedding.model
    );

    config.validate()?;
    config.ensure_state_dir()?;

    let command_name = match &cli.command {
        Commands::Ingest(_) => "ingest",
        Commands::Search(_) => "search",
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Index(_) => "index",
    };
    let result = async {
        match cli.command {
            Commands::Ingest(cmd) => cmd.execute(&config).await,
            Commands::Search(cmd) => cmd.execute(&config).await,
            Commands::Ask(cmd) => cmd.execute(&config).await,
            Commands::Chat(cmd) => cmd.execute(&config).await,
            Commands::Index(cmd) => cmd.execute(&config).await,
        }
    }
    .instrument(tracing::info_span!("command", name = command_name))
    .await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
