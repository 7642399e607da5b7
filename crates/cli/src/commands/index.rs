//! Index command handler.

use clap::{Args, Subcommand};
use docchat_core::{AppConfig, AppResult};
use docchat_knowledge::{open_index, VectorStore};

/// Inspect or save the vector index
#[derive(Args, Debug)]
pub struct IndexCommand {
    #[command(subcommand)]
    pub action: IndexAction,
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Show index statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write any records storage has not seen yet
    Save,
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let index = open_index(config).await?;

        match &self.action {
            IndexAction::Stats { json } => {
                let stats = index.stats().await;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    println!("Vector index");
                    println!("  Status: {:?}", stats.status);
                    println!("  Records: {}", stats.records);
                    match stats.dimension {
                        Some(dimension) => println!("  Dimension: {}", dimension),
                        None => println!("  Dimension: (unset)"),
                    }
                    match &stats.path {
                        Some(path) => println!("  Storage: {}", path.display()),
                        None => println!("  Storage: in memory"),
                    }
                    println!(
                        "  Embeddings: {} / {}",
                        config.embedding.provider, config.embedding.model
                    );
                }
            }
            IndexAction::Save => {
                if index.save().await? {
                    println!("Index saved");
                } else {
                    println!("Nothing to save");
                }
            }
        }

        Ok(())
    }
}
