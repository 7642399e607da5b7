//! Search command handler.

use clap::Args;
use docchat_core::{AppConfig, AppResult};
use docchat_knowledge::{open_index, VectorStore};
use serde_json::json;

/// Show the indexed chunks most similar to a query
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of chunks to retrieve (default: chat.topK)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command");

        let index = open_index(config).await?;
        let k = self.top_k.unwrap_or(config.chat.top_k);
        let hits = index.search(&self.query, k).await?;

        if self.json {
            let output: Vec<_> = hits
                .iter()
                .map(|hit| {
                    json!({
                        "score": hit.score,
                        "text": hit.chunk.text,
                        "metadata": hit.chunk.metadata,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        if hits.is_empty() {
            println!("No results (index has {} records)", index.stats().await.records);
            return Ok(());
        }

        for (rank, hit) in hits.iter().enumerate() {
            println!(
                "{}. [{:.3}] {}",
                rank + 1,
                hit.score,
                hit.chunk.unit_id().unwrap_or("?")
            );
            println!("   {}", hit.chunk.text.replace('\n', " "));
        }

        Ok(())
    }
}
