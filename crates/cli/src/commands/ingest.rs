//! Ingest command handler.

use super::cancel_on_ctrl_c;
use clap::Args;
use docchat_core::{AppConfig, AppError, AppResult};
use docchat_knowledge::{
    discover_files, ingest, open_index, ChunkConfig, ProgressReporter, VectorStore,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Extract, chunk and index documents
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Suppress progress lines
    #[arg(short, long)]
    pub quiet: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command for {} paths", self.paths.len());

        let files = discover_files(&self.paths)?;
        if files.is_empty() {
            return Err(AppError::Knowledge(
                "No supported files found (docx, xlsx, csv, txt)".to_string(),
            ));
        }

        let index = open_index(config).await?;
        let progress = if self.quiet || self.json {
            ProgressReporter::noop()
        } else {
            ProgressReporter::new(Arc::new(|event| eprintln!("{}", event.format_simple())))
        };

        let report = ingest(
            index.as_ref(),
            &files,
            &ChunkConfig::from(&config.chunking),
            &progress,
            &cancel_on_ctrl_c(),
        )
        .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        for file in &report.files {
            match &file.error {
                None => println!("  ok    {} ({} units)", file.filename, file.unit_count),
                Some(error) => println!("  fail  {}: {}", file.filename, error),
            }
        }
        println!(
            "Indexed {} of {} chunks from {} files in {:.2}s",
            report.added,
            report.chunks,
            report.files.len() - report.failed_files(),
            report.duration_secs
        );
        if !report.failed.is_empty() {
            println!("{} chunks could not be embedded:", report.failed.len());
            for failed in &report.failed {
                println!(
                    "  {}: {}",
                    failed.unit_id.as_deref().unwrap_or("?"),
                    failed.reason
                );
            }
        }
        if !report.persisted && index.stats().await.path.is_some() {
            println!("Warning: index changes were not saved");
        }

        Ok(())
    }
}
