//! Ask command handler.
//!
//! Runs a single chat turn, optionally with uploaded files as extra context.

use clap::Args;
use docchat_core::{AppConfig, AppResult};
use docchat_knowledge::rag::ChatAnswer;
use docchat_knowledge::{open_chat, open_index, UploadedFile};
use std::path::PathBuf;

/// Ask one question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Session whose history and follow-up state to use
    #[arg(short, long, default_value = "default")]
    pub session: String,

    /// Files to read for this question only (not indexed)
    #[arg(short, long)]
    pub file: Vec<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command (session '{}')", self.session);

        let uploads = self
            .file
            .iter()
            .map(|path| UploadedFile::from_path(path))
            .collect::<AppResult<Vec<_>>>()?;

        let index = open_index(config).await?;
        let chat = open_chat(config, index)?;
        let answer = chat.answer(&self.session, &self.question, &uploads).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&answer)?);
        } else {
            print_answer(&answer);
        }

        Ok(())
    }
}

/// Human-readable answer with upload problems and sources.
pub(crate) fn print_answer(answer: &ChatAnswer) {
    for outcome in answer.upload_outcomes.iter().filter(|o| !o.success) {
        eprintln!(
            "Could not read {}: {}",
            outcome.filename,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }

    println!("{}", answer.answer.trim());

    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            println!("- {} ({})", source.source, source.location);
        }
    }
}
