//! Interactive chat command.

use super::ask::print_answer;
use clap::Args;
use docchat_core::{AppConfig, AppResult};
use docchat_knowledge::{open_chat, open_index};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive chat session
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Session whose history and follow-up state to use
    #[arg(short, long, default_value = "default")]
    pub session: String,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Starting chat session '{}'", self.session);

        let index = open_index(config).await?;
        let chat = open_chat(config, index)?;

        println!("Chatting in session '{}'. Type /reset to forget context, exit to quit.", self.session);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let question = line.trim();

            match question {
                "" => continue,
                "exit" | "quit" => break,
                "/reset" => {
                    chat.reset(&self.session).await;
                    println!("Context cleared.");
                }
                _ => match chat.answer(&self.session, question, &[]).await {
                    Ok(answer) => {
                        print_answer(&answer);
                        println!();
                    }
                    Err(e) => {
                        tracing::warn!("Turn failed: {}", e);
                        eprintln!("Error: {}", e.user_message());
                    }
                },
            }
        }

        Ok(())
    }
}
