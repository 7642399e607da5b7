//! Command handlers for the docchat CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod chat;
pub mod index;
pub mod ingest;
pub mod search;

pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use index::IndexCommand;
pub use ingest::IngestCommand;
pub use search::SearchCommand;

use tokio_util::sync::CancellationToken;

/// A token cancelled when the user presses Ctrl-C.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}
