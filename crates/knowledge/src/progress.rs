//! Structured progress reporting for ingestion.
//!
//! Emits one event per step so the CLI can show incremental feedback while
//! files are read, chunked, embedded and indexed.

use std::sync::Arc;
use std::time::Instant;

/// Progress event emitted during ingestion.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Phase of the operation: "discover", "extract", "chunk", "embed", "index"
    pub phase: String,

    /// Current progress (files processed, chunks created, etc.)
    pub current: u64,

    /// Total expected work (if known)
    pub total: Option<u64>,

    /// Percentage complete (0.0 - 100.0)
    pub percentage: Option<f64>,

    /// Human-readable message
    pub message: String,

    /// Elapsed time since the reporter was created
    pub elapsed_secs: Option<f64>,
}

impl ProgressEvent {
    pub fn new(
        phase: impl Into<String>,
        current: u64,
        total: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        let percentage =
            total.map(|t| if t > 0 { (current as f64 / t as f64) * 100.0 } else { 0.0 });

        Self {
            phase: phase.into(),
            current,
            total,
            percentage,
            message: message.into(),
            elapsed_secs: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed_secs: f64) -> Self {
        self.elapsed_secs = Some(elapsed_secs);
        self
    }

    /// Format as a simple user-facing line.
    pub fn format_simple(&self) -> String {
        let progress = match self.total {
            Some(total) => format!("{}/{}", self.current, total),
            None => self.current.to_string(),
        };

        let pct = match self.percentage {
            Some(p) => format!(" ({:.0}%)", p),
            None => String::new(),
        };

        format!("[{}] {}{} - {}", self.phase, progress, pct, self.message)
    }
}

/// Callback for progress events.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Progress reporter that emits events through a callback.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            start_time: Instant::now(),
        }
    }

    /// A reporter that emits nothing.
    pub fn noop() -> Self {
        Self {
            callback: None,
            start_time: Instant::now(),
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        let Some(callback) = &self.callback else {
            return;
        };

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let event = event.with_elapsed(elapsed);

        tracing::debug!(
            phase = %event.phase,
            current = event.current,
            total = ?event.total,
            message = %event.message,
            elapsed_secs = elapsed,
            "Progress event"
        );

        callback(event);
    }

    pub fn discover(&self, files: u64) {
        self.emit(ProgressEvent::new(
            "discover",
            files,
            None,
            format!("{} supported files found", files),
        ));
    }

    pub fn extract(&self, current: u64, total: u64, file: &str) {
        self.emit(ProgressEvent::new(
            "extract",
            current,
            Some(total),
            format!("reading {}", file),
        ));
    }

    pub fn chunk(&self, units: u64, chunks: u64) {
        self.emit(ProgressEvent::new(
            "chunk",
            chunks,
            None,
            format!("{} chunks from {} units", chunks, units),
        ));
    }

    pub fn embed(&self, chunks: u64) {
        self.emit(ProgressEvent::new(
            "embed",
            0,
            Some(chunks),
            format!("embedding {} chunks", chunks),
        ));
    }

    pub fn index(&self, added: u64, submitted: u64) {
        self.emit(ProgressEvent::new(
            "index",
            added,
            Some(submitted),
            "records written",
        ));
    }
}
