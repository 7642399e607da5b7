//! Text extraction from uploaded documents.
//!
//! Each supported format yields a list of [`DocumentUnit`]s. DOCX and TXT
//! files produce a single unit, spreadsheets and CSV files one unit per data
//! row. Every unit carries `source_filename`, `file_type`, `file_size` and a
//! `unit_id` of the form `{filename}#{n}`.

mod delimited;
mod docx;
pub mod encoding;
mod ooxml;
mod text;
mod xlsx;

pub use delimited::{detect_delimiter, sanitize_headers};
pub use encoding::{decode_text, Decoded};
pub use text::{detect_language_hints, detect_text_format};

use crate::types::DocumentUnit;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use docchat_core::{AppError, AppResult};
use serde::Serialize;
use serde_json::json;
use std::path::Path;

/// Suffix appended to uploaded text cut at the size limit.
pub const TRUNCATION_SUFFIX: &str = "... [Content truncated]";

/// Supported input formats, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Docx,
    Xlsx,
    Csv,
    Txt,
}

impl FileFormat {
    /// Format from the (case-insensitive) extension of `filename`.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "docx" => Some(Self::Docx),
            "xlsx" => Some(Self::Xlsx),
            "csv" => Some(Self::Csv),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
            Self::Txt => "txt",
        }
    }
}

/// Caller hints for extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Encoding label to try first for CSV and TXT input.
    pub declared_encoding: Option<String>,
}

/// Extract document units from the bytes of one file.
pub fn extract(
    bytes: &[u8],
    filename: &str,
    options: &ExtractOptions,
) -> AppResult<Vec<DocumentUnit>> {
    let format = FileFormat::from_filename(filename).ok_or_else(|| {
        AppError::UnsupportedFormat(format!(
            "{} (supported: docx, xlsx, csv, txt)",
            filename
        ))
    })?;

    let declared = options.declared_encoding.as_deref();
    let units = match format {
        FileFormat::Docx => docx::extract_docx(bytes, filename)?,
        FileFormat::Xlsx => xlsx::extract_xlsx(bytes, filename)?,
        FileFormat::Csv => delimited::extract_csv(bytes, filename, declared)?,
        FileFormat::Txt => text::extract_txt(bytes, filename, declared)?,
    };

    let units: Vec<DocumentUnit> = units
        .into_iter()
        .filter(|unit| !unit.is_blank())
        .enumerate()
        .map(|(n, mut unit)| {
            unit.metadata
                .insert("source_filename".into(), json!(filename));
            unit.metadata.insert("file_type".into(), json!(format.as_str()));
            unit.metadata.insert("file_size".into(), json!(bytes.len()));
            unit.metadata
                .insert("unit_id".into(), json!(format!("{}#{}", filename, n)));
            unit
        })
        .collect();

    tracing::info!(
        "Extracted {} units from {} ({} bytes)",
        units.len(),
        filename,
        bytes.len()
    );

    Ok(units)
}

/// A file received at the upload boundary.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Build from a base64 payload, plain or as a `data:...;base64,` URL.
    pub fn from_base64(name: impl Into<String>, payload: &str) -> AppResult<Self> {
        let name = name.into();
        let payload = payload.trim();
        let encoded = match payload.strip_prefix("data:") {
            Some(rest) => rest
                .split_once(";base64,")
                .map(|(_, data)| data)
                .ok_or_else(|| {
                    AppError::CorruptInput(format!("{}: data URL is not base64", name))
                })?,
            None => payload,
        };

        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| AppError::CorruptInput(format!("{}: invalid base64: {}", name, e)))?;
        Ok(Self { name, bytes })
    }

    /// Read a file from disk, keeping only its file name.
    pub fn from_path(path: &Path) -> AppResult<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }
}

/// Result of extracting one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub filename: String,
    pub success: bool,
    pub unit_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Extracted text of a batch of uploads, one unit per readable file.
#[derive(Debug, Clone, Default)]
pub struct UploadBatch {
    pub units: Vec<DocumentUnit>,
    pub outcomes: Vec<FileOutcome>,
}

impl UploadBatch {
    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}

/// Extract every upload independently.
///
/// Each readable file contributes one unit holding its text, cut to
/// `max_chars` characters. A file that fails is reported in the outcomes and,
/// when `placeholders` is set, contributes an `[Unable to read ...]` unit.
pub async fn extract_uploads(
    files: &[UploadedFile],
    max_chars: usize,
    placeholders: bool,
) -> UploadBatch {
    let tasks = files.iter().cloned().map(|file| {
        tokio::task::spawn_blocking(move || {
            let result = extract(&file.bytes, &file.name, &ExtractOptions::default());
            (file.name, result)
        })
    });

    let mut batch = UploadBatch::default();
    for (index, joined) in futures::future::join_all(tasks).await.into_iter().enumerate() {
        let (name, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                let name = files[index].name.clone();
                (name, Err(AppError::Other(format!("extraction task failed: {}", e))))
            }
        };

        match result {
            Ok(units) => {
                let text = units
                    .iter()
                    .map(|u| u.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                batch.outcomes.push(FileOutcome {
                    filename: name.clone(),
                    success: true,
                    unit_count: units.len(),
                    error: None,
                });
                if !text.trim().is_empty() {
                    batch.units.push(upload_unit(&name, truncate_text(&text, max_chars)));
                }
            }
            Err(e) => {
                tracing::warn!("Failed to extract upload {}: {}", name, e);
                let reason = e.user_message();
                if placeholders {
                    batch.units.push(upload_unit(
                        &name,
                        format!("[Unable to read {}: {}]", name, reason),
                    ));
                }
                batch.outcomes.push(FileOutcome {
                    filename: name,
                    success: false,
                    unit_count: 0,
                    error: Some(reason.to_string()),
                });
            }
        }
    }

    batch
}

fn upload_unit(name: &str, text: String) -> DocumentUnit {
    let mut metadata = crate::types::Metadata::new();
    metadata.insert("source_filename".into(), json!(name));
    metadata.insert("unit_id".into(), json!(format!("{}#upload", name)));
    if let Some(format) = FileFormat::from_filename(name) {
        metadata.insert("file_type".into(), json!(format.as_str()));
    }
    DocumentUnit::new(text, metadata)
}

/// Cut `text` to `max_chars` characters, marking the cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}{}", &text[..byte_index], TRUNCATION_SUFFIX),
        None => text.to_string(),
    }
}
