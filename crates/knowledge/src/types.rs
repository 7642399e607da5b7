//! Core data types for the retrieval pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata attached to units and chunks.
pub type Metadata = Map<String, Value>;

/// One normalized piece of extracted text plus its metadata.
///
/// Every unit produced by the extractor carries `source_filename`,
/// `file_type` and `unit_id` in its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentUnit {
    pub text: String,
    pub metadata: Metadata,
}

/// The atomic unit stored in the vector index: a whole document unit or one
/// slice of it.
pub type Chunk = DocumentUnit;

impl DocumentUnit {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// True when the text has no visible content.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// String metadata value, if present.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn source_filename(&self) -> Option<&str> {
        self.meta_str("source_filename")
    }

    pub fn unit_id(&self) -> Option<&str> {
        self.meta_str("unit_id")
    }
}

/// A search result: the stored chunk and its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Round to two decimals, the precision used for ratios in metadata.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
