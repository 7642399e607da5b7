//! Fixed-size character chunking of document units.

use crate::types::{Chunk, DocumentUnit};
use serde_json::json;
use sha2::{Digest, Sha256};

/// Chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Maximum chunk length in characters.
    pub max_size: usize,
    /// Characters shared by consecutive chunks. Clamped below `max_size`.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_size: 512,
            overlap: 0,
        }
    }
}

impl From<&docchat_core::config::ChunkingSettings> for ChunkConfig {
    fn from(settings: &docchat_core::config::ChunkingSettings) -> Self {
        Self {
            max_size: settings.max_size,
            overlap: settings.overlap,
        }
    }
}

/// Split a unit into contiguous slices of at most `max_size` characters.
///
/// A unit that already fits is returned unchanged. A `max_size` of 0 is
/// treated as 1.
pub fn chunk(unit: DocumentUnit, max_size: usize) -> Vec<Chunk> {
    chunk_with(
        unit,
        &ChunkConfig {
            max_size,
            overlap: 0,
        },
    )
}

/// Split a unit according to `config`.
pub fn chunk_with(unit: DocumentUnit, config: &ChunkConfig) -> Vec<Chunk> {
    let max_size = config.max_size.max(1);
    let overlap = config.overlap.min(max_size - 1);

    let chars: Vec<char> = unit.text.chars().collect();
    if chars.len() <= max_size {
        return vec![unit];
    }

    let step = max_size - overlap;
    let mut starts = Vec::new();
    let mut start = 0;
    loop {
        starts.push(start);
        if start + max_size >= chars.len() {
            break;
        }
        start += step;
    }

    let parent_id = unit.unit_id().map(str::to_string);
    let chunk_count = starts.len();

    let chunks: Vec<Chunk> = starts
        .into_iter()
        .enumerate()
        .map(|(index, start)| {
            let end = (start + max_size).min(chars.len());
            let text: String = chars[start..end].iter().collect();

            let mut metadata = unit.metadata.clone();
            metadata.insert("chunk_index".into(), json!(index));
            metadata.insert("chunk_of".into(), json!(parent_id));
            metadata.insert("chunk_count".into(), json!(chunk_count));
            metadata.insert("chunk_start".into(), json!(start));
            metadata.insert("is_chunked".into(), json!(true));
            metadata.insert("content_hash".into(), json!(content_hash(&text)));

            DocumentUnit::new(text, metadata)
        })
        .collect();

    tracing::debug!(
        "Chunked {} ({} chars) into {} chunks (size: {}, overlap: {})",
        parent_id.as_deref().unwrap_or("unit"),
        chars.len(),
        chunks.len(),
        max_size,
        overlap
    );

    chunks
}

/// Chunk every unit, keeping unit order. Every resulting chunk carries a
/// `content_hash`.
pub fn chunk_all(units: Vec<DocumentUnit>, config: &ChunkConfig) -> Vec<Chunk> {
    units
        .into_iter()
        .flat_map(|unit| chunk_with(unit, config))
        .map(|mut chunk| {
            if !chunk.metadata.contains_key("content_hash") {
                let hash = content_hash(&chunk.text);
                chunk.metadata.insert("content_hash".into(), json!(hash));
            }
            chunk
        })
        .collect()
}

/// SHA-256 of the text as lowercase hex.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;

    fn unit(text: &str) -> DocumentUnit {
        let mut metadata = Metadata::new();
        metadata.insert("unit_id".into(), json!("doc.txt#0"));
        metadata.insert("source_filename".into(), json!("doc.txt"));
        DocumentUnit::new(text, metadata)
    }

    #[test]
    fn test_short_unit_unchanged() {
        let original = unit("fits");
        let chunks = chunk(original.clone(), 4);
        assert_eq!(chunks, vec![original]);
    }

    #[test]
    fn test_split_reconstructs_text() {
        let text = "abcdefghij".repeat(25);
        let chunks = chunk(unit(&text), 100);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text.chars().count(), 50);
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);

        let meta = &chunks[1].metadata;
        assert_eq!(meta["chunk_index"], 1);
        assert_eq!(meta["chunk_of"], "doc.txt#0");
        assert_eq!(meta["chunk_count"], 3);
        assert_eq!(meta["chunk_start"], 100);
        assert_eq!(meta["is_chunked"], true);
        assert_eq!(meta["source_filename"], "doc.txt");
    }

    #[test]
    fn test_chunk_count_is_ceiling() {
        for (len, size, expected) in [(10, 3, 4), (9, 3, 3), (1, 1, 1), (7, 100, 1)] {
            let chunks = chunk(unit(&"x".repeat(len)), size);
            assert_eq!(chunks.len(), expected, "len {} size {}", len, size);
        }
    }

    #[test]
    fn test_multibyte_text() {
        let text = "Tiếng Việt có dấu";
        let chunks = chunk(unit(text), 5);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 5));
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_zero_size_treated_as_one() {
        let chunks = chunk(unit("abc"), 0);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_overlap() {
        let config = ChunkConfig {
            max_size: 4,
            overlap: 2,
        };
        let chunks = chunk_with(unit("abcdefgh"), &config);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "cdef", "efgh"]);
    }

    #[test]
    fn test_overlap_clamped() {
        let config = ChunkConfig {
            max_size: 3,
            overlap: 10,
        };
        let chunks = chunk_with(unit("abcde"), &config);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abc", "bcd", "cde"]);
    }

    #[test]
    fn test_chunk_all_hashes_every_chunk() {
        let chunks = chunk_all(vec![unit("short"), unit(&"y".repeat(10))], &ChunkConfig {
            max_size: 6,
            overlap: 0,
        });

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "short");
        assert_eq!(chunks[0].metadata["content_hash"], content_hash("short"));
        assert!(chunks.iter().all(|c| c.metadata.contains_key("content_hash")));
    }

    #[test]
    fn test_content_hash() {
        let hash = content_hash("Hello, world!");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, content_hash("Hello, world!"));
        assert_ne!(hash, content_hash("Different text"));
    }
}
