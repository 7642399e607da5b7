//! Source references for retrieved context.

use crate::rag::types::SourceRef;
use crate::types::{Chunk, SearchHit};
use std::collections::HashSet;

/// Maximum snippet length for source references.
const MAX_SNIPPET_LENGTH: usize = 150;

/// Map hits to human-readable source references, one per (source, location).
pub fn map_hits_to_sources(hits: &[SearchHit]) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    for hit in hits {
        let source = source_name(&hit.chunk);
        let location = location(&hit.chunk);

        if seen.insert((source.clone(), location.clone())) {
            sources.push(SourceRef {
                source,
                location,
                snippet: truncate_snippet(&hit.chunk.text, MAX_SNIPPET_LENGTH),
            });
        }
    }

    sources
}

fn source_name(chunk: &Chunk) -> String {
    chunk
        .source_filename()
        .map(str::to_string)
        .or_else(|| {
            chunk
                .unit_id()
                .and_then(|id| id.rsplit_once('#'))
                .map(|(name, _)| name.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Human-readable location from extractor and chunker metadata.
fn location(chunk: &Chunk) -> String {
    let number = |key: &str| chunk.metadata.get(key).and_then(|v| v.as_u64());

    let mut location = match (chunk.meta_str("sheet_name"), number("row_index")) {
        (Some(sheet), Some(row)) => format!("sheet {}, row {}", sheet, row + 1),
        (None, Some(row)) => format!("row {}", row + 1),
        _ => match number("paragraph_count") {
            Some(_) => "document body".to_string(),
            None => "document".to_string(),
        },
    };

    if let (Some(index), Some(count)) = (number("chunk_index"), number("chunk_count")) {
        location.push_str(&format!(", part {} of {}", index + 1, count));
    }

    location
}

/// Truncate snippet to at most `max_chars` characters, at a word boundary
/// when one exists.
fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };

    let truncated = &text[..cut];
    match truncated.rfind(char::is_whitespace) {
        Some(last_space) => format!("{}...", &truncated[..last_space]),
        None => format!("{}...", truncated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentUnit, Metadata};
    use serde_json::json;

    fn hit(text: &str, metadata: serde_json::Value) -> SearchHit {
        let metadata: Metadata = serde_json::from_value(metadata).unwrap();
        SearchHit {
            chunk: DocumentUnit::new(text, metadata),
            score: 0.5,
        }
    }

    #[test]
    fn test_sources_are_deduplicated() {
        let hits = vec![
            hit("a", json!({"source_filename": "orders.csv", "row_index": 3})),
            hit("b", json!({"source_filename": "orders.csv", "row_index": 3})),
            hit("c", json!({"source_filename": "stock.xlsx", "sheet_name": "Kho", "row_index": 0})),
            hit("d", json!({"unit_id": "notes.txt#0", "chunk_index": 1, "chunk_count": 4})),
        ];

        let sources = map_hits_to_sources(&hits);
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].location, "row 4");
        assert_eq!(sources[0].snippet, "a");
        assert_eq!(sources[1].location, "sheet Kho, row 1");
        assert_eq!(sources[2].source, "notes.txt");
        assert_eq!(sources[2].location, "document, part 2 of 4");
    }

    #[test]
    fn test_truncate_snippet() {
        assert_eq!(truncate_snippet("Short text", 100), "Short text");

        let long = "Hàng hóa được nhập kho theo quy trình kiểm tra chất lượng";
        let result = truncate_snippet(long, 20);
        assert!(result.ends_with("..."));
        assert!(result.chars().count() <= 23);
        assert!(long.starts_with(result.trim_end_matches("...")));
    }
}
