//! Instruction prefixes for instruction-tuned embedding models.

pub const QUERY_INSTRUCTION: &str = "Represent this query for retrieving relevant documents: ";
pub const DOCUMENT_INSTRUCTION: &str = "Represent this document for retrieval: ";
pub const TECHNICAL_INSTRUCTION: &str =
    "Represent this technical document for semantic search and retrieval: ";

/// Resolve a configured instruction.
///
/// `none` (or an empty value) disables the prefix, `query`, `document` and
/// `technical` select a preset, anything else is used literally. An unset
/// value falls back to `default`.
pub fn resolve_instruction(configured: Option<&str>, default: &str) -> Option<String> {
    let Some(value) = configured else {
        return Some(default.to_string());
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "" | "none" => None,
        "query" => Some(QUERY_INSTRUCTION.to_string()),
        "document" => Some(DOCUMENT_INSTRUCTION.to_string()),
        "technical" => Some(TECHNICAL_INSTRUCTION.to_string()),
        _ => Some(value.to_string()),
    }
}
