//! Plain text extraction with line and word statistics.

use super::encoding::decode_text;
use crate::types::{round2, DocumentUnit, Metadata};
use docchat_core::AppResult;
use serde_json::json;

const CODE_KEYWORDS: [&str; 8] = [
    "fn ", "def ", "class ", "import ", "function ", "#include", "public static", "const ",
];
const LOG_LEVELS: [&str; 6] = ["ERROR", "WARN", "INFO", "DEBUG", "TRACE", "FATAL"];

pub(crate) fn extract_txt(
    bytes: &[u8],
    filename: &str,
    declared_encoding: Option<&str>,
) -> AppResult<Vec<DocumentUnit>> {
    let decoded = decode_text(bytes, declared_encoding);
    let text = decoded.text;

    if text.trim().is_empty() {
        tracing::debug!("{} has no text content", filename);
        return Ok(Vec::new());
    }

    let lines: Vec<&str> = text.lines().collect();
    let non_empty_lines = lines.iter().filter(|l| !l.trim().is_empty()).count();
    let words: Vec<&str> = text.split_whitespace().collect();
    let char_count = text.chars().count();

    let avg_line_length = if lines.is_empty() {
        0.0
    } else {
        let total: usize = lines.iter().map(|l| l.chars().count()).sum();
        round2(total as f64 / lines.len() as f64)
    };
    let avg_word_length = if words.is_empty() {
        0.0
    } else {
        let total: usize = words.iter().map(|w| w.chars().count()).sum();
        round2(total as f64 / words.len() as f64)
    };

    let mut metadata = Metadata::new();
    metadata.insert("encoding".into(), json!(decoded.encoding));
    metadata.insert("total_lines".into(), json!(lines.len()));
    metadata.insert("non_empty_lines".into(), json!(non_empty_lines));
    metadata.insert("word_count".into(), json!(words.len()));
    metadata.insert("char_count".into(), json!(char_count));
    metadata.insert("avg_line_length".into(), json!(avg_line_length));
    metadata.insert("avg_word_length".into(), json!(avg_word_length));
    metadata.insert("detected_format".into(), json!(detect_text_format(&text)));
    metadata.insert("language_hints".into(), json!(detect_language_hints(&text)));

    Ok(vec![DocumentUnit::new(text, metadata)])
}

/// Rough content classification of a text file.
pub fn detect_text_format(text: &str) -> &'static str {
    let trimmed = text.trim();
    let lines: Vec<&str> = trimmed.lines().filter(|l| !l.trim().is_empty()).collect();

    let head: Vec<usize> = lines.iter().take(5).map(|l| l.matches(',').count()).collect();
    if head.len() > 1 && head[0] > 0 && head.iter().all(|&c| c == head[0]) {
        return "csv_like";
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return "json_like";
    }
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        return "json_array_like";
    }

    if trimmed.matches('<').count() > 5 && trimmed.matches('>').count() > 5 {
        let lower = trimmed.to_lowercase();
        if lower.starts_with("<?xml") {
            return "xml_like";
        }
        if lower.contains("<html") || lower.contains("<!doctype html") {
            return "html_like";
        }
        return "markup_like";
    }

    let keyword_hits = CODE_KEYWORDS.iter().filter(|k| trimmed.contains(*k)).count();
    if keyword_hits >= 2 {
        return "code_like";
    }

    let log_lines = lines
        .iter()
        .filter(|l| LOG_LEVELS.iter().any(|level| l.contains(level)))
        .count();
    if !lines.is_empty() && log_lines * 10 >= lines.len() * 3 {
        return "log_like";
    }

    let markdown = lines.iter().any(|l| {
        let l = l.trim_start();
        l.starts_with("# ")
            || l.starts_with("## ")
            || l.starts_with("### ")
            || l.starts_with("- ")
            || l.starts_with("* ")
            || l.starts_with("```")
    });
    if markdown {
        return "markdown_like";
    }

    if lines.iter().any(|l| l.starts_with("From:")) && lines.iter().any(|l| l.starts_with("Subject:"))
    {
        return "email_like";
    }

    "plain_text"
}

/// Scripts present in the text, in a fixed order.
pub fn detect_language_hints(text: &str) -> Vec<&'static str> {
    let mut hints = Vec::new();

    if text.chars().any(is_vietnamese) {
        hints.push("vietnamese");
    }
    let ranges: [(&str, char, char); 5] = [
        ("chinese", '\u{4E00}', '\u{9FFF}'),
        ("japanese", '\u{3040}', '\u{30FF}'),
        ("korean", '\u{AC00}', '\u{D7AF}'),
        ("russian", '\u{0400}', '\u{04FF}'),
        ("arabic", '\u{0600}', '\u{06FF}'),
    ];
    for (name, start, end) in ranges {
        if text.chars().any(|c| (start..=end).contains(&c)) {
            hints.push(name);
        }
    }

    if hints.is_empty() && text.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_ascii()) {
        hints.push("english_likely");
    }

    hints
}

fn is_vietnamese(c: char) -> bool {
    const MARKED: &str = "ăâêôơưđáàảãạắằẳẵặấầẩẫậéèẻẽẹếềểễệíìỉĩịóòỏõọốồổỗộớờởỡợúùủũụứừửữựýỳỷỹỵ";
    c.to_lowercase().any(|lower| MARKED.contains(lower))
}
