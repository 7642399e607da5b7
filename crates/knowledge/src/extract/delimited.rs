//! Delimited text (CSV) extraction: one unit per data row.

use super::encoding::decode_text;
use crate::types::{round2, DocumentUnit};
use docchat_core::{AppError, AppResult};
use serde_json::json;

const DELIMITER_CANDIDATES: [char; 5] = [',', ';', '\t', '|', ':'];
const SNIFF_CHARS: usize = 1000;
const SNIFF_LINES: usize = 3;
const NA_MARKERS: [&str; 6] = ["", "NA", "N/A", "NULL", "null", "None"];

pub(crate) fn extract_csv(
    bytes: &[u8],
    filename: &str,
    declared_encoding: Option<&str>,
) -> AppResult<Vec<DocumentUnit>> {
    let decoded = decode_text(bytes, declared_encoding);
    let delimiter = detect_delimiter(&decoded.text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(decoded.text.as_bytes());

    let original_headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::CorruptInput(format!("{}: {}", filename, e)))?
        .iter()
        .map(str::to_string)
        .collect();

    if original_headers.iter().all(|h| h.trim().is_empty()) {
        return Err(AppError::CorruptInput(format!(
            "{}: no header row",
            filename
        )));
    }

    let columns = sanitize_headers(&original_headers);
    let total_columns = columns.len();

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AppError::CorruptInput(format!("{}: {}", filename, e)))?;
        let values = (0..total_columns)
            .map(|i| record.get(i).and_then(non_null))
            .collect();
        rows.push(values);
    }

    let total_rows = rows.len();
    let filled: usize = rows.iter().flatten().filter(|v| v.is_some()).count();
    let data_completeness = if total_rows * total_columns == 0 {
        0.0
    } else {
        round2(filled as f64 / (total_rows * total_columns) as f64)
    };

    let mut units = Vec::new();
    for (row_index, values) in rows.into_iter().enumerate() {
        let pairs: Vec<String> = columns
            .iter()
            .zip(&values)
            .filter_map(|(column, value)| value.as_ref().map(|v| format!("{}: {}", column, v)))
            .collect();

        let text = pairs.join(" | ");
        if text.trim().is_empty() {
            continue;
        }

        let non_null_values = pairs.len();
        let mut metadata = crate::types::Metadata::new();
        metadata.insert("encoding".into(), json!(decoded.encoding));
        metadata.insert("delimiter".into(), json!(delimiter.to_string()));
        metadata.insert("row_index".into(), json!(row_index));
        metadata.insert("row_number".into(), json!(row_index + 1));
        metadata.insert("total_rows".into(), json!(total_rows));
        metadata.insert("total_columns".into(), json!(total_columns));
        metadata.insert("column_names".into(), json!(columns));
        metadata.insert("original_headers".into(), json!(original_headers));
        metadata.insert("non_null_values".into(), json!(non_null_values));
        metadata.insert(
            "empty_fields".into(),
            json!(total_columns - non_null_values),
        );
        metadata.insert(
            "completeness_ratio".into(),
            json!(super::xlsx::completeness_ratio(non_null_values, total_columns)),
        );
        metadata.insert("data_completeness".into(), json!(data_completeness));

        units.push(DocumentUnit::new(text, metadata));
    }

    tracing::debug!(
        "Extracted {} rows from {} (encoding {}, delimiter {:?})",
        units.len(),
        filename,
        decoded.encoding,
        delimiter
    );

    Ok(units)
}

/// Pick the delimiter whose count is the same, and at least one, on each of
/// the first non-blank lines. Falls back to a comma.
pub fn detect_delimiter(text: &str) -> char {
    let sample: String = text.chars().take(SNIFF_CHARS).collect();
    let lines: Vec<&str> = sample
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    if lines.is_empty() {
        return ',';
    }

    DELIMITER_CANDIDATES
        .into_iter()
        .find(|&candidate| {
            let first = lines[0].matches(candidate).count();
            first >= 1 && lines.iter().all(|line| line.matches(candidate).count() == first)
        })
        .unwrap_or(',')
}

/// Normalise header names into identifier-like column names.
pub fn sanitize_headers(headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let trimmed = header.trim();
            if trimmed.is_empty() || is_unnamed(trimmed) || trimmed.eq_ignore_ascii_case("nan") {
                format!("column_{}", i)
            } else {
                trimmed
                    .chars()
                    .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
                    .collect()
            }
        })
        .collect()
}

/// `unnamed`, or the `Unnamed: 3` placeholders spreadsheet exports produce.
fn is_unnamed(header: &str) -> bool {
    let lower = header.to_lowercase();
    match lower.strip_prefix("unnamed") {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix(':')
            .map(|n| {
                let n = n.trim();
                !n.is_empty() && n.chars().all(|c| c.is_ascii_digit())
            })
            .unwrap_or(false),
        None => false,
    }
}

fn non_null(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if NA_MARKERS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sanitize_headers() {
        let headers = strings(&["", "Name", "nan", "Col 1!"]);
        assert_eq!(
            sanitize_headers(&headers),
            strings(&["column_0", "Name", "column_2", "Col_1_"])
        );

        let headers = strings(&["Unnamed: 0", "unnamed", "Mã hàng"]);
        assert_eq!(
            sanitize_headers(&headers),
            strings(&["column_0", "column_1", "Mã_hàng"])
        );
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3\n4,5,6"), ',');
        assert_eq!(detect_delimiter("a;b\n1;2\n\n3;4"), ';');
        assert_eq!(detect_delimiter("a\tb\n1\t2"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
        // Inconsistent counts for every candidate.
        assert_eq!(detect_delimiter("a b\nc, d, e\nf"), ',');
        assert_eq!(detect_delimiter(""), ',');
    }

    #[test]
    fn test_rows_become_units() {
        let data = "SKU;Name;Qty;Note\nA1;Pen;12;N/A\n;;;\nB2;Book;NULL;gift\n";
        let units = extract_csv(data.as_bytes(), "stock.csv", None).unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "SKU: A1 | Name: Pen | Qty: 12");
        assert_eq!(units[0].metadata["delimiter"], ";");
        assert_eq!(units[0].metadata["encoding"], "utf-8");
        assert_eq!(units[0].metadata["row_number"], 1);
        assert_eq!(units[0].metadata["non_null_values"], 3);
        assert_eq!(units[0].metadata["empty_fields"], 1);
        assert_eq!(units[0].metadata["completeness_ratio"], 0.75);
        assert_eq!(units[0].metadata["total_rows"], 3);
        // 6 filled cells out of 12.
        assert_eq!(units[0].metadata["data_completeness"], 0.5);

        assert_eq!(units[1].metadata["row_index"], 2);
        assert_eq!(units[1].text, "SKU: B2 | Name: Book | Note: gift");
    }

    #[test]
    fn test_latin1_csv() {
        let units = extract_csv(b"city,dish\nParis,cr\xeape\n", "food.csv", None).unwrap();
        assert_eq!(units[0].text, "city: Paris | dish: crêpe");
        assert_eq!(units[0].metadata["encoding"], "latin-1");
    }

    #[test]
    fn test_header_only_is_empty() {
        let units = extract_csv(b"a,b\n", "h.csv", None).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn test_missing_header_is_corrupt() {
        let result = extract_csv(b"", "empty.csv", None);
        assert!(matches!(result, Err(AppError::CorruptInput(_))));
    }
}
