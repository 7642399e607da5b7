//! XLSX extraction: one unit per data row of the first worksheet.

use super::ooxml;
use crate::types::{round2, DocumentUnit};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use docchat_core::{AppError, AppResult};
use serde_json::json;
use std::io::Cursor;

pub(crate) fn extract_xlsx(bytes: &[u8], filename: &str) -> AppResult<Vec<DocumentUnit>> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| AppError::CorruptInput(format!("{}: {}", filename, e)))?;

    let sheet_names = workbook.sheet_names();
    let Some(range) = workbook.worksheet_range_at(0) else {
        tracing::warn!("{} contains no worksheets", filename);
        return Ok(Vec::new());
    };
    let range = range.map_err(|e| AppError::CorruptInput(format!("{}: {}", filename, e)))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };

    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(i, cell)| cell_value(cell).unwrap_or_else(|| format!("column_{}", i)))
        .collect();

    let total_rows = range.height().saturating_sub(1);
    let total_columns = headers.len();

    // Document properties live in the zip package, outside calamine's view.
    let properties = ooxml::open_package(bytes, filename)
        .map(|mut package| ooxml::core_properties(&mut package))
        .unwrap_or_default();

    let sheet_name = sheet_names.first().cloned().unwrap_or_default();
    let mut units = Vec::new();

    for (row_index, row) in rows.enumerate() {
        let pairs: Vec<String> = headers
            .iter()
            .zip(row.iter())
            .filter_map(|(header, cell)| cell_value(cell).map(|v| format!("{}: {}", header, v)))
            .collect();

        if pairs.is_empty() {
            continue;
        }

        let non_null_values = pairs.len();
        let mut metadata = properties.clone();
        metadata.insert("sheet_name".into(), json!(sheet_name));
        metadata.insert("sheet_names".into(), json!(sheet_names));
        metadata.insert("row_index".into(), json!(row_index));
        metadata.insert("total_rows".into(), json!(total_rows));
        metadata.insert("total_columns".into(), json!(total_columns));
        metadata.insert("column_headers".into(), json!(headers));
        metadata.insert("non_null_values".into(), json!(non_null_values));
        metadata.insert(
            "completeness_ratio".into(),
            json!(completeness_ratio(non_null_values, total_columns)),
        );

        units.push(DocumentUnit::new(pairs.join(" "), metadata));
    }

    tracing::debug!(
        "Extracted {} rows from sheet '{}' of {}",
        units.len(),
        sheet_name,
        filename
    );

    Ok(units)
}

/// Share of non-null cells in a row, rounded to two decimals.
pub(crate) fn completeness_ratio(non_null: usize, total_columns: usize) -> f64 {
    if total_columns == 0 {
        return 0.0;
    }
    round2(non_null as f64 / total_columns as f64)
}

/// Display text of a cell, `None` for empty, blank or error cells.
fn cell_value(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        other => Some(other.to_string()),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::xlsx;
    use super::*;

    #[test]
    fn test_completeness_ratio() {
        assert_eq!(completeness_ratio(3, 5), 0.6);
        assert_eq!(completeness_ratio(2, 3), 0.67);
        assert_eq!(completeness_ratio(0, 0), 0.0);
    }

    #[test]
    fn test_rows_become_units() {
        let bytes = xlsx(&[
            vec![Some("SKU"), Some("Name"), Some("Qty"), Some("Zone"), Some("Note")],
            vec![Some("A1"), Some("Bút bi"), Some("12"), None, None],
            vec![None, None, None, None, None],
            vec![Some("B2"), Some("Vở"), Some("3"), Some("K1"), Some("gấp")],
        ]);

        let units = extract_xlsx(&bytes, "orders.xlsx").unwrap();
        assert_eq!(units.len(), 2);

        let first = &units[0];
        assert_eq!(first.text, "SKU: A1 Name: Bút bi Qty: 12");
        assert_eq!(first.metadata["row_index"], 0);
        assert_eq!(first.metadata["non_null_values"], 3);
        assert_eq!(first.metadata["completeness_ratio"], 0.6);
        assert_eq!(first.metadata["total_columns"], 5);
        assert_eq!(first.metadata["sheet_name"], "Orders");
        assert_eq!(first.metadata["author"], "Kho Hà Nội");

        assert_eq!(units[1].metadata["row_index"], 2);
        assert_eq!(units[1].metadata["completeness_ratio"], 1.0);
    }

    #[test]
    fn test_blank_header_named_by_position() {
        let bytes = xlsx(&[
            vec![Some("Item"), None],
            vec![Some("pen"), Some("blue")],
        ]);
        let units = extract_xlsx(&bytes, "x.xlsx").unwrap();
        assert_eq!(units[0].text, "Item: pen column_1: blue");
    }

    #[test]
    fn test_corrupt_workbook() {
        let result = extract_xlsx(b"definitely not a zip", "bad.xlsx");
        assert!(matches!(result, Err(AppError::CorruptInput(_))));
    }
}
