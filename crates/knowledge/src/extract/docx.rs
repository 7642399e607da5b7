//! DOCX extraction.
//!
//! Body paragraphs come first in document order, then one line per table
//! row with cells joined by `" | "`.

use super::ooxml;
use crate::types::DocumentUnit;
use docchat_core::{AppError, AppResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::json;

/// One unit for the whole document, none when it has no text.
pub(crate) fn extract_docx(bytes: &[u8], filename: &str) -> AppResult<Vec<DocumentUnit>> {
    let mut package = ooxml::open_package(bytes, filename)?;

    let xml = ooxml::read_part(&mut package, "word/document.xml")?.ok_or_else(|| {
        AppError::CorruptInput(format!("{}: missing word/document.xml", filename))
    })?;

    let body = parse_document(&xml)
        .map_err(|e| AppError::CorruptInput(format!("{}: {}", filename, e)))?;

    let mut metadata = ooxml::core_properties(&mut package);
    metadata.insert("paragraph_count".into(), json!(body.paragraphs.len()));
    metadata.insert("table_count".into(), json!(body.table_count));

    let text = body
        .paragraphs
        .into_iter()
        .chain(body.table_rows)
        .collect::<Vec<_>>()
        .join("\n");

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![DocumentUnit::new(text, metadata)])
}

#[derive(Debug, Default)]
struct DocumentBody {
    paragraphs: Vec<String>,
    table_rows: Vec<String>,
    table_count: usize,
}

fn parse_document(xml: &str) -> Result<DocumentBody, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut body = DocumentBody::default();

    let mut paragraph = String::new();
    let mut in_text = false;
    let mut table_depth = 0usize;
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => paragraph.clear(),
                b"t" => in_text = true,
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        body.table_count += 1;
                    }
                }
                b"tr" if table_depth == 1 => row.clear(),
                b"tc" if table_depth == 1 => cell.clear(),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => paragraph.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = paragraph.trim();
                    if !text.is_empty() {
                        if table_depth == 0 {
                            body.paragraphs.push(text.to_string());
                        } else {
                            if !cell.is_empty() {
                                cell.push(' ');
                            }
                            cell.push_str(text);
                        }
                    }
                    paragraph.clear();
                }
                b"tc" if table_depth == 1 => row.push(cell.trim().to_string()),
                b"tr" if table_depth == 1 => {
                    if row.iter().any(|c| !c.is_empty()) {
                        body.table_rows.push(row.join(" | "));
                    }
                }
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(body)
}
