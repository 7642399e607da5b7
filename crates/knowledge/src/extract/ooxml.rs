//! Shared access to Office Open XML packages (DOCX, XLSX).

use crate::types::Metadata;
use docchat_core::{AppError, AppResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

pub(crate) type Package<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// Open the zip container of an OOXML document.
pub(crate) fn open_package<'a>(bytes: &'a [u8], filename: &str) -> AppResult<Package<'a>> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::CorruptInput(format!("{}: not a valid OOXML package: {}", filename, e)))
}

/// Read one part of the package as UTF-8, `None` when it does not exist.
pub(crate) fn read_part(package: &mut Package<'_>, name: &str) -> AppResult<Option<String>> {
    let mut file = match package.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(AppError::CorruptInput(format!(
                "cannot open part {}: {}",
                name, e
            )))
        }
    };

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| AppError::CorruptInput(format!("cannot read part {}: {}", name, e)))?;
    Ok(Some(contents))
}

/// Document properties from `docProps/core.xml`.
///
/// Missing or unreadable properties are not an error; the document body is
/// what matters.
pub(crate) fn core_properties(package: &mut Package<'_>) -> Metadata {
    let mut properties = Metadata::new();

    let xml = match read_part(package, "docProps/core.xml") {
        Ok(Some(xml)) => xml,
        Ok(None) => return properties,
        Err(e) => {
            tracing::debug!("Skipping document properties: {}", e);
            return properties;
        }
    };

    let mut reader = Reader::from_str(&xml);
    let mut current: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current = match e.local_name().as_ref() {
                    b"creator" => Some("author"),
                    b"title" => Some("title"),
                    b"subject" => Some("subject"),
                    b"created" => Some("created"),
                    b"modified" => Some("modified"),
                    _ => None,
                };
            }
            Ok(Event::Text(t)) => {
                if let (Some(key), Ok(text)) = (current, t.unescape()) {
                    let text = text.trim();
                    if !text.is_empty() {
                        properties.insert(key.to_string(), Value::String(text.to_string()));
                    }
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!("Malformed docProps/core.xml: {}", e);
                break;
            }
            _ => {}
        }
    }

    properties
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_core_properties() {
        let bytes = package(&[("docProps/core.xml", core_xml("Lan &amp; Minh", "Báo cáo"))]);
        let mut pkg = open_package(&bytes, "a.docx").unwrap();

        let props = core_properties(&mut pkg);
        assert_eq!(props["author"], "Lan & Minh");
        assert_eq!(props["title"], "Báo cáo");
        assert_eq!(props["created"], "2024-05-01T08:00:00Z");
        assert!(props.get("subject").is_none());
    }

    #[test]
    fn test_missing_part_is_none() {
        let bytes = package(&[("other.xml", "<a/>".to_string())]);
        let mut pkg = open_package(&bytes, "a.docx").unwrap();
        assert!(read_part(&mut pkg, "word/document.xml").unwrap().is_none());
        assert!(core_properties(&mut pkg).is_empty());
    }

    #[test]
    fn test_not_a_zip() {
        let result = open_package(b"plain text", "a.docx");
        assert!(matches!(result, Err(AppError::CorruptInput(_))));
    }
}
