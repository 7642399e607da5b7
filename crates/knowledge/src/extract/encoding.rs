//! Byte-to-text decoding with a fixed fallback chain.
//!
//! Order: byte-order mark, caller-declared label, UTF-8, Latin-1, CP1252,
//! ISO-8859-1. Latin-1 is only accepted when the result has no C1 control
//! characters (their presence means the bytes are really CP1252), and CP1252
//! is only accepted when none of its five unassigned bytes occur. ISO-8859-1
//! maps every byte and terminates the chain.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

/// Decoded text and the name of the encoding that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub encoding: String,
}

/// Decode `bytes` using the fallback chain.
pub fn decode_text(bytes: &[u8], declared: Option<&str>) -> Decoded {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        if let Some(text) = strict_decode(encoding, &bytes[bom_len..]) {
            return found(text, encoding.name());
        }
    }

    if let Some(label) = declared {
        match Encoding::for_label(label.trim().as_bytes()) {
            Some(encoding) => {
                if let Some(text) = strict_decode(encoding, bytes) {
                    return found(text, encoding.name());
                }
                tracing::debug!("Declared encoding {} failed, trying fallbacks", label);
            }
            None => tracing::warn!("Unknown declared encoding label: {}", label),
        }
    }

    if let Some(text) = strict_decode(UTF_8, bytes) {
        return found(text, "utf-8");
    }

    let latin1 = encoding_rs::mem::decode_latin1(bytes);
    if !latin1.chars().any(is_c1_control) {
        return found(latin1.into_owned(), "latin-1");
    }

    if !bytes.iter().any(|b| CP1252_UNASSIGNED.contains(b)) {
        if let Some(text) = strict_decode(WINDOWS_1252, bytes) {
            return found(text, "cp1252");
        }
    }

    found(latin1.into_owned(), "iso-8859-1")
}

const CP1252_UNASSIGNED: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];

fn is_c1_control(c: char) -> bool {
    ('\u{80}'..='\u{9f}').contains(&c)
}

fn strict_decode(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        None
    } else {
        Some(text.into_owned())
    }
}

fn found(text: String, encoding: &str) -> Decoded {
    Decoded {
        text,
        encoding: encoding.to_ascii_lowercase(),
    }
}
