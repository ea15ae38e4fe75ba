//! Auxiliary-content reader: secondary file bytes → text.
//!
//! Secondary files come from customer ERP exports and mail clients in
//! whatever encoding they happen to use. The first strict decode that
//! succeeds wins:
//!
//! 1. UTF-8 (a leading BOM is dropped)
//! 2. UTF-16, big-endian when the data starts with `FE FF`, otherwise
//!    little-endian (a `FF FE` mark is dropped)
//! 3. ISO-8859-1
//!
//! ISO-8859-1 maps every byte to a code point, so step 3 always succeeds and
//! nothing after it (Windows-1252, lossy UTF-8) is ever consulted. Any
//! even-length input that is not UTF-8 and contains no unpaired surrogate
//! decodes as UTF-16. Decoding never fails; only I/O does.

use crate::error::OrderError;
use std::path::Path;
use tracing::debug;

/// Text decoded from auxiliary bytes, with the encoding that succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
}

/// Read a secondary file and decode it.
pub fn read_auxiliary_file(path: &Path) -> Result<String, OrderError> {
    let bytes = std::fs::read(path).map_err(|source| OrderError::AuxiliaryUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = decode_auxiliary(&bytes);
    debug!(
        "Read auxiliary file {} ({} bytes, {})",
        path.display(),
        bytes.len(),
        decoded.encoding
    );
    Ok(decoded.text)
}

/// Decode arbitrary bytes using the priority chain described above.
pub fn decode_auxiliary(bytes: &[u8]) -> DecodedText {
    if let Some(text) = decode_utf8(bytes) {
        return DecodedText {
            text,
            encoding: "UTF-8",
        };
    }
    if let Some((text, encoding)) = decode_utf16(bytes) {
        return DecodedText { text, encoding };
    }
    DecodedText {
        text: decode_latin1(bytes),
        encoding: "ISO-8859-1",
    }
}

fn decode_utf8(bytes: &[u8]) -> Option<String> {
    let body = bytes.strip_prefix(&b"\xEF\xBB\xBF"[..]).unwrap_or(bytes);
    std::str::from_utf8(body).ok().map(str::to_string)
}

fn decode_utf16(bytes: &[u8]) -> Option<(String, &'static str)> {
    let (encoding, label, body) = match bytes {
        [0xFE, 0xFF, rest @ ..] => (encoding_rs::UTF_16BE, "UTF-16BE", rest),
        [0xFF, 0xFE, rest @ ..] => (encoding_rs::UTF_16LE, "UTF-16LE", rest),
        _ => (encoding_rs::UTF_16LE, "UTF-16LE", bytes),
    };
    if body.len() % 2 != 0 {
        return None;
    }
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| (text.into_owned(), label))
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
