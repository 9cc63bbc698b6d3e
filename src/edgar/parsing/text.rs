use anyhow::Result;
use chardet::detect;
use encoding_rs::Encoding;
use encoding_rs_io::DecodeReaderBytesBuilder;
use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::Read;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Decodes raw submission bytes, detecting the character set first.
///
/// Older submissions are frequently Latin-1 rather than UTF-8.
pub fn decode_submission(raw: &[u8]) -> Result<String> {
    let charenc = detect(raw).0;
    log::debug!("Detected character encoding: {}", charenc);

    let mut reader = DecodeReaderBytesBuilder::new()
        .encoding(Encoding::for_label(charenc.as_bytes()))
        .build(raw);

    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(text)
}

pub fn read_submission(path: &Path) -> Result<String> {
    log::debug!("Reading file: {}", path.display());
    let raw = fs::read(path)?;
    decode_submission(&raw)
}

/// Cleans a display string pulled out of a header or XML node: entities are
/// decoded, Unicode is NFKC-normalized and runs of whitespace collapse.
pub fn clean_text(raw: &str) -> String {
    let decoded = decode_html_entities(raw);
    let normalized: String = decoded.nfkc().collect();
    WHITESPACE_RE
        .replace_all(normalized.trim(), " ")
        .into_owned()
}

/// Like [`clean_text`] but maps empty results to `None`.
pub fn non_empty(raw: &str) -> Option<String> {
    let cleaned = clean_text(raw);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
