use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{Exhibit, FilingDocument, SplitSubmission};

const ELEMENTS_LIST: &[(&str, &str)] = &[
    ("FILENAME", "<FILENAME>"),
    ("TYPE", "<TYPE>"),
    ("SEQUENCE", "<SEQUENCE>"),
    ("DESCRIPTION", "<DESCRIPTION>"),
];

// Binary and office formats we never try to read as text.
const IGNORED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "gif", "png", "bmp", "tif", "tiff", "pdf", "zip", "xls", "xlsx", "doc", "docx",
    "ppt", "pptx",
];

const NOISE_LABELS: &[&str] = &["SIGNATURE", "SIGNATURES", "EX-24", "POWER OF ATTORNEY", "GRAPHIC"];

static DOCUMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<DOCUMENT>(.*?)</DOCUMENT>").expect("valid regex"));
static TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(?:TEXT|text)>(.*?)</(?:TEXT|text)>").expect("valid regex"));
static FORM_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(10-?k|10-?q|8-?k|s-1|s-3|s-4|20-?f|6-?k|def-?14a)").expect("valid regex")
});

/// Splits a raw submission into its documents and picks the primary one.
///
/// Never fails: text without any `<DOCUMENT>` blocks gives an empty list and
/// no primary document.
pub fn split_submission(raw_text: &str) -> SplitSubmission {
    let documents: Vec<FilingDocument> = DOCUMENT_RE
        .captures_iter(raw_text)
        .filter_map(|cap| cap.get(1))
        .enumerate()
        .map(|(i, m)| parse_document(m.as_str(), i))
        .collect();

    if documents.is_empty() {
        log::debug!("No <DOCUMENT> entries found in submission");
        return SplitSubmission::default();
    }

    let mut split = SplitSubmission {
        primary: select_primary(&documents),
        documents,
    };
    if let Some(idx) = split.primary {
        split.documents[idx].exhibit.is_primary = true;
    }
    split
}

fn parse_document(document: &str, position: usize) -> FilingDocument {
    // Tags only count before the body starts; embedded XML may reuse the names.
    let head = document.split("<TEXT>").next().unwrap_or(document);

    let mut filename = String::new();
    let mut doc_type = String::new();
    let mut description = String::new();
    let mut sequence = None;

    for (element, element_path) in ELEMENTS_LIST {
        let value = head
            .split(element_path)
            .nth(1)
            .and_then(|s| s.split(['<', '\n']).next())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        match *element {
            "FILENAME" => filename = value,
            "TYPE" => doc_type = value,
            "DESCRIPTION" => description = value,
            "SEQUENCE" => sequence = value.parse::<u32>().ok(),
            _ => {}
        }
    }

    let raw_text = TEXT_RE
        .captures(document)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
        .unwrap_or("")
        .replace("<XBRL>", "")
        .replace("</XBRL>", "")
        .replace("<XML>", "")
        .replace("</XML>", "")
        .trim()
        .to_string();

    let accessible = is_accessible(&filename, &doc_type, &description);

    FilingDocument {
        exhibit: Exhibit {
            filename,
            doc_type,
            description,
            sequence: sequence.unwrap_or(position as u32 + 1),
            accessible,
            is_primary: false,
        },
        raw_text,
    }
}

fn is_accessible(filename: &str, doc_type: &str, description: &str) -> bool {
    let ignored_ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| IGNORED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if ignored_ext {
        return false;
    }

    let doc_type = doc_type.to_ascii_uppercase();
    let description = description.to_ascii_uppercase();
    !NOISE_LABELS
        .iter()
        .any(|label| doc_type == *label || description == *label)
}

/// Primary document selection, first rule that matches wins:
/// 1. an HTML file at sequence 1
/// 2. a file named after a form type, HTML preferred
/// 3. any HTML file, lowest sequence first
/// 4. any XML file, lowest sequence first
/// 5. the first accessible file
fn select_primary(documents: &[FilingDocument]) -> Option<usize> {
    let mut accessible: Vec<(usize, &FilingDocument)> = documents
        .iter()
        .enumerate()
        .filter(|(_, d)| d.exhibit.accessible)
        .collect();
    accessible.sort_by_key(|(i, d)| (d.exhibit.sequence, *i));

    if let Some((i, _)) = accessible
        .iter()
        .find(|(_, d)| d.exhibit.sequence == 1 && d.is_html())
    {
        return Some(*i);
    }

    let form_named: Vec<&(usize, &FilingDocument)> = accessible
        .iter()
        .filter(|(_, d)| FORM_NAME_RE.is_match(&d.exhibit.filename))
        .collect();
    if let Some((i, _)) = form_named
        .iter()
        .find(|(_, d)| d.is_html())
        .or_else(|| form_named.first())
    {
        return Some(*i);
    }

    if let Some((i, _)) = accessible.iter().find(|(_, d)| d.is_html()) {
        return Some(*i);
    }
    if let Some((i, _)) = accessible.iter().find(|(_, d)| d.is_xml()) {
        return Some(*i);
    }

    accessible.first().map(|(i, _)| *i)
}
