use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::text::clean_text;

pub const BLOCK_REPORTING_OWNER: &str = "REPORTING OWNER";
pub const BLOCK_ISSUER: &str = "ISSUER";

pub const KEY_CIK: &str = "CENTRAL INDEX KEY";
pub const KEY_CONFORMED_NAME: &str = "COMPANY CONFORMED NAME";
pub const KEY_ACCESSION_NUMBER: &str = "ACCESSION NUMBER";
pub const KEY_SUBMISSION_TYPE: &str = "CONFORMED SUBMISSION TYPE";
pub const KEY_FILED_AS_OF: &str = "FILED AS OF DATE";
pub const KEY_PERIOD_OF_REPORT: &str = "CONFORMED PERIOD OF REPORT";
pub const KEY_ACCEPTANCE_DATETIME: &str = "ACCEPTANCE DATETIME";

// Only these open a top-level block; everything else nests as a group.
const TOP_LEVEL_BLOCKS: &[&str] = &[
    BLOCK_REPORTING_OWNER,
    BLOCK_ISSUER,
    "FILER",
    "SUBJECT COMPANY",
    "FILED BY",
];

// Tag-style headers use short names for the same fields.
const KEY_ALIASES: &[(&str, &str)] = &[
    ("CIK", KEY_CIK),
    ("CONFORMED NAME", KEY_CONFORMED_NAME),
    ("TYPE", KEY_SUBMISSION_TYPE),
    ("FILING DATE", KEY_FILED_AS_OF),
    ("PERIOD", KEY_PERIOD_OF_REPORT),
];

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(SEC-HEADER|sec-header|IMS-HEADER|ims-header)>(.*?)</(SEC-HEADER|sec-header|IMS-HEADER|ims-header)>")
        .expect("valid regex")
});
static TAG_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<(/?)([A-Za-z0-9][A-Za-z0-9-]*)>(.*)$").expect("valid regex"));
static NO_COLON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z][A-Z0-9 &/\-]*?[A-Z0-9])(?:\t+|\s{2,})(\S.*)$").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderField {
    /// Top-level block name, e.g. `REPORTING OWNER`.
    pub block: Option<String>,
    /// Occurrence number of the block, so repeated owners stay apart.
    pub block_index: usize,
    pub group: Option<String>,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HeaderFields {
    pub fields: Vec<HeaderField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock<'a> {
    pub name: &'a str,
    pub index: usize,
    pub fields: Vec<&'a HeaderField>,
}

impl<'a> HeaderBlock<'a> {
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }
}

impl HeaderFields {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First value for `key` outside any block.
    pub fn top_level(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.block.is_none() && f.key == key)
            .map(|f| f.value.as_str())
    }

    pub fn all_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.key == key)
            .map(|f| f.value.as_str())
    }

    /// Every occurrence of the named top-level block, in document order.
    pub fn blocks(&self, name: &str) -> Vec<HeaderBlock<'_>> {
        let mut blocks: Vec<HeaderBlock<'_>> = Vec::new();
        for field in &self.fields {
            let Some(block_name) = field.block.as_deref() else {
                continue;
            };
            if block_name != name {
                continue;
            }
            match blocks.iter_mut().find(|b| b.index == field.block_index) {
                Some(block) => block.fields.push(field),
                None => blocks.push(HeaderBlock {
                    name: block_name,
                    index: field.block_index,
                    fields: vec![field],
                }),
            }
        }
        blocks
    }
}

/// Returns the SGML header portion of a submission.
///
/// Falls back to everything before the first `<DOCUMENT>` when the header
/// tags are missing.
pub fn header_text(raw_text: &str) -> &str {
    if let Some(captures) = HEADER_RE.captures(raw_text) {
        if let Some(header) = captures.get(2) {
            return header.as_str();
        }
    }
    raw_text.split("<DOCUMENT>").next().unwrap_or(raw_text)
}

fn normalize_key(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase().replace('-', " ");
    let collapsed = upper.split_whitespace().collect::<Vec<_>>().join(" ");
    KEY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == collapsed)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(collapsed)
}

#[derive(Default)]
struct ParseState {
    block: Option<String>,
    block_counter: usize,
    group: Option<String>,
}

impl ParseState {
    fn open(&mut self, name: String) {
        if TOP_LEVEL_BLOCKS.contains(&name.as_str()) {
            self.block_counter += 1;
            self.block = Some(name);
            self.group = None;
        } else {
            self.group = Some(name);
        }
    }

    fn close(&mut self, name: &str) {
        if self.block.as_deref() == Some(name) {
            self.block = None;
            self.group = None;
        } else if self.group.as_deref() == Some(name) {
            self.group = None;
        }
    }

    fn field(&self, key: String, value: &str) -> HeaderField {
        HeaderField {
            block: self.block.clone(),
            block_index: if self.block.is_some() { self.block_counter } else { 0 },
            group: self.group.clone(),
            key,
            value: clean_text(value),
        }
    }
}

/// Tolerant key/value extraction from an SGML header.
///
/// Handles both the indented `KEY:<tab>value` layout and the `<TAG>value`
/// layout, lines missing their colon, and ignores lines it cannot read.
pub fn parse_header(raw_text: &str) -> HeaderFields {
    let header = header_text(raw_text);
    let mut state = ParseState::default();
    let mut fields = Vec::new();

    for line in header.lines() {
        let item = line.trim();
        if item.is_empty() {
            continue;
        }

        if let Some(captures) = TAG_LINE_RE.captures(item) {
            let closing = !captures[1].is_empty();
            let name = normalize_key(&captures[2]);
            let rest = captures[3].trim();

            if closing {
                state.close(&name);
            } else if rest.is_empty() {
                state.open(name);
            } else {
                fields.push(state.field(name, rest));
            }
            continue;
        }

        if item.starts_with('<') {
            continue;
        }

        if let Some(colon_index) = item.find(':') {
            let key = normalize_key(&item[..colon_index]);
            let value = item[colon_index + 1..].trim();
            if key.is_empty() {
                continue;
            }
            if value.is_empty() {
                state.open(key);
            } else {
                fields.push(state.field(key, value));
            }
            continue;
        }

        if let Some(captures) = NO_COLON_RE.captures(item) {
            let key = normalize_key(&captures[1]);
            fields.push(state.field(key, &captures[2]));
        } else {
            log::debug!("Skipping unreadable header line: {}", item);
        }
    }

    HeaderFields { fields }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT_HEADER: &str = "<SEC-DOCUMENT>0001127602-23-000001.txt : 20230103
<SEC-HEADER>0001127602-23-000001.hdr.sgml : 20230103
<ACCEPTANCE-DATETIME>20230103161514
ACCESSION NUMBER:\t\t0001127602-23-000001
CONFORMED SUBMISSION TYPE:\t4
PUBLIC DOCUMENT COUNT:\t\t1
CONFORMED PERIOD OF REPORT:\t20221230
FILED AS OF DATE:\t\t20230103

REPORTING-OWNER:\t

\tOWNER DATA:\t
\t\tCOMPANY CONFORMED NAME:\t\t\tDOE JOHN
\t\tCENTRAL INDEX KEY:\t\t\t0001234567

\tFILING VALUES:
\t\tFORM TYPE:\t\t4

REPORTING-OWNER:\t

\tOWNER DATA:\t
\t\tCOMPANY CONFORMED NAME:\t\t\tDOE FAMILY TRUST
\t\tCENTRAL INDEX KEY\t\t\t0007654321

ISSUER:\t\t

\tCOMPANY DATA:\t
\t\tCOMPANY CONFORMED NAME:\t\t\tACME WIDGETS INC
\t\tCENTRAL INDEX KEY:\t\t\t0001770787
</SEC-HEADER>
<DOCUMENT>
<TYPE>4
</DOCUMENT>";

    #[test]
    fn test_parse_text_header() {
        let fields = parse_header(TEXT_HEADER);
        assert_eq!(
            fields.top_level(KEY_ACCESSION_NUMBER),
            Some("0001127602-23-000001")
        );
        assert_eq!(fields.top_level(KEY_SUBMISSION_TYPE), Some("4"));
        assert_eq!(fields.top_level(KEY_FILED_AS_OF), Some("20230103"));
        assert_eq!(fields.top_level(KEY_ACCEPTANCE_DATETIME), Some("20230103161514"));

        let owners = fields.blocks(BLOCK_REPORTING_OWNER);
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0].get(KEY_CONFORMED_NAME), Some("DOE JOHN"));
        assert_eq!(owners[0].get(KEY_CIK), Some("0001234567"));
        // Missing colon is tolerated.
        assert_eq!(owners[1].get(KEY_CIK), Some("0007654321"));

        let issuers = fields.blocks(BLOCK_ISSUER);
        assert_eq!(issuers.len(), 1);
        assert_eq!(issuers[0].get(KEY_CONFORMED_NAME), Some("ACME WIDGETS INC"));
        assert_eq!(fields.all_values(KEY_CIK).count(), 3);
    }

    #[test]
    fn test_parse_tag_header() {
        let raw = "<SEC-HEADER>
<ACCESSION-NUMBER>0001127602-23-000002
<TYPE>4
<FILING-DATE>20230104
<REPORTING-OWNER>
<OWNER-DATA>
<CONFORMED-NAME>Smith Jane
<CIK>0000000042
</OWNER-DATA>
</REPORTING-OWNER>
<ISSUER>
<COMPANY-DATA>
<CONFORMED-NAME>Acme Widgets Inc
<CIK>0001770787
</COMPANY-DATA>
</ISSUER>
</SEC-HEADER>";
        let fields = parse_header(raw);
        assert_eq!(fields.top_level(KEY_SUBMISSION_TYPE), Some("4"));
        assert_eq!(fields.top_level(KEY_FILED_AS_OF), Some("20230104"));

        let owners = fields.blocks(BLOCK_REPORTING_OWNER);
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].get(KEY_CIK), Some("0000000042"));
        assert_eq!(owners[0].get(KEY_CONFORMED_NAME), Some("Smith Jane"));

        let issuer = &fields.blocks(BLOCK_ISSUER)[0];
        assert_eq!(issuer.get(KEY_CIK), Some("0001770787"));
    }

    #[test]
    fn test_header_without_envelope_uses_prefix() {
        let raw = "ACCESSION NUMBER: 1\n<DOCUMENT>\nFOO: bar\n</DOCUMENT>";
        let fields = parse_header(raw);
        assert_eq!(fields.top_level(KEY_ACCESSION_NUMBER), Some("1"));
        assert!(fields.all_values("FOO").next().is_none());
    }

    #[test]
    fn test_noise_lines_are_ignored() {
        let raw = "<SEC-HEADER>\n----\n  some free text here\nFILED AS OF DATE: 20230101\n</SEC-HEADER>";
        let fields = parse_header(raw);
        assert_eq!(fields.fields.len(), 1);
        assert_eq!(fields.top_level(KEY_FILED_AS_OF), Some("20230101"));
    }
}
