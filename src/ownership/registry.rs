use serde::{Deserialize, Serialize};
use std::fmt;

use crate::edgar::report::ReportType;

/// Parsers available for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormParser {
    /// Forms 3, 4 and 5: entities, relationships, transactions and positions.
    Ownership,
    /// Anything else: document list and header entities only.
    ExhibitsOnly,
}

impl fmt::Display for FormParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormParser::Ownership => write!(f, "ownership"),
            FormParser::ExhibitsOnly => write!(f, "exhibits_only"),
        }
    }
}

// Keyed by the normalized form type, amendments folded into their base form.
const REGISTRY: &[(&str, FormParser)] = &[
    ("3", FormParser::Ownership),
    ("4", FormParser::Ownership),
    ("5", FormParser::Ownership),
];

pub fn lookup(form: &ReportType) -> Option<FormParser> {
    let key = form.to_string();
    REGISTRY
        .iter()
        .find(|(registered, _)| *registered == key)
        .map(|(_, parser)| *parser)
}

/// Picks the parser for a filing. An unregistered form that still carries an
/// ownership document is parsed as one.
pub fn select(form: &ReportType, has_ownership_xml: bool) -> FormParser {
    match lookup(form) {
        Some(parser) => parser,
        None if has_ownership_xml => {
            log::debug!("Form {:?} not registered but has ownership XML", form);
            FormParser::Ownership
        }
        None => FormParser::ExhibitsOnly,
    }
}
