use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum::{EnumIter, IntoEnumIterator};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(try_from = "String", into = "String")]
pub enum ReportType {
    Form3,
    Form4,
    Form5,
    /// Any other form, kept as filed.
    Other(String),
}

impl TryFrom<String> for ReportType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ReportType::from_str(&s)
    }
}

impl From<ReportType> for String {
    fn from(value: ReportType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportType::Form3 => write!(f, "3"),
            ReportType::Form4 => write!(f, "4"),
            ReportType::Form5 => write!(f, "5"),
            ReportType::Other(s) => write!(f, "{}", s),
        }
    }
}

pub static REPORT_TYPES: Lazy<String> = Lazy::new(|| {
    ReportType::iter()
        .filter(|t| !matches!(t, ReportType::Other(_)))
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
});

impl ReportType {
    pub fn list_types() -> &'static str {
        &REPORT_TYPES
    }

    /// Splits an amendment suffix off a raw form type: `4/A` is an amended `4`.
    pub fn parse_form(raw: &str) -> (ReportType, bool) {
        let trimmed = raw.trim();
        let upper = trimmed.to_uppercase();
        match upper.strip_suffix("/A") {
            Some(base) => (ReportType::from_base(base.trim(), trimmed), true),
            None => (ReportType::from_base(&upper, trimmed), false),
        }
    }

    /// Forms 3, 4 and 5 all embed the same ownership document schema.
    pub fn is_ownership_form(&self) -> bool {
        matches!(
            self,
            ReportType::Form3 | ReportType::Form4 | ReportType::Form5
        )
    }

    fn from_base(upper: &str, original: &str) -> ReportType {
        match upper {
            "3" => ReportType::Form3,
            "4" => ReportType::Form4,
            "5" => ReportType::Form5,
            _ => ReportType::Other(original.to_string()),
        }
    }
}

impl FromStr for ReportType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<ReportType, std::string::String> {
        let trimmed = s.trim();
        Ok(ReportType::from_base(&trimmed.to_uppercase(), trimmed))
    }
}
