use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a single record (an owner, a transaction, a holding) was left out.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SkipReason {
    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("unparseable date in `{field}`: {value}")]
    UnparseableDate { field: String, value: String },

    #[error("invalid acquired/disposed code: {0}")]
    InvalidAcquiredDisposed(String),

    #[error("security `{0}` could not be resolved")]
    UnresolvedSecurity(String),

    #[error("derivative security for `{0}` could not be resolved")]
    UnresolvedDerivativeSecurity(String),

    #[error("no relationship to attach the record to")]
    UnresolvedRelationship,

    #[error("ownership XML could not be parsed: {0}")]
    XmlParse(String),

    #[error("ledger rejected transaction: {0}")]
    Ledger(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Document,
    Entities,
    Securities,
    Transactions,
    Ledger,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Document => write!(f, "document"),
            Stage::Entities => write!(f, "entities"),
            Stage::Securities => write!(f, "securities"),
            Stage::Transactions => write!(f, "transactions"),
            Stage::Ledger => write!(f, "ledger"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub stage: Stage,
    /// Where the record came from, e.g. `nonDerivativeTransaction[2]`.
    pub locator: String,
    pub reason: SkipReason,
}

/// Per-filing tally of what made it through extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub accession_number: String,
    pub accepted: usize,
    pub duplicates_dropped: usize,
    pub skipped: Vec<SkippedRecord>,
}

impl ExtractionReport {
    pub fn new(accession_number: &str) -> Self {
        Self {
            accession_number: accession_number.to_string(),
            ..Self::default()
        }
    }

    /// Folds one record's outcome into the report, handing back the value on
    /// success.
    pub fn record<T>(
        &mut self,
        stage: Stage,
        locator: impl Into<String>,
        outcome: Result<T, SkipReason>,
    ) -> Option<T> {
        match outcome {
            Ok(value) => {
                self.accepted += 1;
                Some(value)
            }
            Err(reason) => {
                self.skip(stage, locator, reason);
                None
            }
        }
    }

    pub fn skip(&mut self, stage: Stage, locator: impl Into<String>, reason: SkipReason) {
        let locator = locator.into();
        log::warn!(
            "[{}] skipped {} at {}: {}",
            self.accession_number,
            stage,
            locator,
            reason
        );
        self.skipped.push(SkippedRecord {
            stage,
            locator,
            reason,
        });
    }

    pub fn skipped_in(&self, stage: Stage) -> impl Iterator<Item = &SkippedRecord> {
        self.skipped.iter().filter(move |s| s.stage == stage)
    }
}
