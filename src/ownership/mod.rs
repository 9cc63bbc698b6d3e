//! Form 3/4/5 extraction: entities, relationships, transactions, securities
//! and the position ledger built from them.

pub mod entity;
pub mod footnote;
pub mod ledger;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod relationship;
pub mod report;
pub mod security;
pub mod transaction;
pub mod xml;

pub use ledger::{LedgerError, PositionLedger};
pub use pipeline::{extract, FilingBundle, FilingContext, FilingProcessor};
pub use report::{ExtractionReport, SkipReason};
