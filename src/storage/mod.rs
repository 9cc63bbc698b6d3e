use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ownership::pipeline::FilingBundle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The bundle points at a record that is neither in the bundle nor
    /// already stored. Nothing from the bundle was written.
    #[error("constraint violation in filing {accession_number}: {message}")]
    ConstraintViolation {
        accession_number: String,
        message: String,
    },

    #[error("filing has no accession number")]
    MissingAccession,
}

/// What a single `persist` call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistSummary {
    pub accession_number: String,
    /// The filing had been stored before and its records were replaced.
    pub replaced: bool,
    pub entities_inserted: usize,
    pub entities_updated: usize,
    pub securities_inserted: usize,
    pub relationships: usize,
    pub transactions: usize,
    /// Positions written.
    pub positions: usize,
    /// Positions left alone because the store already had a newer revision.
    pub stale_positions: usize,
}

/// Persistence boundary for extracted filings.
///
/// Implementations upsert: filings by accession number, entities by CIK,
/// securities and derivative securities by their keys. Delivering the same
/// bundle twice leaves the store as if it had been delivered once.
#[async_trait]
pub trait FilingSink: Send + Sync {
    async fn persist(&self, bundle: &FilingBundle) -> Result<PersistSummary, StorageError>;
}

pub mod memory;

pub use self::memory::{MemoryStore, StoreCounts};
