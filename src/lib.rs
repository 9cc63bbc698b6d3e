pub mod core;
pub mod edgar;
pub mod ownership;
pub mod storage;

// Re-exports
pub use self::core::config::IngestConfig;
pub use ownership::ledger::PositionLedger;
pub use ownership::pipeline::{extract, FilingBundle, FilingContext, FilingProcessor};
pub use storage::{FilingSink, MemoryStore};
