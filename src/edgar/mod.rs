pub mod fetch;
pub mod parsing;
pub mod report;

pub use fetch::{EdgarFetcher, FetchError, FilingFetcher};
pub use report::ReportType;
