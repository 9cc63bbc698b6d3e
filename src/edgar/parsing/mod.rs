pub mod document;
pub mod header;
pub mod text;
pub mod types;
pub mod values;

pub use document::split_submission;
pub use header::{parse_header, HeaderFields};
pub use types::{Exhibit, FilingDocument, SplitSubmission};
