use serde::{Deserialize, Serialize};

/// One `<DOCUMENT>` entry of a submission, as listed in the output bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exhibit {
    pub filename: String,
    pub doc_type: String,
    pub description: String,
    pub sequence: u32,
    pub accessible: bool,
    pub is_primary: bool,
}

/// An exhibit together with the body found between its `<TEXT>` tags.
#[derive(Debug, Clone)]
pub struct FilingDocument {
    pub exhibit: Exhibit,
    pub raw_text: String,
}

impl FilingDocument {
    pub fn extension(&self) -> Option<String> {
        self.exhibit
            .filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    pub fn is_html(&self) -> bool {
        matches!(self.extension().as_deref(), Some("htm") | Some("html"))
    }

    pub fn is_xml(&self) -> bool {
        matches!(self.extension().as_deref(), Some("xml"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SplitSubmission {
    pub documents: Vec<FilingDocument>,
    /// Index into `documents`.
    pub primary: Option<usize>,
}

impl SplitSubmission {
    pub fn primary_document(&self) -> Option<&FilingDocument> {
        self.primary.and_then(|idx| self.documents.get(idx))
    }

    pub fn exhibits(&self) -> Vec<Exhibit> {
        self.documents.iter().map(|d| d.exhibit.clone()).collect()
    }
}
