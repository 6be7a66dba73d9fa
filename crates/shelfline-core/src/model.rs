//! Records flowing through the pipeline

/// A catalog search hit. Immutable once produced by a search worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    /// Stable external identifier (e.g. `OL45804W`)
    pub id: String,
    pub title: String,
    pub author: String,
    pub publication_year: Option<i32>,
    pub subjects: Vec<String>,
}

/// A record that passed eligibility filtering and waits in the work queue.
///
/// `archival_hints` are archive identifiers the search result already exposed;
/// they are tried before anything the editions lookup returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCandidate {
    pub record: CatalogRecord,
    pub archival_hints: Vec<String>,
}

impl ResourceCandidate {
    pub fn new(record: CatalogRecord) -> Self {
        Self {
            record,
            archival_hints: Vec::new(),
        }
    }

    pub fn with_hints(record: CatalogRecord, archival_hints: Vec<String>) -> Self {
        Self {
            record,
            archival_hints,
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// One page of catalog search results
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Records paired with the archival identifiers listed on the hit
    pub records: Vec<(CatalogRecord, Vec<String>)>,
    pub has_more: bool,
}

/// Raw text body plus the URL it was fetched from
#[derive(Debug, Clone)]
pub struct AcquiredText {
    pub url: String,
    /// `Content-Type` header, when the server sent one
    pub content_type: Option<String>,
    pub body: String,
}

/// A validated, saved book. One row in the durable table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedBook {
    pub id: String,
    pub title: String,
    pub author: String,
    pub year: Option<i32>,
    /// Archival identifier the text was taken from
    pub source_id: String,
    /// Path of the saved text file, relative to the output directory
    pub file_reference: String,
    pub word_count: u64,
}

/// Whitespace-delimited word count
pub fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}
