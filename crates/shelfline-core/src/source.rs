//! Capabilities the pipeline needs from the outside world.
//!
//! Workers only see these traits; the HTTP implementations live in
//! `shelfline-harvest`, tests plug in in-memory fakes.

use crate::error::FetchError;
use crate::model::{AcquiredText, SearchPage};

/// Catalog search: one page of hits for an opaque query string
pub trait CatalogSearch: Send + Sync {
    fn search(&self, query: &str, page: u32) -> Result<SearchPage, FetchError>;
}

/// Editions indirection: catalog id → archival full-text identifiers (ranked)
pub trait ResourceResolver: Send + Sync {
    fn resolve_resources(&self, catalog_id: &str) -> Result<Vec<String>, FetchError>;
}

/// Full-text fetch of one archival identifier in one representation
pub trait TextFetcher: Send + Sync {
    fn fetch_text(&self, archival_id: &str, variant: TextVariant)
    -> Result<AcquiredText, FetchError>;
}

/// Representations of a full text in the archive, in ladder order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextVariant {
    /// OCR text served from the download endpoint
    DjvuDownload,
    /// OCR text served from the stream endpoint
    DjvuStream,
    /// Plain text upload
    PlainText,
}

impl TextVariant {
    /// The fallback ladder, tried left to right
    pub const LADDER: [TextVariant; 3] = [Self::DjvuDownload, Self::DjvuStream, Self::PlainText];

    /// URL of this representation under the archive base URL
    pub fn url(self, archive_base: &str, archival_id: &str) -> String {
        let base = archive_base.trim_end_matches('/');
        match self {
            Self::DjvuDownload => format!("{base}/download/{archival_id}/{archival_id}_djvu.txt"),
            Self::DjvuStream => format!("{base}/stream/{archival_id}/{archival_id}_djvu.txt"),
            Self::PlainText => format!("{base}/download/{archival_id}/{archival_id}.txt"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::DjvuDownload => "djvu-download",
            Self::DjvuStream => "djvu-stream",
            Self::PlainText => "plain-text",
        }
    }
}

impl std::fmt::Display for TextVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
