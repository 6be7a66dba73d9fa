//! Runtime configuration for a harvest run

use std::path::PathBuf;
use std::time::Duration;

use shelfline_core::FilterRules;
use shelfline_store::DEFAULT_ZSTD_LEVEL;

use crate::query::{QueryTemplate, default_templates};

/// Everything a run needs, already resolved from file config and CLI flags
#[derive(Debug, Clone)]
pub struct Config {
    pub output_dir: PathBuf,
    /// Stop once the collection holds this many books
    pub target: usize,
    /// One search worker per year partition
    pub search_workers: usize,
    pub download_workers: usize,
    pub year_start: i32,
    pub year_end: i32,
    pub queue_capacity: usize,
    /// Push/pop wait between cancellation checks
    pub queue_timeout: Duration,
    /// Orchestrator polling interval
    pub poll_interval: Duration,
    pub snapshot_interval: Duration,
    /// Upper bound on waiting for workers after cancellation
    pub straggler_timeout: Duration,
    /// Page-depth ceiling per template pass
    pub max_pages: u32,
    pub page_size: u32,
    /// Page-level retries in the search workers
    pub max_retries: u32,
    pub backoff_base: Duration,
    /// Shortest text body accepted, in characters
    pub min_text_chars: usize,
    /// ISO 639-3 tag the language check expects
    pub target_language: String,
    pub templates: Vec<QueryTemplate>,
    pub filter: FilterRules,
    pub catalog_url: String,
    pub archive_url: String,
    pub zstd_level: i32,
    /// Drop restored rows whose text file is missing
    pub verify_files: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./books"),
            target: 1000,
            search_workers: 4,
            download_workers: 8,
            year_start: 1800,
            year_end: 1930,
            queue_capacity: 200,
            queue_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_secs(5),
            snapshot_interval: Duration::from_secs(60),
            straggler_timeout: Duration::from_secs(10),
            max_pages: 50,
            page_size: 100,
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
            min_text_chars: 10_000,
            target_language: "eng".to_string(),
            templates: default_templates(),
            filter: FilterRules::default(),
            catalog_url: "https://openlibrary.org".to_string(),
            archive_url: "https://archive.org".to_string(),
            zstd_level: DEFAULT_ZSTD_LEVEL,
            verify_files: true,
        }
    }
}

impl Config {
    /// Reject settings no run can make progress with
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.year_start <= self.year_end,
            "year_start ({}) is after year_end ({})",
            self.year_start,
            self.year_end
        );
        anyhow::ensure!(self.search_workers >= 1, "search_workers must be at least 1");
        anyhow::ensure!(
            self.download_workers >= 1,
            "download_workers must be at least 1"
        );
        anyhow::ensure!(!self.templates.is_empty(), "at least one query template is required");
        anyhow::ensure!(self.page_size >= 1, "page_size must be at least 1");
        anyhow::ensure!(
            !self.target_language.is_empty(),
            "target_language must not be empty"
        );
        Ok(())
    }
}
