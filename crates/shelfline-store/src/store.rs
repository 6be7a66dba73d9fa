//! Progress store: snapshot / restore of results and counters

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use shelfline_core::{CollectedBook, CounterSnapshot};

use crate::report::{RunStatistics, format_counters};
use crate::table;

pub const BOOKS_FILE: &str = "books.parquet";
pub const COUNTERS_FILE: &str = "counters.txt";
pub const STATISTICS_FILE: &str = "statistics.txt";
pub const TEXTS_DIR: &str = "texts";

/// Default zstd level for the book table
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// State recovered from a previous run
#[derive(Debug, Default)]
pub struct Restored {
    /// Books to carry into this run (unique ids, table order)
    pub books: Vec<CollectedBook>,
    /// Rows dropped because their text file is gone; their ids get re-acquired
    pub missing_files: Vec<CollectedBook>,
    /// Duplicate rows dropped (should not happen, kept for the log)
    pub duplicates: usize,
}

impl Restored {
    /// Ids to pre-seed into the dedup registry
    pub fn claimed_ids(&self) -> Vec<String> {
        self.books.iter().map(|b| b.id.clone()).collect()
    }
}

/// Durable output directory. All writes are full rewrites through tmp + rename.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    root: PathBuf,
    zstd_level: i32,
}

/// Write `contents` to `path` atomically (tmp sibling + rename)
fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

/// Remove stale .tmp files left by a crash mid-write
fn cleanup_tmp_files(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

impl ProgressStore {
    /// Create the directory layout. Failure here is fatal for a run.
    pub fn open(root: impl Into<PathBuf>, zstd_level: i32) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(TEXTS_DIR))?;
        cleanup_tmp_files(&root)?;
        cleanup_tmp_files(&root.join(TEXTS_DIR))?;
        Ok(Self { root, zstd_level })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn books_path(&self) -> PathBuf {
        self.root.join(BOOKS_FILE)
    }

    /// Load the previous table, if any.
    ///
    /// With `verify_files`, rows whose text file no longer exists are dropped
    /// so the ids are acquired again instead of staying claimed forever.
    pub fn restore(&self, verify_files: bool) -> io::Result<Restored> {
        let path = self.books_path();
        if !path.exists() {
            return Ok(Restored::default());
        }
        let rows = table::read_books(&path)?;
        let mut restored = Restored::default();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        for book in rows {
            if !seen.insert(book.id.clone()) {
                restored.duplicates += 1;
                continue;
            }
            if verify_files && !self.root.join(&book.file_reference).is_file() {
                restored.missing_files.push(book);
            } else {
                restored.books.push(book);
            }
        }
        if restored.duplicates > 0 {
            log::warn!("Dropped {} duplicate rows from {}", restored.duplicates, path.display());
        }
        if !restored.missing_files.is_empty() {
            log::warn!(
                "{} books have no text file on disk and will be re-acquired",
                restored.missing_files.len()
            );
        }
        log::info!("Restored {} books from {}", restored.books.len(), path.display());
        Ok(restored)
    }

    /// Full rewrite of the table and the counters report
    pub fn snapshot(&self, books: &[CollectedBook], counters: &CounterSnapshot) -> io::Result<()> {
        table::write_books(&self.books_path(), books, self.zstd_level)?;
        write_atomic(
            &self.root.join(COUNTERS_FILE),
            format_counters(counters, books.len()).as_bytes(),
        )?;
        log::debug!("Snapshot written: {} books", books.len());
        Ok(())
    }

    /// Save a text under `texts/`, returning its reference relative to the root
    pub fn save_text(&self, file_name: &str, body: &str) -> io::Result<String> {
        let reference = format!("{TEXTS_DIR}/{file_name}");
        write_atomic(&self.root.join(&reference), body.as_bytes())?;
        Ok(reference)
    }

    pub fn write_statistics(&self, stats: &RunStatistics) -> io::Result<()> {
        write_atomic(
            &self.root.join(STATISTICS_FILE),
            stats.format_report().as_bytes(),
        )
    }
}
