//! Shelfline Store - durable progress for the acquisition pipeline
//!
//! Output directory layout:
//! - `books.parquet`   one row per collected book (the resume source of truth)
//! - `counters.txt`    counters report, rewritten with every snapshot
//! - `statistics.txt`  aggregate statistics, written once at the end of a run
//! - `texts/`          saved full texts

pub mod filename;
pub mod report;
pub mod store;
pub mod table;

pub use filename::book_file_name;
pub use report::{RunStatistics, format_counters};
pub use store::{DEFAULT_ZSTD_LEVEL, ProgressStore, Restored};
