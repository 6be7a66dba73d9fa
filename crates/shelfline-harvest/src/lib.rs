//! Shelfline Harvest - the concurrent acquisition pipeline
//!
//! Search workers page through Open Library, one per year partition, and push
//! eligible candidates into a bounded queue. Download workers claim each
//! candidate, walk the Internet Archive fallback ladder and keep the first
//! text that validates. The runner watches progress, snapshots it, and
//! finalizes on target, interrupt or exhaustion.

pub mod api;
pub mod config;
pub mod consumer;
pub mod producer;
pub mod query;
pub mod runner;

pub use api::{InternetArchive, OpenLibrary};
pub use config::Config;
pub use consumer::{ItemError, Outcome, Rejection};
pub use query::{QueryTemplate, default_templates, partition_years};
pub use runner::{Capabilities, RunState, RunSummary, run, run_until};
