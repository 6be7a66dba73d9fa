//! `shelfline run` - acquire books until the target, an interrupt, or exhaustion

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use shelfline_harvest::{Capabilities, RunState, RunSummary};

use crate::config::Config;

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of books to collect
    #[arg(short, long)]
    pub target: Option<usize>,

    /// Search workers (one per year partition)
    #[arg(long)]
    pub search_workers: Option<usize>,

    /// Download workers
    #[arg(long)]
    pub download_workers: Option<usize>,

    /// First publication year searched
    #[arg(long)]
    pub year_start: Option<i32>,

    /// Last publication year searched
    #[arg(long)]
    pub year_end: Option<i32>,

    /// Zstd compression level (1-22)
    #[arg(short, long)]
    pub zstd_level: Option<i32>,

    /// Trust restored rows without checking their text files
    #[arg(long)]
    pub no_verify_files: bool,
}

/// Config file values with CLI overrides applied
pub fn resolve(args: &RunArgs, config: &Config) -> shelfline_harvest::Config {
    let mut resolved = config.to_harvest();
    if let Some(dir) = &args.output {
        resolved.output_dir = dir.clone();
    }
    if let Some(n) = args.target {
        resolved.target = n;
    }
    if let Some(n) = args.search_workers {
        resolved.search_workers = n;
    }
    if let Some(n) = args.download_workers {
        resolved.download_workers = n;
    }
    if let Some(y) = args.year_start {
        resolved.year_start = y;
    }
    if let Some(y) = args.year_end {
        resolved.year_end = y;
    }
    if let Some(level) = args.zstd_level {
        resolved.zstd_level = level;
    }
    if args.no_verify_files {
        resolved.verify_files = false;
    }
    resolved
}

pub fn run(args: RunArgs, config: &Config) -> Result<RunSummary> {
    let resolved = resolve(&args, config);
    log::info!(
        "Collecting {} books from {}-{} into {}",
        resolved.target,
        resolved.year_start,
        resolved.year_end,
        resolved.output_dir.display()
    );

    let summary = shelfline_harvest::run(&resolved, Capabilities::live(&resolved))?;

    eprintln!("\n{}", summary.format_table());
    summary.log();
    if summary.reason == RunState::Interrupted {
        log::warn!("Run interrupted; progress saved, rerun to resume");
    }
    Ok(summary)
}
