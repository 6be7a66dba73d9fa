//! `shelfline stats` - report on an existing collection without fetching

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use shelfline_core::CounterSnapshot;
use shelfline_store::RunStatistics;
use shelfline_store::store::{BOOKS_FILE, STATISTICS_FILE};
use shelfline_store::table::read_books;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Output directory of a previous run (default: from config)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Also rewrite statistics.txt in the output directory
    #[arg(long)]
    pub write: bool,
}

pub fn run(args: StatsArgs, config: &Config) -> Result<()> {
    let dir = args.dir.unwrap_or_else(|| config.output.dir.clone());
    let path = dir.join(BOOKS_FILE);
    if !path.exists() {
        eprintln!("No collection at {}", dir.display());
        return Ok(());
    }

    let books =
        read_books(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    // Counters are per run and only kept as a text report, so they are not restored here.
    let stats = RunStatistics::compute(&books, CounterSnapshot::default());
    println!("{}", stats.format_report());

    if args.write {
        let out = dir.join(STATISTICS_FILE);
        std::fs::write(&out, stats.format_report())
            .with_context(|| format!("Failed to write {}", out.display()))?;
        log::info!("Wrote {}", out.display());
    }
    Ok(())
}
