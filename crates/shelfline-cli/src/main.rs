//! shelfline - collect public-domain English fiction from Open Library and the Internet Archive
//!
//! Searches the catalog by publication year, downloads full texts from the
//! archive, and keeps a resumable collection in Parquet plus plain-text files.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;
use shelfline_harvest::RunState;

#[derive(Parser)]
#[command(name = "shelfline")]
#[command(about = "Concurrent public-domain book acquisition")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./shelfline.toml or ~/.config/shelfline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Maximum retry attempts for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Collect books until the target is reached
    Run(cmd::run::RunArgs),
    /// Show statistics for an existing collection
    Stats(cmd::stats::StatsArgs),
    /// Show current configuration
    Config,
}

/// First SIGINT/SIGTERM asks the run to wind down, a second one exits immediately
fn setup_signal_handler() {
    // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGTERM, || {
            if shelfline_core::shutdown_token().swap_cancel() {
                std::process::exit(130);
            }
        })
        .expect("Failed to register SIGTERM handler");
        signal_hook::low_level::register(signal_hook::consts::SIGINT, || {
            if shelfline_core::shutdown_token().swap_cancel() {
                std::process::exit(130);
            }
        })
        .expect("Failed to register SIGINT handler");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    shelfline_core::init_logging(cli.quiet, cli.debug);

    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    let mut config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };
    if let Some(n) = cli.max_retries {
        config.http.max_retries = n;
    }
    shelfline_core::set_http_config(config.http.to_http_config());

    match cli.command {
        Command::Run(args) => {
            setup_signal_handler();
            let summary = cmd::run::run(args, &config)?;
            if summary.reason == RunState::Interrupted {
                Ok(ExitCode::from(130))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Command::Stats(args) => {
            cmd::stats::run(args, &config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let h = &config.harvest;
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec![
        "Output directory",
        &config.output.dir.display().to_string(),
    ]);
    table.add_row(vec![
        "Compression level",
        &config.output.compression_level.to_string(),
    ]);
    table.add_row(vec![
        "Verify files",
        if config.output.verify_files { "yes" } else { "no" },
    ]);
    table.add_row(vec![
        "Workers",
        &format!(
            "{} search, {} download (queue {})",
            config.workers.search, config.workers.download, config.workers.queue_capacity
        ),
    ]);
    table.add_row(vec!["Target", &h.target.to_string()]);
    table.add_row(vec!["Years", &format!("{}-{}", h.year_start, h.year_end)]);
    table.add_row(vec![
        "Pages",
        &format!("{} x {} per template", h.max_pages, h.page_size),
    ]);
    table.add_row(vec![
        "Templates",
        &if h.templates.is_empty() {
            "built-in".to_string()
        } else {
            h.templates.len().to_string()
        },
    ]);
    table.add_row(vec!["Language", &h.target_language]);
    table.add_row(vec!["Min text", &format!("{} chars", h.min_text_chars)]);
    table.add_row(vec!["Catalog URL", &h.catalog_url]);
    table.add_row(vec!["Archive URL", &h.archive_url]);
    table.add_row(vec![
        "Request timeout",
        &format!("{}s", config.http.request_timeout),
    ]);
    table.add_row(vec!["Max retries", &config.http.max_retries.to_string()]);

    eprintln!("\n{table}");
}
