//! Orchestrator: start workers, watch progress, finalize

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use shelfline_core::format::fmt_num;
use shelfline_core::work_queue;
use shelfline_core::{
    CancelToken, CatalogSearch, CounterSnapshot, Counters, DedupRegistry, EligibilityFilter,
    LanguageCheck, LanguageClassifier, ResourceResolver, ResultSet, TextFetcher,
    WhatlangClassifier, shutdown_token,
};
use shelfline_store::{ProgressStore, RunStatistics};

use crate::api::{InternetArchive, OpenLibrary};
use crate::config::Config;
use crate::consumer::{DownloadContext, run_download_worker};
use crate::producer::{SearchContext, SearchSettings, run_search_worker, sleep_unless_cancelled};
use crate::query::partition_years;

/// Poll step while waiting for stragglers
const JOIN_POLL: Duration = Duration::from_millis(20);

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// Collection reached the configured target
    TargetReached,
    /// External stop signal
    Interrupted,
    /// Search ran dry and the queue drained
    Exhausted,
    Finalizing,
    Stopped,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::TargetReached => "target reached",
            Self::Interrupted => "interrupted",
            Self::Exhausted => "exhausted",
            Self::Finalizing => "finalizing",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

fn transition(state: &mut RunState, next: RunState) {
    log::debug!("run state: {state} -> {next}");
    *state = next;
}

/// External services a run talks to
#[derive(Clone)]
pub struct Capabilities {
    pub catalog: Arc<dyn CatalogSearch>,
    pub resolver: Arc<dyn ResourceResolver>,
    pub fetcher: Arc<dyn TextFetcher>,
    pub classifier: Arc<dyn LanguageClassifier>,
}

impl Capabilities {
    /// Open Library + Internet Archive over HTTP, `whatlang` for language
    pub fn live(config: &Config) -> Self {
        let catalog = Arc::new(OpenLibrary::new(&config.catalog_url, config.page_size));
        Self {
            catalog: catalog.clone(),
            resolver: catalog,
            fetcher: Arc::new(InternetArchive::new(&config.archive_url)),
            classifier: Arc::new(WhatlangClassifier),
        }
    }
}

/// What a finished run reports
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Why the run stopped: target reached, interrupted or exhausted
    pub reason: RunState,
    pub collected: usize,
    pub new_this_run: usize,
    pub counters: CounterSnapshot,
    /// Workers still running when finalization gave up waiting
    pub abandoned_workers: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn format_table(&self) -> String {
        let c = &self.counters;
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new(format!("Run ({})", self.reason)).fg(Color::Cyan),
                Cell::new("Value").fg(Color::Cyan),
            ]);
        let rows = [
            ("Collection", fmt_num(self.collected)),
            ("New this run", fmt_num(self.new_this_run)),
            ("Searched", fmt_num(c.searched)),
            ("Excluded (author)", fmt_num(c.excluded_author)),
            ("Attempted", fmt_num(c.attempted)),
            ("Excluded (language)", fmt_num(c.excluded_language)),
            ("Failed", fmt_num(c.failed)),
            ("Downloaded", fmt_num(c.downloaded)),
            ("Elapsed", format!("{:.1}s", self.elapsed.as_secs_f64())),
        ];
        for (name, value) in rows {
            table.add_row(vec![Cell::new(name), Cell::new(value)]);
        }
        table.to_string()
    }

    pub fn log(&self) {
        log::info!(
            "Run {}: {} books ({} new), {} attempted, {} failed in {:.1}s",
            self.reason,
            fmt_num(self.collected),
            fmt_num(self.new_this_run),
            fmt_num(self.counters.attempted),
            fmt_num(self.counters.failed),
            self.elapsed.as_secs_f64()
        );
    }
}

fn spawn_named(
    name: String,
    body: impl FnOnce() + Send + 'static,
) -> anyhow::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .with_context(|| format!("Failed to spawn {name}"))
}

type WorkerHandles = (Vec<JoinHandle<()>>, Vec<JoinHandle<()>>);

/// One search worker per year partition plus the download pool
fn spawn_workers(
    config: &Config,
    search: &SearchContext,
    download: &DownloadContext,
) -> anyhow::Result<WorkerHandles> {
    let partitions = partition_years(config.year_start, config.year_end, config.search_workers);
    let mut searchers = Vec::with_capacity(partitions.len());
    for (i, years) in partitions.into_iter().enumerate() {
        let ctx = search.clone();
        searchers.push(spawn_named(format!("search-{i}"), move || {
            run_search_worker(&ctx, years);
        })?);
    }
    let mut downloaders = Vec::with_capacity(config.download_workers);
    for i in 0..config.download_workers {
        let ctx = download.clone();
        downloaders.push(spawn_named(format!("download-{i}"), move || {
            run_download_worker(&ctx);
        })?);
    }
    Ok((searchers, downloaders))
}

/// Wait until every handle finishes or `timeout` passes. Returns how many were abandoned.
fn join_with_deadline(handles: Vec<JoinHandle<()>>, timeout: Duration) -> usize {
    let deadline = Instant::now() + timeout;
    let mut pending = handles;
    loop {
        let (done, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|h| h.is_finished());
        for handle in done {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                log::error!("{name} panicked");
            }
        }
        pending = rest;
        if pending.is_empty() || Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(JOIN_POLL);
    }
    if !pending.is_empty() {
        let names: Vec<&str> = pending
            .iter()
            .map(|h| h.thread().name().unwrap_or("worker"))
            .collect();
        log::warn!("Abandoning {} workers still running: {names:?}", pending.len());
    }
    pending.len()
}

/// Run until the target is reached, the search runs dry, or the process-wide
/// shutdown token is set.
pub fn run(config: &Config, capabilities: Capabilities) -> anyhow::Result<RunSummary> {
    run_until(config, capabilities, &shutdown_token())
}

/// [`run`] with an explicit stop token
pub fn run_until(
    config: &Config,
    capabilities: Capabilities,
    stop: &CancelToken,
) -> anyhow::Result<RunSummary> {
    let started = Instant::now();
    let mut state = RunState::Idle;
    config.validate()?;

    let store = ProgressStore::open(&config.output_dir, config.zstd_level).with_context(|| {
        format!("Cannot open output directory {}", config.output_dir.display())
    })?;
    let restored = store
        .restore(config.verify_files)
        .context("Cannot read previous results")?;

    let counters = Arc::new(Counters::new());
    let registry = Arc::new(DedupRegistry::new());
    registry.seed(restored.claimed_ids());
    let restored_count = restored.books.len();
    let results = Arc::new(ResultSet::from_books(restored.books));

    log::info!(
        "shelfline starting: target={}, restored={}, search_workers={}, download_workers={}, years={}-{}",
        config.target,
        restored_count,
        config.search_workers,
        config.download_workers,
        config.year_start,
        config.year_end
    );

    let cancel = CancelToken::new();
    let mut search_handles = Vec::new();
    let mut download_handles = Vec::new();

    let reason = if restored_count >= config.target {
        log::info!("Target already met by restored results");
        RunState::TargetReached
    } else {
        transition(&mut state, RunState::Running);
        let (tx, rx) = work_queue::bounded(config.queue_capacity);

        let search = SearchContext {
            catalog: capabilities.catalog.clone(),
            registry: registry.clone(),
            counters: counters.clone(),
            filter: EligibilityFilter::new(config.filter.clone(), counters.clone()),
            queue: tx,
            cancel: cancel.clone(),
            templates: config.templates.iter().cloned().collect(),
            settings: SearchSettings {
                max_pages: config.max_pages,
                max_retries: config.max_retries,
                backoff_base: config.backoff_base,
                queue_timeout: config.queue_timeout,
            },
        };
        let download = DownloadContext {
            resolver: capabilities.resolver.clone(),
            fetcher: capabilities.fetcher.clone(),
            registry: registry.clone(),
            counters: counters.clone(),
            results: results.clone(),
            language: LanguageCheck::new(
                capabilities.classifier.clone(),
                config.target_language.clone(),
                counters.clone(),
            ),
            store: store.clone(),
            queue: rx,
            cancel: cancel.clone(),
            min_text_chars: config.min_text_chars,
            queue_timeout: config.queue_timeout,
        };

        match spawn_workers(config, &search, &download) {
            Ok((searchers, downloaders)) => {
                search_handles = searchers;
                download_handles = downloaders;
            }
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        }
        // The queue closes once every search worker has dropped its sender
        drop(search);
        let probe = download.queue.clone();
        drop(download);

        let mut last_snapshot = Instant::now();
        loop {
            sleep_unless_cancelled(config.poll_interval, stop);
            let collected = results.len();
            if collected >= config.target {
                break RunState::TargetReached;
            }
            if stop.is_cancelled() {
                break RunState::Interrupted;
            }
            if download_handles.iter().all(|h| h.is_finished()) {
                break RunState::Exhausted;
            }

            let c = counters.snapshot();
            log::info!(
                "progress: {}/{} collected, {} queued, {} searched, {} attempted, {} failed",
                fmt_num(collected),
                fmt_num(config.target),
                fmt_num(probe.len()),
                fmt_num(c.searched),
                fmt_num(c.attempted),
                fmt_num(c.failed)
            );
            if last_snapshot.elapsed() >= config.snapshot_interval {
                if let Err(e) = store.snapshot(&results.snapshot(), &c) {
                    log::error!("Periodic snapshot failed: {e}");
                }
                last_snapshot = Instant::now();
            }
        }
    };
    transition(&mut state, reason);
    log::info!("Stopping: {reason}");

    transition(&mut state, RunState::Finalizing);
    cancel.cancel();
    let mut handles = search_handles;
    handles.append(&mut download_handles);
    let abandoned = join_with_deadline(handles, config.straggler_timeout);

    let books = results.snapshot();
    let final_counters = counters.snapshot();
    store
        .snapshot(&books, &final_counters)
        .context("Failed to write final snapshot")?;
    let stats = RunStatistics::compute(&books, final_counters);
    if let Err(e) = store.write_statistics(&stats) {
        log::warn!("Cannot write statistics report: {e}");
    }
    stats.log();

    transition(&mut state, RunState::Stopped);
    Ok(RunSummary {
        reason,
        collected: books.len(),
        new_this_run: books.len().saturating_sub(restored_count),
        counters: final_counters,
        abandoned_workers: abandoned,
        elapsed: started.elapsed(),
    })
}
