//! Search workers: page through the catalog for one year partition

use std::ops::RangeInclusive;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;
use shelfline_core::retry::backoff_duration;
use shelfline_core::{
    CancelToken, CatalogSearch, Counter, Counters, DedupRegistry, EligibilityFilter, PushError,
    ResourceCandidate, WorkSender,
};

use crate::consumer::panic_message;
use crate::query::QueryTemplate;

/// Granularity of cancellable sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Sleep for `total`, returning early (false) once `cancel` is set
pub(crate) fn sleep_unless_cancelled(total: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

/// Paging limits shared by all search workers
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub max_pages: u32,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub queue_timeout: Duration,
}

/// Shared handles a search worker runs against
#[derive(Clone)]
pub struct SearchContext {
    pub catalog: Arc<dyn CatalogSearch>,
    pub registry: Arc<DedupRegistry>,
    pub counters: Arc<Counters>,
    pub filter: EligibilityFilter,
    pub queue: WorkSender<ResourceCandidate>,
    pub cancel: CancelToken,
    pub templates: Arc<[QueryTemplate]>,
    pub settings: SearchSettings,
}

/// Why a search worker returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchExit {
    /// Every template came up empty twice in a row
    Exhausted,
    Cancelled,
    /// Download side hung up
    QueueClosed,
}

/// Per-worker totals, logged when the worker exits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchStats {
    pub pages: usize,
    pub records: usize,
    pub enqueued: usize,
    pub passes: usize,
    /// Template passes cut short by a panic
    pub panics: usize,
    pub exit: SearchExit,
}

/// Where a template stands within this worker's partition
#[derive(Debug, Clone, Copy)]
enum Cursor {
    /// Next page to request
    Page(u32),
    /// The catalog has nothing more for this template
    Done,
}

/// Outcome of one template pass
enum Pass {
    /// Pass ended normally; true if it enqueued anything new
    Finished(bool),
    Stopped(SearchExit),
}

struct SearchWorker<'a> {
    ctx: &'a SearchContext,
    years: &'a RangeInclusive<i32>,
    seen: FxHashSet<String>,
    pages: usize,
    records: usize,
    enqueued: usize,
}

impl SearchWorker<'_> {
    /// Filter one record and enqueue it if eligible. Err means stop the worker.
    fn offer(&mut self, candidate: ResourceCandidate) -> Result<bool, SearchExit> {
        self.records += 1;
        self.ctx.counters.incr(Counter::Searched);
        let record = &candidate.record;

        if !self.seen.insert(record.id.clone()) || self.ctx.registry.contains(&record.id) {
            return Ok(false);
        }
        if self.ctx.filter.is_excluded_author(&record.author) {
            log::trace!("excluded author: {} ({})", record.author, record.id);
            return Ok(false);
        }
        if !self.ctx.filter.is_eligible_book(&record.title, record.subjects.as_slice()) {
            log::trace!("ineligible: {} ({})", record.title, record.id);
            return Ok(false);
        }

        match self
            .ctx
            .queue
            .push(candidate, self.ctx.settings.queue_timeout, &self.ctx.cancel)
        {
            Ok(()) => {
                self.enqueued += 1;
                Ok(true)
            }
            Err(PushError::Cancelled(_)) => Err(SearchExit::Cancelled),
            Err(PushError::Closed(_)) => Err(SearchExit::QueueClosed),
        }
    }

    /// Run one template from its cursor until it runs dry, fails or hits the page ceiling
    fn pass(&mut self, template: &QueryTemplate, cursor: &mut Cursor) -> Pass {
        let Cursor::Page(start) = *cursor else {
            return Pass::Finished(false);
        };
        let ctx = self.ctx;
        let settings = &ctx.settings;
        let query = template.render(self.years);
        let mut found = false;
        let mut page = start;

        while page < start.saturating_add(settings.max_pages.max(1)) {
            if ctx.cancel.is_cancelled() {
                return Pass::Stopped(SearchExit::Cancelled);
            }

            let mut attempt = 0u32;
            let result = loop {
                match ctx.catalog.search(&query, page) {
                    Ok(result) => break result,
                    Err(e) if e.is_retryable() && attempt < settings.max_retries => {
                        attempt += 1;
                        let delay = backoff_duration(settings.backoff_base, attempt);
                        log::warn!(
                            "search page {page} failed: {e}, retry {attempt}/{} in {delay:?}",
                            settings.max_retries
                        );
                        if !sleep_unless_cancelled(delay, &ctx.cancel) {
                            return Pass::Stopped(SearchExit::Cancelled);
                        }
                    }
                    Err(e) if e.is_retryable() => {
                        // Resume from this page on the next rotation
                        log::warn!("search page {page} failed: {e}, rotating template");
                        *cursor = Cursor::Page(page);
                        return Pass::Finished(found);
                    }
                    Err(e) => {
                        log::warn!("search page {page} failed: {e}, dropping template");
                        *cursor = Cursor::Done;
                        return Pass::Finished(found);
                    }
                }
            };

            self.pages += 1;
            if result.records.is_empty() {
                *cursor = Cursor::Done;
                return Pass::Finished(found);
            }
            for (record, hints) in result.records {
                match self.offer(ResourceCandidate::with_hints(record, hints)) {
                    Ok(new) => found |= new,
                    Err(exit) => return Pass::Stopped(exit),
                }
            }
            if !result.has_more {
                *cursor = Cursor::Done;
                return Pass::Finished(found);
            }
            page += 1;
        }

        log::debug!("page ceiling reached at page {page}, rotating template");
        *cursor = Cursor::Page(page);
        Pass::Finished(found)
    }
}

/// Search worker body: rotate templates over `years` until exhausted or cancelled.
pub fn run_search_worker(ctx: &SearchContext, years: RangeInclusive<i32>) -> SearchStats {
    let templates = ctx.templates.clone();
    let mut cursors = vec![Cursor::Page(1); templates.len()];
    let idle_limit = 2 * templates.len();
    let mut worker = SearchWorker {
        ctx,
        years: &years,
        seen: FxHashSet::default(),
        pages: 0,
        records: 0,
        enqueued: 0,
    };
    let mut passes = 0usize;
    let mut idle_passes = 0usize;
    let mut panics = 0usize;

    let exit = if templates.is_empty() {
        SearchExit::Exhausted
    } else {
        loop {
            if ctx.cancel.is_cancelled() {
                break SearchExit::Cancelled;
            }
            let slot = passes % templates.len();
            passes += 1;
            let pass = catch_unwind(AssertUnwindSafe(|| {
                worker.pass(&templates[slot], &mut cursors[slot])
            }))
            .unwrap_or_else(|payload| {
                panics += 1;
                log::error!(
                    "search {}-{} template {:?} panicked: {}",
                    years.start(),
                    years.end(),
                    templates[slot].as_str(),
                    panic_message(payload.as_ref())
                );
                Pass::Finished(false)
            });
            match pass {
                Pass::Finished(true) => idle_passes = 0,
                Pass::Finished(false) => {
                    idle_passes += 1;
                    if idle_passes >= idle_limit {
                        break SearchExit::Exhausted;
                    }
                }
                Pass::Stopped(exit) => break exit,
            }
        }
    };

    let stats = SearchStats {
        pages: worker.pages,
        records: worker.records,
        enqueued: worker.enqueued,
        passes,
        panics,
        exit,
    };
    log::info!(
        "search {}-{} finished ({:?}): {} pages, {} records, {} enqueued, {} panics",
        years.start(),
        years.end(),
        stats.exit,
        stats.pages,
        stats.records,
        stats.enqueued,
        stats.panics
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use shelfline_core::work_queue::{self, WorkReceiver};
    use shelfline_core::{CatalogRecord, FetchError, FilterRules, SearchPage};

    /// Serves canned pages per (query, page); records every request
    #[derive(Default)]
    struct Catalog {
        pages: HashMap<(String, u32), SearchPage>,
        failures: Mutex<HashMap<(String, u32), u32>>,
        /// Pages answering with a malformed body every time
        undecodable: HashSet<(String, u32)>,
        /// Pages that panic on their first request only
        panic_once: Mutex<HashSet<(String, u32)>>,
        calls: Mutex<Vec<(String, u32)>>,
    }

    impl CatalogSearch for Catalog {
        fn search(&self, query: &str, page: u32) -> Result<SearchPage, FetchError> {
            let key = (query.to_string(), page);
            self.calls.lock().unwrap().push(key.clone());
            if self.panic_once.lock().unwrap().remove(&key) {
                panic!("catalog returned garbage");
            }
            if self.undecodable.contains(&key) {
                return Err(FetchError::Decode("expected value at line 1".to_string()));
            }
            if let Some(left) = self.failures.lock().unwrap().get_mut(&key) {
                if *left > 0 {
                    *left -= 1;
                    return Err(FetchError::Timeout);
                }
            }
            Ok(self.pages.get(&key).cloned().unwrap_or_default())
        }
    }

    fn record(id: &str, author: &str, title: &str) -> CatalogRecord {
        CatalogRecord {
            id: id.to_string(),
            title: title.to_string(),
            author: author.to_string(),
            publication_year: Some(1880),
            subjects: vec!["Fiction".to_string()],
        }
    }

    fn page(records: Vec<CatalogRecord>, has_more: bool) -> SearchPage {
        SearchPage {
            records: records.into_iter().map(|r| (r, vec![])).collect(),
            has_more,
        }
    }

    fn context(
        catalog: Catalog,
        templates: &[&str],
        capacity: usize,
    ) -> (SearchContext, WorkReceiver<ResourceCandidate>, Arc<Catalog>) {
        let catalog = Arc::new(catalog);
        let counters = Arc::new(Counters::new());
        let (tx, rx) = work_queue::bounded(capacity);
        let ctx = SearchContext {
            catalog: catalog.clone(),
            registry: Arc::new(DedupRegistry::new()),
            counters: counters.clone(),
            filter: EligibilityFilter::new(FilterRules::default(), counters),
            queue: tx,
            cancel: CancelToken::new(),
            templates: templates.iter().map(|t| QueryTemplate::new(*t)).collect(),
            settings: SearchSettings {
                max_pages: 5,
                max_retries: 2,
                backoff_base: Duration::from_millis(1),
                queue_timeout: Duration::from_millis(10),
            },
        };
        (ctx, rx, catalog)
    }

    fn drain(rx: &WorkReceiver<ResourceCandidate>) -> Vec<String> {
        let mut ids = Vec::new();
        while let Ok(c) = rx.pop(Duration::from_millis(1)) {
            ids.push(c.record.id);
        }
        ids
    }

    #[test]
    fn filters_and_enqueues_eligible_records() {
        let mut catalog = Catalog::default();
        catalog.pages.insert(
            ("q".to_string(), 1),
            page(
                vec![
                    record("OL1W", "Charles Dickens", "Bleak House"),
                    record("OL2W", "Leo Tolstoy", "Resurrection"),
                    record("OL3W", "Thomas Hardy", "Moscow Nights"),
                ],
                true,
            ),
        );
        catalog.pages.insert(
            ("q".to_string(), 2),
            page(vec![record("OL4W", "George Eliot", "Middlemarch")], false),
        );
        let (ctx, rx, _) = context(catalog, &["q"], 10);

        let stats = run_search_worker(&ctx, 1850..=1900);
        assert_eq!(stats.exit, SearchExit::Exhausted);
        assert_eq!(stats.enqueued, 2);
        assert_eq!(drain(&rx), vec!["OL1W", "OL4W"]);

        let c = ctx.counters.snapshot();
        assert_eq!(c.searched, 4);
        assert_eq!(c.excluded_author, 1);
    }

    #[test]
    fn registry_members_are_skipped() {
        let mut catalog = Catalog::default();
        catalog.pages.insert(
            ("q".to_string(), 1),
            page(vec![record("OL1W", "Anne Bronte", "Agnes Grey")], false),
        );
        let (ctx, rx, _) = context(catalog, &["q"], 10);
        ctx.registry.seed(["OL1W".to_string()]);

        run_search_worker(&ctx, 1850..=1900);
        assert!(drain(&rx).is_empty());
        assert_eq!(ctx.counters.snapshot().searched, 1);
    }

    #[test]
    fn stops_after_two_idle_rotations() {
        let (ctx, _rx, catalog) = context(Catalog::default(), &["a", "b", "c"], 10);
        let stats = run_search_worker(&ctx, 1850..=1900);
        assert_eq!(stats.exit, SearchExit::Exhausted);
        assert_eq!(stats.passes, 6);
        // Exhausted templates are not queried again
        assert_eq!(catalog.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn template_years_are_rendered() {
        let (ctx, _rx, catalog) = context(Catalog::default(), &["y:[{start} TO {end}]"], 10);
        run_search_worker(&ctx, 1850..=1875);
        assert_eq!(catalog.calls.lock().unwrap()[0].0, "y:[1850 TO 1875]");
    }

    #[test]
    fn transient_failure_retries_same_page() {
        let mut catalog = Catalog::default();
        catalog.pages.insert(
            ("q".to_string(), 1),
            page(vec![record("OL1W", "Wilkie Collins", "The Moonstone")], false),
        );
        catalog
            .failures
            .lock()
            .unwrap()
            .insert(("q".to_string(), 1), 2);
        let (ctx, rx, catalog) = context(catalog, &["q"], 10);

        run_search_worker(&ctx, 1850..=1900);
        assert_eq!(drain(&rx), vec!["OL1W"]);
        let calls = catalog.calls.lock().unwrap();
        assert_eq!(calls[..3], [("q".to_string(), 1), ("q".to_string(), 1), ("q".to_string(), 1)]);
    }

    #[test]
    fn retry_exhaustion_rotates_and_resumes_later() {
        let mut catalog = Catalog::default();
        catalog.pages.insert(
            ("a".to_string(), 1),
            page(vec![record("OL1W", "Wilkie Collins", "The Moonstone")], false),
        );
        catalog.pages.insert(
            ("b".to_string(), 1),
            page(vec![record("OL2W", "Anthony Trollope", "The Warden")], false),
        );
        // max_retries = 2: three failures exhaust the first visit
        catalog
            .failures
            .lock()
            .unwrap()
            .insert(("a".to_string(), 1), 3);
        let (ctx, rx, _) = context(catalog, &["a", "b"], 10);

        run_search_worker(&ctx, 1850..=1900);
        assert_eq!(drain(&rx), vec!["OL2W", "OL1W"]);
    }

    #[test]
    fn malformed_page_is_not_retried() {
        let mut catalog = Catalog::default();
        catalog.undecodable.insert(("q".to_string(), 1));
        let (ctx, rx, catalog) = context(catalog, &["q"], 10);

        let stats = run_search_worker(&ctx, 1850..=1900);
        assert_eq!(stats.exit, SearchExit::Exhausted);
        assert!(drain(&rx).is_empty());
        assert_eq!(*catalog.calls.lock().unwrap(), vec![("q".to_string(), 1)]);
    }

    #[test]
    fn panicking_page_does_not_kill_the_worker() {
        let mut catalog = Catalog::default();
        catalog.pages.insert(
            ("a".to_string(), 1),
            page(vec![record("OL1W", "Wilkie Collins", "The Moonstone")], false),
        );
        catalog.pages.insert(
            ("b".to_string(), 1),
            page(vec![record("OL2W", "Anthony Trollope", "The Warden")], false),
        );
        catalog
            .panic_once
            .lock()
            .unwrap()
            .insert(("a".to_string(), 1));
        let (ctx, rx, _) = context(catalog, &["a", "b"], 10);

        let handle = std::thread::spawn(move || run_search_worker(&ctx, 1850..=1900));
        let stats = handle.join().expect("search worker survives a panicking page");
        assert_eq!(stats.panics, 1);
        assert_eq!(stats.exit, SearchExit::Exhausted);
        // The panicking page is requested again on the next rotation
        assert_eq!(drain(&rx), vec!["OL2W", "OL1W"]);
    }

    #[test]
    fn page_ceiling_rotates_instead_of_stopping() {
        let mut catalog = Catalog::default();
        for p in 1..=7 {
            catalog.pages.insert(
                ("deep".to_string(), p),
                page(vec![record(&format!("D{p}"), "Mrs Oliphant", "Miss Marjoribanks")], true),
            );
        }
        let (ctx, rx, _) = context(catalog, &["deep", "other"], 20);

        run_search_worker(&ctx, 1850..=1900);
        let ids = drain(&rx);
        // max_pages = 5 per pass; the next pass continues at page 6
        assert_eq!(ids.len(), 7);
        assert_eq!(ids[5], "D6");
    }

    #[test]
    fn cancellation_unblocks_full_queue() {
        let mut catalog = Catalog::default();
        catalog.pages.insert(
            ("q".to_string(), 1),
            page(
                (0..5)
                    .map(|i| record(&format!("OL{i}W"), "Elizabeth Gaskell", "Cranford"))
                    .collect(),
                false,
            ),
        );
        let (ctx, rx, _) = context(catalog, &["q"], 2);
        let cancel = ctx.cancel.clone();

        let handle = std::thread::spawn(move || run_search_worker(&ctx, 1850..=1900));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(rx.len(), 2);
        cancel.cancel();
        let stats = handle.join().unwrap();
        assert_eq!(stats.exit, SearchExit::Cancelled);
        assert_eq!(stats.enqueued, 2);
    }

    #[test]
    fn sleep_returns_early_on_cancel() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let start = Instant::now();
        assert!(!sleep_unless_cancelled(Duration::from_secs(5), &cancel));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
