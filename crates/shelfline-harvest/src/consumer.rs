//! Download workers: claim a candidate, walk the fallback ladder, keep the first valid text

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashSet;
use shelfline_core::model::word_count;
use shelfline_core::{
    AcquiredText, CancelToken, CollectedBook, Counter, Counters, DedupRegistry, FetchError,
    LanguageCheck, PopError, ResourceCandidate, ResourceResolver, ResultSet, TextFetcher,
    TextVariant, WorkReceiver,
};
use shelfline_store::{ProgressStore, book_file_name};

/// How a candidate was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Saved and appended; carries the collection size after the append
    Collected(usize),
    /// No archival id and variant produced an acceptable text
    Exhausted,
    /// Another worker owns or already completed this id
    AlreadyClaimed,
}

/// Per-item failure. The worker logs it and moves on.
#[derive(Debug)]
pub enum ItemError {
    /// No archival ids could be resolved
    Unavailable(FetchError),
    /// Text could not be written to the store
    Storage(std::io::Error),
    /// The handler panicked
    Panicked(String),
}

impl ItemError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Storage(_) => "storage",
            Self::Panicked(_) => "panicked",
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(e) => write!(f, "resource unavailable: {e}"),
            Self::Storage(e) => write!(f, "storage write failed: {e}"),
            Self::Panicked(msg) => write!(f, "worker panicked: {msg}"),
        }
    }
}

impl std::error::Error for ItemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unavailable(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::Panicked(_) => None,
        }
    }
}

/// Why a fetched text was passed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Html,
    TooShort,
    WrongLanguage,
}

/// True for HTML error and landing pages served in place of a text
pub fn looks_like_html(content_type: Option<&str>, body: &str) -> bool {
    if content_type.is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/html")) {
        return true;
    }
    let head: String = body
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(512)
        .collect::<String>()
        .to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<head>")
}

/// Shared handles a download worker runs against
#[derive(Clone)]
pub struct DownloadContext {
    pub resolver: Arc<dyn ResourceResolver>,
    pub fetcher: Arc<dyn TextFetcher>,
    pub registry: Arc<DedupRegistry>,
    pub counters: Arc<Counters>,
    pub results: Arc<ResultSet>,
    pub language: LanguageCheck,
    pub store: ProgressStore,
    pub queue: WorkReceiver<ResourceCandidate>,
    pub cancel: CancelToken,
    pub min_text_chars: usize,
    pub queue_timeout: Duration,
}

impl DownloadContext {
    fn validate(&self, text: &AcquiredText) -> Result<(), Rejection> {
        if looks_like_html(text.content_type.as_deref(), &text.body) {
            return Err(Rejection::Html);
        }
        if text.body.chars().count() <= self.min_text_chars {
            return Err(Rejection::TooShort);
        }
        if !self.language.is_target_language_text(&text.body) {
            return Err(Rejection::WrongLanguage);
        }
        Ok(())
    }

    /// Search hints first, then the editions lookup, without duplicates
    fn archival_ids(&self, candidate: &ResourceCandidate) -> Result<Vec<String>, ItemError> {
        let mut ids = candidate.archival_hints.clone();
        match self.resolver.resolve_resources(candidate.id()) {
            Ok(resolved) => ids.extend(resolved),
            Err(e) if ids.is_empty() => return Err(ItemError::Unavailable(e)),
            Err(e) => log::debug!("{}: editions lookup failed, using hints: {e}", candidate.id()),
        }
        let mut seen = FxHashSet::default();
        ids.retain(|id| !id.is_empty() && seen.insert(id.clone()));
        Ok(ids)
    }

    /// Walk archival ids × ladder; save the first acceptable text
    fn acquire(&self, candidate: &ResourceCandidate) -> Result<Option<CollectedBook>, ItemError> {
        let record = &candidate.record;
        for archival_id in self.archival_ids(candidate)? {
            for variant in TextVariant::LADDER {
                let text = match self.fetcher.fetch_text(&archival_id, variant) {
                    Ok(text) => text,
                    Err(e) => {
                        log::debug!("{}: {archival_id} {variant}: {e}", record.id);
                        continue;
                    }
                };
                if let Err(rejection) = self.validate(&text) {
                    log::debug!("{}: {archival_id} {variant}: rejected ({rejection:?})", record.id);
                    continue;
                }

                let file_name = book_file_name(
                    &record.author,
                    &record.title,
                    record.publication_year,
                    &record.id,
                );
                let file_reference = self
                    .store
                    .save_text(&file_name, &text.body)
                    .map_err(ItemError::Storage)?;
                log::debug!("{}: accepted {}", record.id, text.url);
                return Ok(Some(CollectedBook {
                    id: record.id.clone(),
                    title: record.title.clone(),
                    author: record.author.clone(),
                    year: record.publication_year,
                    source_id: archival_id,
                    file_reference,
                    word_count: word_count(&text.body),
                }));
            }
        }
        Ok(None)
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Settle one candidate. A failed attempt is counted and its id released.
pub fn handle_candidate(
    ctx: &DownloadContext,
    candidate: &ResourceCandidate,
) -> Result<Outcome, ItemError> {
    let id = candidate.id();
    if !ctx.registry.try_claim(id) {
        return Ok(Outcome::AlreadyClaimed);
    }
    ctx.counters.incr(Counter::Attempted);

    let result = catch_unwind(AssertUnwindSafe(|| ctx.acquire(candidate)))
        .unwrap_or_else(|payload| Err(ItemError::Panicked(panic_message(payload.as_ref()))));

    match result {
        Ok(Some(book)) => {
            log::info!("collected: {} by {} [{}]", book.title, book.author, book.id);
            let total = ctx.results.append(book);
            ctx.counters.incr(Counter::Downloaded);
            Ok(Outcome::Collected(total))
        }
        Ok(None) => {
            ctx.counters.incr(Counter::Failed);
            ctx.registry.release(id);
            Ok(Outcome::Exhausted)
        }
        Err(e) => {
            ctx.counters.incr(Counter::Failed);
            ctx.registry.release(id);
            Err(e)
        }
    }
}

/// Per-worker totals, logged when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub collected: usize,
    pub exhausted: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Download worker body: drain the queue until it closes or the run is cancelled.
pub fn run_download_worker(ctx: &DownloadContext) -> DownloadStats {
    let mut stats = DownloadStats::default();
    while !ctx.cancel.is_cancelled() {
        let candidate = match ctx.queue.pop(ctx.queue_timeout) {
            Ok(c) => c,
            Err(PopError::Timeout) => continue,
            Err(PopError::Closed) => break,
        };
        match handle_candidate(ctx, &candidate) {
            Ok(Outcome::Collected(_)) => stats.collected += 1,
            Ok(Outcome::Exhausted) => {
                stats.exhausted += 1;
                log::debug!("{}: no usable text", candidate.id());
            }
            Ok(Outcome::AlreadyClaimed) => stats.skipped += 1,
            Err(e) => {
                stats.errors += 1;
                log::warn!("{} failed ({}): {e}", candidate.id(), e.kind());
            }
        }
    }
    log::debug!(
        "download worker finished: {} collected, {} exhausted, {} skipped, {} errors",
        stats.collected,
        stats.exhausted,
        stats.skipped,
        stats.errors
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use shelfline_core::work_queue;
    use shelfline_core::{CatalogRecord, ClassifyError, LanguageClassifier};
    use tempfile::TempDir;

    const PROSE: &str = "It was the best of times and it was the worst of times. ";

    struct English;

    impl LanguageClassifier for English {
        fn classify(&self, _text: &str) -> Result<String, ClassifyError> {
            Ok("eng".to_string())
        }
    }

    #[derive(Default)]
    struct Archive {
        editions: HashMap<String, Vec<String>>,
        texts: HashMap<(String, TextVariant), String>,
        content_types: HashMap<(String, TextVariant), String>,
        fetches: Mutex<Vec<(String, TextVariant)>>,
        panic_on: Option<String>,
    }

    impl ResourceResolver for Archive {
        fn resolve_resources(&self, catalog_id: &str) -> Result<Vec<String>, FetchError> {
            self.editions
                .get(catalog_id)
                .cloned()
                .ok_or(FetchError::Http {
                    status: Some(503),
                    message: "down".to_string(),
                })
        }
    }

    impl TextFetcher for Archive {
        fn fetch_text(
            &self,
            archival_id: &str,
            variant: TextVariant,
        ) -> Result<AcquiredText, FetchError> {
            if self.panic_on.as_deref() == Some(archival_id) {
                panic!("corrupt archive entry");
            }
            let key = (archival_id.to_string(), variant);
            self.fetches.lock().unwrap().push(key.clone());
            self.texts
                .get(&key)
                .map(|body| AcquiredText {
                    url: format!("mem://{archival_id}/{variant}"),
                    content_type: self.content_types.get(&key).cloned(),
                    body: body.clone(),
                })
                .ok_or(FetchError::Http {
                    status: Some(404),
                    message: "missing".to_string(),
                })
        }
    }

    fn candidate(id: &str, hints: &[&str]) -> ResourceCandidate {
        ResourceCandidate::with_hints(
            CatalogRecord {
                id: id.to_string(),
                title: "The Woman in White".to_string(),
                author: "Wilkie Collins".to_string(),
                publication_year: Some(1859),
                subjects: vec![],
            },
            hints.iter().map(|h| h.to_string()).collect(),
        )
    }

    fn context(archive: Archive, dir: &TempDir) -> (DownloadContext, Arc<Archive>) {
        let archive = Arc::new(archive);
        let counters = Arc::new(Counters::new());
        let (_tx, rx) = work_queue::bounded(4);
        let ctx = DownloadContext {
            resolver: archive.clone(),
            fetcher: archive.clone(),
            registry: Arc::new(DedupRegistry::new()),
            counters: counters.clone(),
            results: Arc::new(ResultSet::new()),
            language: LanguageCheck::new(Arc::new(English), "eng", counters),
            store: ProgressStore::open(dir.path(), 3).unwrap(),
            queue: rx,
            cancel: CancelToken::new(),
            min_text_chars: 100,
            queue_timeout: Duration::from_millis(10),
        };
        (ctx, archive)
    }

    fn good_text() -> String {
        PROSE.repeat(10)
    }

    #[test]
    fn first_valid_variant_is_collected() {
        let dir = TempDir::new().unwrap();
        let mut archive = Archive::default();
        archive.editions.insert("OL1W".into(), vec!["ia1".into()]);
        archive
            .texts
            .insert(("ia1".into(), TextVariant::DjvuStream), good_text());
        let (ctx, archive) = context(archive, &dir);

        let outcome = handle_candidate(&ctx, &candidate("OL1W", &[])).unwrap();
        assert_eq!(outcome, Outcome::Collected(1));

        let books = ctx.results.snapshot();
        assert_eq!(books[0].source_id, "ia1");
        assert_eq!(books[0].word_count, 130);
        assert!(dir.path().join(&books[0].file_reference).is_file());
        assert!(ctx.registry.contains("OL1W"));

        let c = ctx.counters.snapshot();
        assert_eq!((c.attempted, c.downloaded, c.failed), (1, 1, 0));
        // Ladder stopped at the first acceptance
        assert_eq!(archive.fetches.lock().unwrap().len(), 2);
    }

    #[test]
    fn rejected_variants_fall_through_the_ladder() {
        let dir = TempDir::new().unwrap();
        let mut archive = Archive::default();
        archive.editions.insert("OL1W".into(), vec!["ia1".into(), "ia2".into()]);
        archive.texts.insert(
            ("ia1".into(), TextVariant::DjvuDownload),
            "<!DOCTYPE html><html><body>not found</body></html>".repeat(10),
        );
        archive
            .texts
            .insert(("ia1".into(), TextVariant::DjvuStream), "too short".into());
        archive
            .texts
            .insert(("ia2".into(), TextVariant::PlainText), good_text());
        let (ctx, _) = context(archive, &dir);

        assert_eq!(
            handle_candidate(&ctx, &candidate("OL1W", &[])).unwrap(),
            Outcome::Collected(1)
        );
        assert_eq!(ctx.results.snapshot()[0].source_id, "ia2");
    }

    #[test]
    fn hints_are_tried_before_editions() {
        let dir = TempDir::new().unwrap();
        let mut archive = Archive::default();
        archive
            .editions
            .insert("OL1W".into(), vec!["hint".into(), "edition".into()]);
        archive
            .texts
            .insert(("edition".into(), TextVariant::DjvuDownload), good_text());
        let (ctx, archive) = context(archive, &dir);

        handle_candidate(&ctx, &candidate("OL1W", &["hint"])).unwrap();
        let fetched: Vec<String> = archive
            .fetches
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect();
        // "hint" appears once per variant only, despite being listed twice
        assert_eq!(fetched, vec!["hint", "hint", "hint", "edition"]);
    }

    #[test]
    fn exhausted_ladder_counts_failure_and_releases() {
        let dir = TempDir::new().unwrap();
        let mut archive = Archive::default();
        archive.editions.insert("OL1W".into(), vec!["ia1".into()]);
        let (ctx, _) = context(archive, &dir);

        assert_eq!(
            handle_candidate(&ctx, &candidate("OL1W", &[])).unwrap(),
            Outcome::Exhausted
        );
        assert_eq!(ctx.counters.snapshot().failed, 1);
        assert!(ctx.registry.try_claim("OL1W"));
    }

    #[test]
    fn resolver_failure_without_hints_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let (ctx, _) = context(Archive::default(), &dir);

        let err = handle_candidate(&ctx, &candidate("OL9W", &[])).unwrap_err();
        assert_eq!(err.kind(), "unavailable");
        assert_eq!(ctx.counters.snapshot().failed, 1);
        assert!(!ctx.registry.contains("OL9W"));
    }

    #[test]
    fn resolver_failure_with_hints_uses_hints() {
        let dir = TempDir::new().unwrap();
        let mut archive = Archive::default();
        archive
            .texts
            .insert(("hint".into(), TextVariant::DjvuDownload), good_text());
        let (ctx, _) = context(archive, &dir);

        assert_eq!(
            handle_candidate(&ctx, &candidate("OL9W", &["hint"])).unwrap(),
            Outcome::Collected(1)
        );
    }

    #[test]
    fn already_claimed_is_untouched() {
        let dir = TempDir::new().unwrap();
        let (ctx, archive) = context(Archive::default(), &dir);
        assert!(ctx.registry.try_claim("OL1W"));

        assert_eq!(
            handle_candidate(&ctx, &candidate("OL1W", &[])).unwrap(),
            Outcome::AlreadyClaimed
        );
        assert_eq!(ctx.counters.snapshot(), Default::default());
        assert!(archive.fetches.lock().unwrap().is_empty());
    }

    #[test]
    fn panic_is_caught_and_released() {
        let dir = TempDir::new().unwrap();
        let archive = Archive {
            panic_on: Some("bad".to_string()),
            ..Default::default()
        };
        let (ctx, _) = context(archive, &dir);

        let err = handle_candidate(&ctx, &candidate("OL1W", &["bad"])).unwrap_err();
        assert!(matches!(err, ItemError::Panicked(ref m) if m.contains("corrupt")));
        assert_eq!(ctx.counters.snapshot().failed, 1);
        assert!(!ctx.registry.contains("OL1W"));
    }

    #[test]
    fn worker_exits_when_queue_closes() {
        let dir = TempDir::new().unwrap();
        let mut archive = Archive::default();
        archive
            .texts
            .insert(("a".into(), TextVariant::DjvuDownload), good_text());
        let (mut ctx, _) = context(archive, &dir);
        let (tx, rx) = work_queue::bounded(4);
        ctx.queue = rx;
        let cancel = CancelToken::new();
        tx.push(candidate("OL1W", &["a"]), Duration::from_millis(10), &cancel)
            .unwrap();
        tx.push(candidate("OL1W", &["a"]), Duration::from_millis(10), &cancel)
            .unwrap();
        tx.push(candidate("OL2W", &[]), Duration::from_millis(10), &cancel)
            .unwrap();
        drop(tx);

        let stats = run_download_worker(&ctx);
        assert_eq!(
            stats,
            DownloadStats {
                collected: 1,
                exhausted: 0,
                skipped: 1,
                errors: 1,
            }
        );
    }

    #[test]
    fn html_detection() {
        assert!(looks_like_html(None, "  <!DOCTYPE HTML>\n<html>"));
        assert!(looks_like_html(None, "<html lang=\"en\">"));
        assert!(looks_like_html(None, "\u{feff}<HTML>"));
        assert!(!looks_like_html(None, "CHAPTER I.\n\nIt was a dark and stormy night."));
        assert!(looks_like_html(Some("Text/HTML; charset=utf-8"), "Please log in"));
        assert!(!looks_like_html(Some("text/plain; charset=utf-8"), "CHAPTER I."));
    }

    #[test]
    fn html_content_type_is_rejected_despite_plain_body() {
        let dir = TempDir::new().unwrap();
        let mut archive = Archive::default();
        archive.editions.insert("OL1W".into(), vec!["ia1".into()]);
        for variant in [TextVariant::DjvuDownload, TextVariant::DjvuStream] {
            archive.texts.insert(("ia1".into(), variant), good_text());
        }
        archive.content_types.insert(
            ("ia1".into(), TextVariant::DjvuDownload),
            "text/html; charset=utf-8".into(),
        );
        let (ctx, archive) = context(archive, &dir);

        assert_eq!(
            handle_candidate(&ctx, &candidate("OL1W", &[])).unwrap(),
            Outcome::Collected(1)
        );
        let fetched: Vec<TextVariant> =
            archive.fetches.lock().unwrap().iter().map(|(_, v)| *v).collect();
        assert_eq!(fetched, vec![TextVariant::DjvuDownload, TextVariant::DjvuStream]);
    }

    #[test]
    fn body_must_exceed_minimum_length() {
        let dir = TempDir::new().unwrap();
        let mut archive = Archive::default();
        archive.editions.insert("OL1W".into(), vec!["ia1".into()]);
        let (mut ctx, _) = context(archive, &dir);
        let text = good_text();
        ctx.min_text_chars = text.chars().count();
        let exact = AcquiredText {
            url: "mem://exact".into(),
            content_type: None,
            body: text.clone(),
        };
        assert_eq!(ctx.validate(&exact), Err(Rejection::TooShort));

        ctx.min_text_chars -= 1;
        assert_eq!(ctx.validate(&exact), Ok(()));
    }
}
