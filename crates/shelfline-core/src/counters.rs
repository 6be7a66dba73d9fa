//! Run-wide counters shared by producers and consumers

use std::sync::Mutex;

/// Plain-value copy of the counters, used for reports and logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Catalog records seen by search workers
    pub searched: usize,
    /// Candidates claimed for download
    pub attempted: usize,
    pub downloaded: usize,
    pub excluded_author: usize,
    pub excluded_language: usize,
    pub failed: usize,
}

/// Counter kinds, one per field of [`CounterSnapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Searched,
    Attempted,
    Downloaded,
    ExcludedAuthor,
    ExcludedLanguage,
    Failed,
}

/// Counters behind a single mutex. Every mutation is one short guarded region.
#[derive(Debug, Default)]
pub struct Counters {
    inner: Mutex<CounterSnapshot>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: usize) {
        let mut c = self.inner.lock().expect("counters lock poisoned");
        let slot = match counter {
            Counter::Searched => &mut c.searched,
            Counter::Attempted => &mut c.attempted,
            Counter::Downloaded => &mut c.downloaded,
            Counter::ExcludedAuthor => &mut c.excluded_author,
            Counter::ExcludedLanguage => &mut c.excluded_language,
            Counter::Failed => &mut c.failed,
        };
        *slot += n;
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        *self.inner.lock().expect("counters lock poisoned")
    }
}
