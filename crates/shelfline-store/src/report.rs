//! Plain-text reports: the counters report and the end-of-run statistics.

use std::collections::BTreeMap;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use rustc_hash::FxHashMap;
use shelfline_core::format::{fmt_num, pct};
use shelfline_core::{CollectedBook, CounterSnapshot};

/// Authors listed in the frequency table
const TOP_AUTHORS: usize = 25;

/// Counters report, rewritten with every snapshot.
pub fn format_counters(counters: &CounterSnapshot, collected: usize) -> String {
    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let rows = [
        ("collected", collected),
        ("searched", counters.searched),
        ("attempted", counters.attempted),
        ("downloaded", counters.downloaded),
        ("excluded_author", counters.excluded_author),
        ("excluded_language", counters.excluded_language),
        ("failed", counters.failed),
    ];
    let mut out = format!("shelfline counters ({now})\n");
    for (name, value) in rows {
        out.push_str(&format!("{name:<18} {}\n", fmt_num(value)));
    }
    out
}

/// Aggregate statistics over all collected books.
#[derive(Debug, Default)]
pub struct RunStatistics {
    pub total_books: usize,
    pub total_words: u64,
    /// Authors by descending book count (ties by name)
    pub authors: Vec<(String, usize)>,
    pub decades: BTreeMap<i32, usize>,
    pub years: BTreeMap<i32, usize>,
    pub undated: usize,
    pub counters: CounterSnapshot,
}

impl RunStatistics {
    pub fn compute(books: &[CollectedBook], counters: CounterSnapshot) -> Self {
        let mut by_author: FxHashMap<&str, usize> = FxHashMap::default();
        let mut stats = Self {
            total_books: books.len(),
            counters,
            ..Default::default()
        };
        for b in books {
            stats.total_words += b.word_count;
            *by_author.entry(b.author.as_str()).or_default() += 1;
            match b.year {
                Some(y) => {
                    *stats.years.entry(y).or_default() += 1;
                    *stats.decades.entry(y.div_euclid(10) * 10).or_default() += 1;
                }
                None => stats.undated += 1,
            }
        }
        let mut authors: Vec<(String, usize)> = by_author
            .into_iter()
            .map(|(a, n)| (a.to_string(), n))
            .collect();
        authors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        stats.authors = authors;
        stats
    }

    fn table(header: &str) -> Table {
        let mut table = Table::new();
        // Reports go to files: never emit ANSI styling
        table
            .force_no_tty()
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new(header)
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
                Cell::new("%").fg(Color::Cyan),
            ]);
        table
    }

    fn counters_table(&self) -> Table {
        let c = &self.counters;
        let mut table = Self::table("Counters");
        table.add_row(vec![
            Cell::new("Searched"),
            Cell::new(fmt_num(c.searched)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Excluded (author)"),
            Cell::new(fmt_num(c.excluded_author)),
            Cell::new(format!("{:.1}", pct(c.excluded_author, c.searched))),
        ]);
        table.add_row(vec![
            Cell::new("Attempted"),
            Cell::new(fmt_num(c.attempted)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Excluded (language)"),
            Cell::new(fmt_num(c.excluded_language)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Failed"),
            Cell::new(fmt_num(c.failed)),
            Cell::new(format!("{:.1}", pct(c.failed, c.attempted))),
        ]);
        table.add_row(vec![
            Cell::new("Downloaded").fg(Color::Green),
            Cell::new(fmt_num(c.downloaded)).fg(Color::Green),
            Cell::new(format!("{:.1}", pct(c.downloaded, c.attempted))).fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("Books in collection"),
            Cell::new(fmt_num(self.total_books)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Words"),
            Cell::new(fmt_num(self.total_words as usize)),
            Cell::new(""),
        ]);
        table
    }

    fn histogram(
        &self,
        header: &str,
        buckets: &BTreeMap<i32, usize>,
        label: fn(i32) -> String,
    ) -> Table {
        let mut table = Self::table(header);
        for (&key, &n) in buckets {
            table.add_row(vec![
                Cell::new(label(key)),
                Cell::new(fmt_num(n)),
                Cell::new(format!("{:.1}", pct(n, self.total_books))),
            ]);
        }
        if self.undated > 0 {
            table.add_row(vec![
                Cell::new("undated"),
                Cell::new(fmt_num(self.undated)),
                Cell::new(format!("{:.1}", pct(self.undated, self.total_books))),
            ]);
        }
        table
    }

    /// Full report: counters, top authors, decade and year histograms.
    pub fn format_report(&self) -> String {
        let mut authors = Self::table("Top authors");
        for (name, n) in self.authors.iter().take(TOP_AUTHORS) {
            authors.add_row(vec![
                Cell::new(name),
                Cell::new(fmt_num(*n)),
                Cell::new(format!("{:.1}", pct(*n, self.total_books))),
            ]);
        }
        let decades = self.histogram("Decade", &self.decades, |d| format!("{d}s"));
        let years = self.histogram("Year", &self.years, |y| y.to_string());

        format!(
            "shelfline statistics ({})\n\n{}\n\n{authors}\n\n{decades}\n\n{years}\n",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            self.counters_table()
        )
    }

    /// Log minimal summary (non-TTY friendly).
    pub fn log(&self) {
        log::info!(
            "Collection: {} books, {} words, {} authors ({} downloaded this run, {} failed)",
            fmt_num(self.total_books),
            fmt_num(self.total_words as usize),
            fmt_num(self.authors.len()),
            fmt_num(self.counters.downloaded),
            fmt_num(self.counters.failed)
        );
    }
}
