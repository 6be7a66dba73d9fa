//! Eligibility rules over author, title and subjects

use std::sync::Arc;

use crate::counters::{Counter, Counters};

const DEFAULT_EXCLUDED_AUTHORS: &[&str] = &[
    // Authors mostly read in translation
    "tolstoy",
    "tolstoi",
    "dostoevsky",
    "dostoyevsky",
    "chekhov",
    "turgenev",
    "gogol",
    "pushkin",
    "lermontov",
    "goncharov",
    "gorky",
    "bulgakov",
    "nabokov",
    "solzhenitsyn",
    "pasternak",
    "austen",
    // Name markers
    "vich",
    "ovna",
    "evna",
    "sky",
    "skii",
    "skiy",
];

const DEFAULT_TITLE_LANGUAGE_MARKERS: &[&str] = &[
    "russian",
    "translated from",
    "translation",
    "in english",
    "bilingual",
];

const DEFAULT_TITLE_REGION_MARKERS: &[&str] = &[
    "moscow",
    "petersburg",
    "petrograd",
    "leningrad",
    "siberia",
    "kremlin",
    "soviet",
    "cossack",
    "volga",
];

const DEFAULT_FICTION_MARKERS: &[&str] = &[
    "fiction",
    "novel",
    "romance",
    "stories",
    "story",
    "tales",
    "fantasy",
    "mystery",
    "adventure",
    "detective",
    "literature",
];

fn to_owned_lower(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_lowercase()).collect()
}

/// Configurable marker lists. Matching is case-insensitive substring search.
#[derive(Debug, Clone)]
pub struct FilterRules {
    /// Known authors in translation plus non-target-language name markers
    pub excluded_authors: Vec<String>,
    pub title_language_markers: Vec<String>,
    pub title_region_markers: Vec<String>,
    pub fiction_markers: Vec<String>,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            excluded_authors: to_owned_lower(DEFAULT_EXCLUDED_AUTHORS),
            title_language_markers: to_owned_lower(DEFAULT_TITLE_LANGUAGE_MARKERS),
            title_region_markers: to_owned_lower(DEFAULT_TITLE_REGION_MARKERS),
            fiction_markers: to_owned_lower(DEFAULT_FICTION_MARKERS),
        }
    }
}

impl FilterRules {
    /// Lowercase every marker so matching only lowercases the haystack
    pub fn normalized(mut self) -> Self {
        for list in [
            &mut self.excluded_authors,
            &mut self.title_language_markers,
            &mut self.title_region_markers,
            &mut self.fiction_markers,
        ] {
            for m in list.iter_mut() {
                *m = m.to_lowercase();
            }
            list.retain(|m| !m.is_empty());
        }
        self
    }
}

fn contains_any(haystack: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| haystack.contains(m.as_str()))
}

/// Author/title/subject predicates. Exclusions are counted in the shared counters.
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    rules: FilterRules,
    counters: Arc<Counters>,
}

impl EligibilityFilter {
    pub fn new(rules: FilterRules, counters: Arc<Counters>) -> Self {
        Self {
            rules: rules.normalized(),
            counters,
        }
    }

    pub fn rules(&self) -> &FilterRules {
        &self.rules
    }

    /// True if the author matches the exclusion list. Counts `excluded_author`.
    pub fn is_excluded_author(&self, author: &str) -> bool {
        let excluded = contains_any(&author.to_lowercase(), &self.rules.excluded_authors);
        if excluded {
            self.counters.incr(Counter::ExcludedAuthor);
        }
        excluded
    }

    /// Title must be free of language/region markers; a non-empty subject list
    /// must contain at least one fiction marker. No subjects is neutral.
    pub fn is_eligible_book<S: AsRef<str>>(&self, title: &str, subjects: &[S]) -> bool {
        let title = title.to_lowercase();
        if contains_any(&title, &self.rules.title_language_markers)
            || contains_any(&title, &self.rules.title_region_markers)
        {
            return false;
        }
        if subjects.is_empty() {
            return true;
        }
        subjects
            .iter()
            .any(|s| contains_any(&s.as_ref().to_lowercase(), &self.rules.fiction_markers))
    }
}
