//! Target-language validation of downloaded text.
//!
//! Three independent checks, any of which rejects:
//! 1. disqualifying script (Cyrillic) in the sample
//! 2. language classification of a head window and a middle window
//! 3. share of common target-language function words in the sample

use std::sync::Arc;

use crate::counters::{Counter, Counters};

/// Characters inspected by the script and frequency checks, and window size
/// for classification.
pub const SAMPLE_CHARS: usize = 5000;

/// Below this share of function words a long enough sample is rejected
pub const MIN_FUNCTION_WORD_SHARE: f64 = 0.10;

/// Samples with this many tokens or fewer skip the frequency check
pub const MIN_TOKENS_FOR_FREQUENCY: usize = 100;

const FUNCTION_WORDS: &[&str] = &[
    "the", "and", "of", "to", "a", "in", "that", "is", "was", "he", "it", "for", "with", "as",
    "his", "her", "she", "you", "i", "had", "on", "at", "be", "not", "but", "by", "from", "they",
    "we", "this", "which", "have", "were", "or", "an", "my", "him", "me", "all", "said",
];

/// Classification failure. The window is treated as inconclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifyError {
    /// Classifier produced no answer
    Undetected,
    /// Classifier answered with low confidence
    Unreliable { tag: String, confidence: f64 },
}

impl std::fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undetected => f.write_str("language not detected"),
            Self::Unreliable { tag, confidence } => {
                write!(f, "unreliable guess {tag} ({confidence:.2})")
            }
        }
    }
}

impl std::error::Error for ClassifyError {}

/// Language classification capability: text → language tag (ISO 639-3)
pub trait LanguageClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<String, ClassifyError>;
}

/// Trigram classifier from the `whatlang` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangClassifier;

impl LanguageClassifier for WhatlangClassifier {
    fn classify(&self, text: &str) -> Result<String, ClassifyError> {
        let info = whatlang::detect(text).ok_or(ClassifyError::Undetected)?;
        let tag = info.lang().code().to_string();
        if !info.is_reliable() {
            return Err(ClassifyError::Unreliable {
                tag,
                confidence: info.confidence(),
            });
        }
        Ok(tag)
    }
}

/// Slice of at most `len` chars starting at char `start` (empty past the end)
fn char_window(text: &str, start: usize, len: usize) -> &str {
    let mut indices = text.char_indices().map(|(i, _)| i).skip(start);
    let Some(from) = indices.next() else {
        return "";
    };
    let to = text[from..]
        .char_indices()
        .nth(len)
        .map_or(text.len(), |(i, _)| from + i);
    &text[from..to]
}

fn is_disqualifying_script(c: char) -> bool {
    ('\u{0400}'..='\u{04FF}').contains(&c)
}

/// Share of function words among alphabetic tokens, with the token count
fn function_word_share(sample: &str) -> (f64, usize) {
    let mut total = 0usize;
    let mut hits = 0usize;
    for token in sample
        .split(|c: char| !c.is_alphabetic() && c != '\'')
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
    {
        total += 1;
        let lower = token.to_lowercase();
        if FUNCTION_WORDS.contains(&lower.as_str()) {
            hits += 1;
        }
    }
    if total == 0 {
        return (0.0, 0);
    }
    (hits as f64 / total as f64, total)
}

/// Target-language check with a pluggable classifier
#[derive(Clone)]
pub struct LanguageCheck {
    classifier: Arc<dyn LanguageClassifier>,
    target: String,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for LanguageCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageCheck")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl LanguageCheck {
    pub fn new(
        classifier: Arc<dyn LanguageClassifier>,
        target: impl Into<String>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            classifier,
            target: target.into(),
            counters,
        }
    }

    /// Accept or reject `text`. Classification and frequency rejections count
    /// as `excluded_language`; script rejections are not counted.
    pub fn is_target_language_text(&self, text: &str) -> bool {
        let head = char_window(text, 0, SAMPLE_CHARS);

        if head.chars().any(is_disqualifying_script) {
            log::debug!("rejected: disqualifying script in sample");
            return false;
        }

        let middle_start = (text.chars().count() / 2).max(SAMPLE_CHARS);
        let middle = char_window(text, middle_start, SAMPLE_CHARS);
        for window in [head, middle] {
            if window.is_empty() {
                continue;
            }
            match self.classifier.classify(window) {
                Ok(tag) if tag != self.target => {
                    log::debug!("rejected: classified as {tag}");
                    self.counters.incr(Counter::ExcludedLanguage);
                    return false;
                }
                Ok(_) => {}
                Err(e) => log::debug!("classification skipped: {e}"),
            }
        }

        let (share, tokens) = function_word_share(head);
        if tokens > MIN_TOKENS_FOR_FREQUENCY && share < MIN_FUNCTION_WORD_SHARE {
            log::debug!("rejected: function-word share {share:.3} over {tokens} tokens");
            self.counters.incr(Counter::ExcludedLanguage);
            return false;
        }
        true
    }
}
