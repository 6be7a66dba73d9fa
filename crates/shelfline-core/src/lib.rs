//! Shelfline Core - Common infrastructure for the book acquisition pipeline
//!
//! This crate holds the data model, the eligibility and language checks,
//! the shared components workers coordinate through (dedup registry,
//! counters, results, bounded work queue), and the HTTP plumbing used by
//! the capability implementations.

pub mod counters;
pub mod error;
pub mod filter;
pub mod format;
pub mod http;
pub mod language;
pub mod logging;
pub mod model;
pub mod registry;
pub mod results;
pub mod retry;
pub mod shutdown;
pub mod source;
pub mod work_queue;

// Re-exports for convenience
pub use counters::{Counter, CounterSnapshot, Counters};
pub use error::FetchError;
pub use filter::{EligibilityFilter, FilterRules};
pub use http::{HttpConfig, SHARED_RUNTIME, http_client, http_config, set_http_config};
pub use language::{ClassifyError, LanguageCheck, LanguageClassifier, WhatlangClassifier};
pub use logging::init_logging;
pub use model::{AcquiredText, CatalogRecord, CollectedBook, ResourceCandidate, SearchPage};
pub use registry::DedupRegistry;
pub use results::ResultSet;
pub use shutdown::{CancelToken, is_shutdown_requested, request_shutdown, shutdown_token};
pub use source::{CatalogSearch, ResourceResolver, TextFetcher, TextVariant};
pub use work_queue::{PopError, PushError, WorkReceiver, WorkSender};
