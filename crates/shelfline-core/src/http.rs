//! Blocking HTTP GET over a shared async client.
//!
//! Uses async reqwest internally with `tokio::time::timeout` around every
//! request, but presents a sync interface for the worker threads.

use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use crate::error::FetchError;
use crate::retry::retry_with_backoff;

/// HTTP behaviour shared by every capability implementation.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Whole-request timeout (connect + headers + body)
    pub request_timeout: Duration,
    /// Retry attempts for transient failures (429, 5xx, network)
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub backoff_base: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
            user_agent: concat!("shelfline/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install the process-wide HTTP config. Only the first call wins.
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::debug!("HTTP config already set, ignoring override");
    }
}

/// Current HTTP config (defaults if never set)
pub fn http_config() -> &'static HttpConfig {
    HTTP_CONFIG.get_or_init(HttpConfig::default)
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    let cfg = http_config();
    reqwest::Client::builder()
        .connect_timeout(cfg.connect_timeout)
        .user_agent(cfg.user_agent.clone())
        .pool_max_idle_per_host(8)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// A successful response body
#[derive(Debug)]
pub struct TextResponse {
    pub url: String,
    pub content_type: Option<String>,
    pub body: String,
}

/// Single GET attempt; non-2xx statuses become `FetchError::Http`.
pub fn get_text(url: &str, query: &[(&str, String)]) -> Result<TextResponse, FetchError> {
    let timeout = http_config().request_timeout;
    SHARED_RUNTIME.handle().block_on(async {
        let request = async {
            let resp = http_client()
                .get(url)
                .query(query)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(FetchError::from_reqwest)?;
            let final_url = resp.url().to_string();
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp.text().await.map_err(FetchError::from_reqwest)?;
            Ok(TextResponse {
                url: final_url,
                content_type,
                body,
            })
        };
        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    })
}

/// GET with retry for rate limit (429), server errors (5xx) and network failures.
pub fn get_text_with_retry(
    url: &str,
    query: &[(&str, String)],
) -> Result<TextResponse, FetchError> {
    let cfg = http_config();
    retry_with_backoff(url, cfg.max_retries, cfg.backoff_base, || get_text(url, query))
}
