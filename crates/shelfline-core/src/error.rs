//! Error type for catalog and archive fetches

/// Error from a single fetch against the catalog or archive.
#[derive(Debug)]
pub enum FetchError {
    /// HTTP error with optional status code (None = connection-level failure)
    Http {
        status: Option<u16>,
        message: String,
    },
    /// No response within the configured request timeout
    Timeout,
    /// Response arrived but could not be decoded
    Decode(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Timeout => f.write_str("request timed out"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Create HTTP error from reqwest error.
    ///
    /// The URL is stripped from the message so API endpoints do not leak into logs.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout;
        }
        let status = e.status().map(|s| s.as_u16());
        if e.is_decode() {
            return Self::Decode(e.without_url().to_string());
        }
        Self::Http {
            status,
            message: e.without_url().to_string(),
        }
    }

    /// Rate limits, server errors, timeouts and connection failures are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status: None, .. } => true,
            Self::Http {
                status: Some(s), ..
            } => *s == 429 || (500..=599).contains(s),
            Self::Timeout => true,
            Self::Decode(_) => false,
        }
    }
}
