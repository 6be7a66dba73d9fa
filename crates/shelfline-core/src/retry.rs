//! Retry with exponential backoff for transient fetch failures

use std::time::Duration;

use crate::error::FetchError;

/// Exponential backoff: base * 2^(attempt-1) (base, 2*base, 4*base, ...)
pub fn backoff_duration(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Retry a fallible fetch with exponential backoff.
///
/// On retryable errors, logs the failure, sleeps, and retries up to `max_retries` times.
/// Returns `Ok(T)` on first success, or the final `Err` on exhaustion / non-retryable error.
pub fn retry_with_backoff<T>(
    label: &str,
    max_retries: u32,
    base: Duration,
    mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_retries && e.is_retryable() => {
                attempt += 1;
                let delay = backoff_duration(base, attempt);
                log::debug!("{label}: attempt {attempt}/{max_retries} failed: {e}, retrying in {delay:?}");
                std::thread::sleep(delay);
            }
            Err(e) => {
                log::debug!("{label}: giving up: {e}");
                return Err(e);
            }
        }
    }
}
