//! Retry logic with linear backoff
//!
//! Segment fetches are retried a fixed number of times. After the n-th failed
//! attempt the driver sleeps `n * base_delay` before the next one; no sleep
//! follows the final failure.
//!
//! # Example
//!
//! ```no_run
//! use hls_dl::retry::{IsRetryable, download_with_retry};
//! use hls_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = download_with_retry(&config, |_attempt| async {
//!     Ok::<_, MyError>(())
//! }).await;
//! result.value?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, HTTP errors) return `true`.
/// Failures no retry can fix (bad configuration, malformed URLs) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout { .. } | Error::HttpStatus { .. } => true,
            Error::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::InvalidInput
            ),
            Error::ManifestFetch { .. } => true,
            Error::Config { .. }
            | Error::InvalidUrl { .. }
            | Error::ManifestParse(_)
            | Error::ManifestRedirectLoop { .. }
            | Error::SegmentDownload(_)
            | Error::EmptyResult { .. }
            | Error::Encode(_)
            | Error::NotSupported(_)
            | Error::NotFound(_)
            | Error::Serialization(_) => false,
        }
    }
}

/// Outcome of a retried operation
#[must_use]
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result: the first success, or the last error
    pub value: Result<T, E>,
    /// Number of attempts made (at least one)
    pub attempts: u32,
}

/// Execute an async operation with linear backoff retry logic
///
/// `operation` receives the 1-based attempt number. At most
/// [`RetryConfig::effective_attempts`] attempts are made; a non-retryable
/// error stops immediately.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.effective_attempts();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return RetryOutcome {
                    value: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff_delay(config, attempt);

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::debug!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return RetryOutcome {
                    value: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}

/// Delay to wait after failed attempt number `attempt` (1-based)
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let delay = config.base_delay.saturating_mul(attempt);
    if config.jitter {
        add_jitter(delay)
    } else {
        delay
    }
}

/// Add up to 100% random jitter: the result lies in `[delay, 2 * delay]`
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
