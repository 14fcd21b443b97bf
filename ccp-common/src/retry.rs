//! Bounded retry with exponential backoff
//!
//! Used for connection acquisition. Every retry loop has a hard attempt limit and
//! ends with a [`GiveUp`] carrying the last error, so callers can surface a
//! terminal error instead of rescheduling forever.

use std::future::Future;
use std::time::{Duration, Instant};

/// Retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500), Duration::from_secs(30))
    }
}

/// Final outcome of an exhausted or aborted retry loop
#[derive(Debug)]
pub struct GiveUp<E> {
    /// Attempts actually made
    pub attempts: u32,
    /// Error returned by the last attempt
    pub last_error: E,
}

/// Retry `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` is reached.
///
/// **Backoff Strategy:**
/// - Initial delay: `policy.initial_backoff`
/// - Multiplier: 2.0 (exponential)
/// - Max delay: `policy.max_backoff`
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    operation_name: &str,
    policy: RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> Result<T, GiveUp<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Operation failed with non-retryable error"
                    );
                    return Err(GiveUp {
                        attempts: attempt,
                        last_error: err,
                    });
                }

                if attempt >= policy.max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %err,
                        "Operation failed: retry attempts exhausted"
                    );
                    return Err(GiveUp {
                        attempts: attempt,
                        last_error: err,
                    });
                }

                let backoff = policy.backoff_after(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Operation failed, will retry after backoff"
                );

                tokio::time::sleep(backoff).await;
            }
        }
    }
}
