/*!
 * Retry with exponential backoff for backend calls.
 *
 * Remote failures are classified by their message. Rate limits, gateway
 * errors and transport hiccups are retried with a bounded exponential wait;
 * everything else is returned to the caller on the first attempt.
 */

use log::warn;
use std::future::Future;
use std::time::Duration;

/// Lowercase message fragments that mark an error as transient
const RETRYABLE_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "502",
    "503",
    "504",
    "service unavailable",
    "timeout",
    "timed out",
    "read error",
    "connection reset",
    "ssl",
    "tls",
    "temporary failure in name resolution",
    "dns error",
    "failed to establish a new connection",
];

/// Bounds for one retried operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Base wait, doubled on every retry
    pub base_wait: Duration,
    /// Lower clamp of a single wait
    pub min_wait: Duration,
    /// Upper clamp of a single wait
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(6, Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    /// Create a policy whose base wait equals the minimum wait
    pub fn new(max_attempts: u32, min_wait: Duration, max_wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_wait: min_wait,
            min_wait,
            max_wait: max_wait.max(min_wait),
        }
    }

    /// Wait before retry `retry` (1-based): `clamp(base * 2^(retry-1), min, max)`
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let scaled = self.base_wait.saturating_mul(1u32 << exponent);
        scaled.clamp(self.min_wait, self.max_wait)
    }
}

/// Whether an error message describes a transient remote condition
pub fn is_retryable_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    RETRYABLE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are spent.
///
/// The last error is returned unchanged. A warning naming `label` is logged
/// before every wait.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= policy.max_attempts || !is_retryable(&e) {
                    return Err(e);
                }

                let wait = policy.delay_for_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:.1}s",
                    label,
                    attempt,
                    policy.max_attempts,
                    e,
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

/// Classification predicate for any error with a readable message
pub fn retryable_by_message<E: std::fmt::Display>(error: &E) -> bool {
    is_retryable_message(&error.to_string())
}
