//! Retry logic.
//!
//! # Responsibilities
//! - Bound attempts per operation
//! - Sleep a jittered exponential backoff between attempts
//! - Let the caller decide which errors are worth another attempt

use std::future::Future;
use std::time::Duration;

use crate::resilience::backoff::backoff_delay;

/// Attempt budget and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_ms: u64,
    pub max_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_ms: u64, max_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_ms,
            max_ms,
        }
    }

    /// A single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, 0, 0)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        backoff_delay(retry, self.base_ms, self.max_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 250, 4000)
    }
}

/// Run `op` until it succeeds, `should_retry` rejects the error, or the
/// budget is spent. The last error is returned.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut should_retry: impl FnMut(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && should_retry(&err) => {
                tokio::time::sleep(policy.delay(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
