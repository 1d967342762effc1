//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before retry `retry` (1-based): `base_ms` doubled per retry, capped
/// at `max_ms`, plus up to a tenth of that as jitter. Retry 0 never waits.
pub fn backoff_delay(retry: u32, base_ms: u64, max_ms: u64) -> Duration {
    if retry == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(retry - 1).unwrap_or(u64::MAX);
    let delay = base_ms.saturating_mul(factor).min(max_ms);
    let spread = delay / 10;
    let jitter = if spread == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..spread)
    };

    Duration::from_millis(delay + jitter)
}
