//! Retry delay computation.

use std::time::Duration;

use rand::Rng;

use crate::RetryPolicy;

/// Exponential part of the delay before retry number `attempt + 1`:
/// `min(initial * multiplier^attempt, max)`.
pub fn base_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = policy.initial_retry_delay_ms as f64 * policy.backoff_multiplier.powi(exp);
    let capped = raw.min(policy.max_retry_delay_ms as f64);
    // powi overflows to +inf, which min() has already capped.
    Duration::from_millis(capped.max(0.0) as u64)
}

/// Base delay plus uniform jitter in `[0, max_jitter_ms]`.
pub fn delay_with_jitter<R: Rng + ?Sized>(policy: &RetryPolicy, attempt: u32, rng: &mut R) -> Duration {
    let jitter_ms = if policy.max_jitter_ms == 0 {
        0
    } else {
        rng.gen_range(0..=policy.max_jitter_ms)
    };
    base_delay(policy, attempt) + Duration::from_millis(jitter_ms)
}

/// Delay before retry number `attempt + 1`, using the thread-local RNG.
pub fn retry_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    delay_with_jitter(policy, attempt, &mut rand::thread_rng())
}
