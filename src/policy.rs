use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ApiError, Result};

/// Status codes retried by default.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Retry, backoff and caching behaviour of a [`crate::ResilientClient`].
///
/// Each execution takes a snapshot of the policy when it starts; updates
/// apply to executions started afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Growth factor applied per retry. Must be finite and at least 1.0.
    pub backoff_multiplier: f64,
    /// Upper bound of the exponential part of the delay.
    pub max_retry_delay_ms: u64,
    /// HTTP statuses eligible for retry.
    pub retryable_status_codes: BTreeSet<u16>,
    /// Whether successful GET responses are kept for fallback.
    pub caching_enabled: bool,
    /// Max-age of cached GET responses when the caller supplies none.
    pub default_cache_max_age_ms: u64,
    /// Upper bound of the uniform jitter added to every delay.
    pub max_jitter_ms: u64,
    /// Timeout for a single attempt. `None` leaves it to the wrapped client.
    pub attempt_timeout_ms: Option<u64>,
    /// Sort query parameters by key before fingerprinting.
    pub canonical_params: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_retry_delay_ms: 10_000,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
            caching_enabled: true,
            default_cache_max_age_ms: 300_000,
            max_jitter_ms: 1_000,
            attempt_timeout_ms: None,
            canonical_params: true,
        }
    }
}

impl RetryPolicy {
    /// Parses a policy document. Missing fields take their defaults.
    pub fn from_json(document: &str) -> Result<Self> {
        let policy: Self = serde_json::from_str(document)
            .map_err(|err| ApiError::InvalidConfig(format!("retry policy: {err}")))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Rejects values the backoff computation cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ApiError::InvalidConfig(format!(
                "backoff_multiplier must be finite and >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.attempt_timeout_ms == Some(0) {
            return Err(ApiError::InvalidConfig(
                "attempt_timeout_ms must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// Returns a copy with `update` merged in.
    pub fn merged(&self, update: &PolicyUpdate) -> Self {
        let mut next = self.clone();
        if let Some(value) = update.max_retries {
            next.max_retries = value;
        }
        if let Some(value) = update.initial_retry_delay_ms {
            next.initial_retry_delay_ms = value;
        }
        if let Some(value) = update.backoff_multiplier {
            next.backoff_multiplier = value;
        }
        if let Some(value) = update.max_retry_delay_ms {
            next.max_retry_delay_ms = value;
        }
        if let Some(value) = &update.retryable_status_codes {
            next.retryable_status_codes = value.clone();
        }
        if let Some(value) = update.caching_enabled {
            next.caching_enabled = value;
        }
        if let Some(value) = update.default_cache_max_age_ms {
            next.default_cache_max_age_ms = value;
        }
        if let Some(value) = update.max_jitter_ms {
            next.max_jitter_ms = value;
        }
        if let Some(value) = update.attempt_timeout_ms {
            next.attempt_timeout_ms = value;
        }
        if let Some(value) = update.canonical_params {
            next.canonical_params = value;
        }
        next
    }

    pub fn is_retryable(&self, err: &ApiError) -> bool {
        err.is_retryable(&self.retryable_status_codes)
    }

    pub fn default_cache_max_age(&self) -> Duration {
        Duration::from_millis(self.default_cache_max_age_ms)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }
}

/// Partial [`RetryPolicy`]; `None` fields keep the current value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyUpdate {
    pub max_retries: Option<u32>,
    pub initial_retry_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub max_retry_delay_ms: Option<u64>,
    pub retryable_status_codes: Option<BTreeSet<u16>>,
    pub caching_enabled: Option<bool>,
    pub default_cache_max_age_ms: Option<u64>,
    pub max_jitter_ms: Option<u64>,
    /// `Some(None)` removes the attempt timeout.
    pub attempt_timeout_ms: Option<Option<u64>>,
    pub canonical_params: Option<bool>,
}

impl PolicyUpdate {
    pub fn max_retries(mut self, value: u32) -> Self {
        self.max_retries = Some(value);
        self
    }

    pub fn initial_retry_delay_ms(mut self, value: u64) -> Self {
        self.initial_retry_delay_ms = Some(value);
        self
    }

    pub fn backoff_multiplier(mut self, value: f64) -> Self {
        self.backoff_multiplier = Some(value);
        self
    }

    pub fn max_retry_delay_ms(mut self, value: u64) -> Self {
        self.max_retry_delay_ms = Some(value);
        self
    }

    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = Some(codes.into_iter().collect());
        self
    }

    pub fn caching_enabled(mut self, value: bool) -> Self {
        self.caching_enabled = Some(value);
        self
    }

    pub fn default_cache_max_age_ms(mut self, value: u64) -> Self {
        self.default_cache_max_age_ms = Some(value);
        self
    }

    pub fn max_jitter_ms(mut self, value: u64) -> Self {
        self.max_jitter_ms = Some(value);
        self
    }

    pub fn attempt_timeout_ms(mut self, value: Option<u64>) -> Self {
        self.attempt_timeout_ms = Some(value);
        self
    }

    pub fn canonical_params(mut self, value: bool) -> Self {
        self.canonical_params = Some(value);
        self
    }
}
