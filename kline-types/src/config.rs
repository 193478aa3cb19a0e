//! Configuration types shared by the orchestrator, the backfill engine and the live cache.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Interval;

/// Exponential backoff and retry budget for transient upstream failures.
///
/// Used by the live-cache loader and by every provider call made during backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry, in milliseconds.
    pub min_backoff_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Exponential factor to increase delay after each failure (>= 1).
    pub factor: u32,
    /// Random jitter percentage [0, 100] added to each delay.
    pub jitter_percent: u8,
    /// Total attempts including the first one (>= 1).
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: 500,
            max_backoff_ms: 30_000,
            factor: 2,
            jitter_percent: 20,
            max_attempts: 8,
        }
    }
}

impl BackoffConfig {
    /// Un-jittered delay after `failures` consecutive failures (1-based).
    #[must_use]
    pub fn delay_ms(&self, failures: u32) -> u64 {
        let factor = u64::from(self.factor.max(1));
        let mut delay = self.min_backoff_ms;
        for _ in 1..failures {
            delay = delay.saturating_mul(factor);
            if delay >= self.max_backoff_ms {
                return self.max_backoff_ms;
            }
        }
        delay.min(self.max_backoff_ms)
    }
}

/// Token-bucket settings for the process-wide upstream request limiter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained refill rate in requests per second.
    pub requests_per_second: f64,
    /// Bucket capacity: requests that may be issued back to back.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 15.0,
            burst: 3,
        }
    }
}

/// Paging bounds for the backfill engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Rows requested from the store per page.
    pub store_page_size: usize,
    /// Upper bound on provider rows fetched by one reconciliation step.
    pub max_rows_per_call: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            store_page_size: 1000,
            max_rows_per_call: 5000,
        }
    }
}

/// Which base intervals the live cache tracks and how much closed history each keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveCacheConfig {
    /// `(base interval, archive length)` pairs.
    pub archive_lengths: Vec<(Interval, usize)>,
}

impl Default for LiveCacheConfig {
    fn default() -> Self {
        Self {
            archive_lengths: vec![(Interval::ONE_MINUTE, 1500), (Interval::ONE_HOUR, 50)],
        }
    }
}

/// Global configuration for the `KlineService` orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct KlineConfig {
    /// Retry policy for transient upstream failures.
    pub backoff: BackoffConfig,
    /// Store paging and provider row bounds.
    pub backfill: BackfillConfig,
    /// Live cache tracking.
    pub live: LiveCacheConfig,
    /// Optional deadline for a whole read or backfill call.
    pub request_timeout: Option<Duration>,
}
