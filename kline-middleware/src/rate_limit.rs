//! Token-bucket throttling for upstream candle requests.
//!
//! One [`TokenBucket`] is meant to be shared by every provider talking to the same
//! upstream, so the request budget holds across all symbols and intervals.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use kline_core::{
    FetchDirection, Interval, KLine, KlineError, KlineProvider, Middleware, RateLimitConfig,
};
use tokio::time::Instant;

/// Shared request budget: `burst` back-to-back requests, refilled at a steady rate.
///
/// Callers reserve a token first and sleep off any debt outside the lock, so waiting
/// callers are served in reservation order.
pub struct TokenBucket {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BucketState {
                tokens: f64::from(config.burst.max(1)),
                refilled_at: Instant::now(),
            }),
        }
    }

    /// The configuration this bucket enforces.
    #[must_use]
    pub const fn config(&self) -> RateLimitConfig {
        self.config
    }

    fn unlimited(&self) -> bool {
        !(self.config.requests_per_second.is_finite() && self.config.requests_per_second > 0.0)
    }

    /// Take one token and return how long the caller must wait before using it.
    ///
    /// A non-positive or non-finite rate disables throttling.
    pub fn reserve(&self) -> Duration {
        if self.unlimited() {
            return Duration::ZERO;
        }
        let rate = self.config.requests_per_second;
        let capacity = f64::from(self.config.burst.max(1));
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(st.refilled_at).as_secs_f64();
        st.tokens = elapsed.mul_add(rate, st.tokens).min(capacity);
        st.refilled_at = now;
        st.tokens -= 1.0;
        if st.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-st.tokens / rate)
        }
    }

    /// Wait until a request may be issued.
    pub async fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            #[cfg(feature = "tracing")]
            tracing::debug!(wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX), "rate limiter delaying request");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Provider wrapper that draws a token before every upstream fetch.
pub struct RateLimitedProvider {
    inner: Arc<dyn KlineProvider>,
    bucket: Arc<TokenBucket>,
}

impl RateLimitedProvider {
    /// Wrap `inner`, throttled by `bucket`.
    pub fn new(inner: Arc<dyn KlineProvider>, bucket: Arc<TokenBucket>) -> Self {
        Self { inner, bucket }
    }

    /// Access the wrapped provider.
    pub fn inner(&self) -> &Arc<dyn KlineProvider> {
        &self.inner
    }
}

#[async_trait]
impl KlineProvider for RateLimitedProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn supported_intervals(&self) -> &'static [Interval] {
        self.inner.supported_intervals()
    }

    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    async fn fetch_recent(&self, symbol: &str, interval: Interval) -> Result<Vec<KLine>, KlineError> {
        self.bucket.acquire().await;
        self.inner.fetch_recent(symbol, interval).await
    }

    async fn fetch_range(
        &self,
        symbol: &str,
        interval: Interval,
        direction: FetchDirection,
        from: u64,
    ) -> Result<Vec<KLine>, KlineError> {
        self.bucket.acquire().await;
        self.inner.fetch_range(symbol, interval, direction, from).await
    }
}

/// Middleware config for constructing a [`RateLimitedProvider`].
pub struct RateLimitMiddleware {
    bucket: Arc<TokenBucket>,
}

impl RateLimitMiddleware {
    /// A middleware with its own bucket.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: Arc::new(TokenBucket::new(config)),
        }
    }

    /// A middleware drawing from a bucket shared with other providers.
    #[must_use]
    pub const fn shared(bucket: Arc<TokenBucket>) -> Self {
        Self { bucket }
    }
}

impl Middleware for RateLimitMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn KlineProvider>) -> Arc<dyn KlineProvider> {
        Arc::new(RateLimitedProvider::new(inner, self.bucket))
    }

    fn name(&self) -> &'static str {
        "RateLimitedProvider"
    }

    fn config_json(&self) -> serde_json::Value {
        let cfg = self.bucket.config();
        serde_json::json!({
            "requests_per_second": cfg.requests_per_second,
            "burst": cfg.burst,
        })
    }
}
