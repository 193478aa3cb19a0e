use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kline_core::{
    BackfillConfig, BackoffConfig, FeedHandle, Interval, KLine, KlineConfig, KlineError, KlineFeed,
    KlineProvider, KlineStore, LiveCacheConfig, Middleware, RateLimitConfig, ResamplePlan,
    SortOrder, check_chain, resample,
};
use kline_middleware::RateLimitMiddleware;

use crate::backfill::engine::{Engine, read_from_provider};
use crate::backfill::{BackfillDirection, BackfillReport};
use crate::live::LiveCache;

/// Chain-validated candle service over a provider, an optional store and a live cache.
pub struct KlineService {
    provider: Arc<dyn KlineProvider>,
    store: Option<Arc<dyn KlineStore>>,
    live: LiveCache,
    cfg: KlineConfig,
}

/// Builder for [`KlineService`].
pub struct KlineServiceBuilder {
    provider: Option<Arc<dyn KlineProvider>>,
    store: Option<Arc<dyn KlineStore>>,
    symbols: Vec<String>,
    middlewares: Vec<Box<dyn Middleware>>,
    cfg: KlineConfig,
}

impl Default for KlineServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KlineServiceBuilder {
    /// Start with no collaborators and default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            provider: None,
            store: None,
            symbols: Vec::new(),
            middlewares: Vec::new(),
            cfg: KlineConfig::default(),
        }
    }

    /// Upstream candle source. Required.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn KlineProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Persistent store. Without one, reads are served from the provider directly.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KlineStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Keep a live cache for `symbol` at every configured base interval.
    #[must_use]
    pub fn track_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbols.push(symbol.into());
        self
    }

    /// Track several symbols at once.
    #[must_use]
    pub fn track_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols.extend(symbols.into_iter().map(Into::into));
        self
    }

    /// Wrap the provider. Layers are applied in registration order, so the last one
    /// registered sees requests first.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Box<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Throttle every provider call with a token bucket.
    #[must_use]
    pub fn rate_limit(self, cfg: RateLimitConfig) -> Self {
        self.with_middleware(Box::new(RateLimitMiddleware::new(cfg)))
    }

    /// Retry policy for transient provider failures.
    #[must_use]
    pub const fn backoff(mut self, cfg: BackoffConfig) -> Self {
        self.cfg.backoff = cfg;
        self
    }

    /// Store paging and provider row bounds.
    #[must_use]
    pub const fn backfill_config(mut self, cfg: BackfillConfig) -> Self {
        self.cfg.backfill = cfg;
        self
    }

    /// Base intervals and archive lengths of the live cache.
    #[must_use]
    pub fn live_config(mut self, cfg: LiveCacheConfig) -> Self {
        self.cfg.live = cfg;
        self
    }

    /// Deadline for every read and backfill call.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.cfg.request_timeout = Some(timeout);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, cfg: KlineConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Build the service.
    ///
    /// # Errors
    /// Returns `InvalidArg` if no provider was registered via [`with_provider`](Self::with_provider).
    pub fn build(self) -> Result<KlineService, KlineError> {
        let Some(mut provider) = self.provider else {
            return Err(KlineError::InvalidArg(
                "no provider registered; add one via with_provider(...)".to_string(),
            ));
        };
        for mw in self.middlewares {
            #[cfg(feature = "tracing")]
            tracing::debug!(middleware = mw.name(), config = %mw.config_json(), "applying provider middleware");
            provider = mw.apply(provider);
        }

        let mut seen = HashSet::new();
        let symbols: Vec<String> = self
            .symbols
            .into_iter()
            .filter(|s| seen.insert(s.clone()))
            .collect();
        let live = LiveCache::new(Arc::clone(&provider), &symbols, &self.cfg);

        Ok(KlineService {
            provider,
            store: self.store,
            live,
            cfg: self.cfg,
        })
    }
}

/// Bound `fut` by an optional deadline, mapping expiry to `RequestTimeout`.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(
        name = "kline::core::with_request_deadline",
        skip(fut),
        fields(timeout_ms = deadline.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))),
    )
)]
pub(crate) async fn with_request_deadline<T, Fut>(
    deadline: Option<Duration>,
    operation: &'static str,
    fut: Fut,
) -> Result<T, KlineError>
where
    Fut: std::future::Future<Output = Result<T, KlineError>>,
{
    match deadline {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .unwrap_or_else(|_| Err(KlineError::request_timeout(operation))),
        None => fut.await,
    }
}

impl KlineService {
    /// Start building a service.
    #[must_use]
    pub fn builder() -> KlineServiceBuilder {
        KlineServiceBuilder::new()
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &KlineConfig {
        &self.cfg
    }

    /// The live caches.
    #[must_use]
    pub const fn live_cache(&self) -> &LiveCache {
        &self.live
    }

    /// The last `limit` bars up to the live edge, newest last. The final bar may still be
    /// forming (`closed == false`).
    ///
    /// # Errors
    /// `UnsupportedInterval` when neither the store nor the provider can serve `interval`,
    /// `ChainBreak` when the history cannot be made contiguous, collaborator errors
    /// otherwise.
    pub async fn get_last_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<KLine>, KlineError> {
        self.read("get_last_klines", symbol, interval, None, limit).await
    }

    /// The last `limit` bars with `open_time <= timestamp`, newest last.
    ///
    /// # Errors
    /// As [`get_last_klines`](Self::get_last_klines).
    pub async fn get_last_klines_from_timestamp(
        &self,
        symbol: &str,
        interval: Interval,
        timestamp: u64,
        limit: usize,
    ) -> Result<Vec<KLine>, KlineError> {
        self.read(
            "get_last_klines_from_timestamp",
            symbol,
            interval,
            Some(timestamp),
            limit,
        )
        .await
    }

    /// Live-cache bars for `interval`, or `None` if no tracked stream can serve it.
    ///
    /// # Errors
    /// `LoadFailed` when the cache could not be filled.
    pub async fn get_latest_klines(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<Vec<KLine>>, KlineError> {
        self.live.get_latest_klines(symbol, interval).await
    }

    /// Extend the stored history of `symbol` at the store table serving `interval`,
    /// fetching at most about `limit` provider rows.
    ///
    /// # Errors
    /// `InvalidArg` when the service has no store; collaborator errors otherwise.
    pub async fn backfill(
        &self,
        symbol: &str,
        interval: Interval,
        direction: BackfillDirection,
        limit: usize,
    ) -> Result<BackfillReport, KlineError> {
        let Some(store) = &self.store else {
            return Err(KlineError::InvalidArg(
                "backfill requires a store; add one via with_store(...)".to_string(),
            ));
        };
        let engine = Engine::new(&self.provider, store, &self.cfg);
        with_request_deadline(
            self.cfg.request_timeout,
            "backfill",
            engine.backfill(symbol, interval, direction, limit),
        )
        .await
    }

    /// Attach a streaming feed to the live caches.
    ///
    /// # Errors
    /// Propagates the feed's subscription error.
    pub async fn attach_feed(&self, feed: Arc<dyn KlineFeed>) -> Result<FeedHandle, KlineError> {
        self.live.attach_feed(feed).await
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "kline::core::read",
            skip(self),
            fields(interval = %interval),
        )
    )]
    async fn read(
        &self,
        operation: &'static str,
        symbol: &str,
        interval: Interval,
        cursor: Option<u64>,
        limit: usize,
    ) -> Result<Vec<KLine>, KlineError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        with_request_deadline(self.cfg.request_timeout, operation, async {
            if let Some(bars) = self.from_live(symbol, interval, cursor, limit).await {
                return Ok(bars);
            }
            match &self.store {
                Some(store) => {
                    Engine::new(&self.provider, store, &self.cfg)
                        .read(symbol, interval, cursor, limit)
                        .await
                }
                None => {
                    read_from_provider(
                        self.provider.as_ref(),
                        &self.cfg,
                        symbol,
                        interval,
                        cursor,
                        limit,
                    )
                    .await
                }
            }
        })
        .await
    }

    // A live-cache answer, if the cache covers the whole request with a contiguous chain.
    async fn from_live(
        &self,
        symbol: &str,
        interval: Interval,
        cursor: Option<u64>,
        limit: usize,
    ) -> Option<Vec<KLine>> {
        let cache = self.live.base_cache(symbol, interval)?;
        let plan = ResamplePlan::new(cache.interval(), interval).ok()?;
        let mut bars = match cache.get_data().await {
            Ok(bars) => bars,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(symbol, interval = %interval, error = %_e, "live cache unavailable; reading history");
                return None;
            }
        };
        if let Some(c) = cursor {
            bars.retain(|k| k.open_time <= c);
        }
        let mut out = resample(&bars, &plan, SortOrder::Ascending);
        if out.len() < limit {
            return None;
        }
        let out = out.split_off(out.len() - limit);
        check_chain(&out).then_some(out)
    }
}
