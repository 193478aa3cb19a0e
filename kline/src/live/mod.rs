//! In-memory live window per tracked `(symbol, base interval)`, fed by streamed ticks.

mod symbol_cache;

use std::collections::HashMap;
use std::sync::Arc;

use kline_core::{
    FeedEvent, FeedHandle, Interval, KLine, KlineConfig, KlineError, KlineFeed, KlineProvider,
    ResamplePlan, SortOrder, resample,
};
use tokio::sync::oneshot;

pub use symbol_cache::SymbolCache;

type CacheKey = (String, Interval);

/// The set of live caches, keyed by `(symbol, base interval)`.
///
/// Cheap to clone; clones share the same caches.
#[derive(Clone)]
pub struct LiveCache {
    caches: Arc<HashMap<CacheKey, Arc<SymbolCache>>>,
}

impl LiveCache {
    /// One cache per tracked symbol and configured base interval.
    pub fn new(provider: Arc<dyn KlineProvider>, symbols: &[String], cfg: &KlineConfig) -> Self {
        let mut caches = HashMap::new();
        for symbol in symbols {
            for &(interval, archive_length) in &cfg.live.archive_lengths {
                caches.insert(
                    (symbol.clone(), interval),
                    Arc::new(SymbolCache::new(
                        symbol.clone(),
                        interval,
                        archive_length,
                        Arc::clone(&provider),
                        cfg.backoff,
                    )),
                );
            }
        }
        Self {
            caches: Arc::new(caches),
        }
    }

    /// Tracked streams, sorted.
    pub fn tracked(&self) -> Vec<(String, Interval)> {
        let mut keys: Vec<CacheKey> = self.caches.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// The cache for one stream, if tracked.
    pub fn symbol_cache(&self, symbol: &str, interval: Interval) -> Option<&Arc<SymbolCache>> {
        self.caches.get(&(symbol.to_string(), interval))
    }

    /// Route a tick to its cache. Returns `false` for untracked streams.
    pub fn apply(&self, event: FeedEvent) -> bool {
        match self.symbol_cache(&event.symbol, event.interval) {
            Some(cache) => {
                cache.set_active_kline(event.kline);
                true
            }
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    symbol = %event.symbol,
                    interval = %event.interval,
                    "tick for untracked stream"
                );
                false
            }
        }
    }

    /// Subscribe `feed` to every tracked stream and pump its ticks into the caches.
    ///
    /// The returned handle owns both the pump and the feed session; stopping or dropping
    /// it ends both.
    ///
    /// # Errors
    /// Propagates the feed's subscription error.
    pub async fn attach_feed(&self, feed: Arc<dyn KlineFeed>) -> Result<FeedHandle, KlineError> {
        let (session, mut rx) = feed.subscribe(&self.tracked()).await?;
        #[cfg(feature = "tracing")]
        tracing::info!(feed = feed.name(), streams = self.caches.len(), "live feed attached");

        let caches = self.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    ev = rx.recv() => match ev {
                        Some(ev) => {
                            caches.apply(ev);
                        }
                        None => break,
                    },
                }
            }
            session.stop().await;
        });
        Ok(FeedHandle::new(pump, stop_tx))
    }

    /// Up-to-date bars of `interval` for `symbol`, resampled from the largest tracked base
    /// interval that divides it.
    ///
    /// Returns `Ok(None)` when no tracked stream can serve the request; the last element of
    /// a served series is the still-forming bar.
    ///
    /// # Errors
    /// Returns `KlineError::LoadFailed` when the cache could not be filled.
    pub async fn get_latest_klines(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<Vec<KLine>>, KlineError> {
        let Some(cache) = self.base_cache(symbol, interval) else {
            return Ok(None);
        };
        let plan = ResamplePlan::new(cache.interval(), interval)?;
        let bars = cache.get_data().await?;
        Ok(Some(resample(&bars, &plan, SortOrder::Ascending)))
    }

    /// The tracked cache for `symbol` with the largest base dividing `interval`.
    pub(crate) fn base_cache(&self, symbol: &str, interval: Interval) -> Option<&Arc<SymbolCache>> {
        self.caches
            .iter()
            .filter(|((s, base), _)| s == symbol && interval.factor_of(*base).is_some())
            .max_by_key(|((_, base), _)| base.duration())
            .map(|(_, cache)| cache)
    }
}
