use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kline_core::{
    FetchDirection, Interval, KLine, KlineError, KlineProvider, PROVIDER_TIMEFRAMES,
};

use crate::timeline::SyntheticTimeline;

/// Synthetic exchange serving a [`SyntheticTimeline`] with a movable clock.
///
/// Pages follow the exchange contract: ascending bars, at most `page_size` per call,
/// the bar containing "now" returned open. Failures and latency can be injected.
pub struct MockProvider {
    name: &'static str,
    timeline: SyntheticTimeline,
    now: AtomicU64,
    page_size: usize,
    intervals: &'static [Interval],
    delay: Option<Duration>,
    failures_left: AtomicU32,
    recent_calls: AtomicUsize,
    range_calls: AtomicUsize,
    rows_served: AtomicUsize,
}

impl MockProvider {
    /// History listed at `listing_start`, wall clock at `now` (both ms since epoch).
    #[must_use]
    pub const fn new(listing_start: u64, now: u64) -> Self {
        Self {
            name: "kline-mock",
            timeline: SyntheticTimeline::new(listing_start),
            now: AtomicU64::new(now),
            page_size: 1000,
            intervals: PROVIDER_TIMEFRAMES,
            delay: None,
            failures_left: AtomicU32::new(0),
            recent_calls: AtomicUsize::new(0),
            range_calls: AtomicUsize::new(0),
            rows_served: AtomicUsize::new(0),
        }
    }

    /// Override the maximum bars per page.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Override the natively supported intervals.
    #[must_use]
    pub const fn with_intervals(mut self, intervals: &'static [Interval]) -> Self {
        self.intervals = intervals;
        self
    }

    /// Sleep this long inside every fetch.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report a different provider name.
    #[must_use]
    pub const fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Move the wall clock.
    pub fn set_now(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Current wall clock.
    pub fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    /// Make the next `n` fetches fail with `ProviderUnavailable`.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Number of `fetch_recent` calls observed.
    pub fn recent_calls(&self) -> usize {
        self.recent_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_range` calls observed.
    pub fn range_calls(&self) -> usize {
        self.range_calls.load(Ordering::SeqCst)
    }

    /// Total bars returned so far.
    pub fn rows_served(&self) -> usize {
        self.rows_served.load(Ordering::SeqCst)
    }

    /// The bar this provider would serve for `open_time` right now.
    pub fn bar(&self, symbol: &str, interval: Interval, open_time: u64) -> Option<KLine> {
        self.timeline.bar(symbol, interval, open_time, self.now())
    }

    /// Open time of the bar containing the current wall clock.
    pub fn live_open(&self, interval: Interval) -> Option<u64> {
        SyntheticTimeline::bounds(interval, self.now()).map(|b| b.start)
    }

    async fn enter(&self, interval: Interval) -> Result<u64, KlineError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(KlineError::provider(self.name, "injected failure"));
        }
        if !self.intervals.contains(&interval) {
            return Err(KlineError::unsupported_interval(interval, self.name));
        }
        Ok(self.now())
    }

    // Newest-to-oldest walk from `newest`, returned ascending.
    fn page_back(&self, symbol: &str, interval: Interval, newest: Option<u64>, now: u64) -> Vec<KLine> {
        let mut out = Vec::new();
        let mut cursor = newest;
        while let Some(open) = cursor {
            if out.len() >= self.page_size {
                break;
            }
            let Some(bar) = self.timeline.bar(symbol, interval, open, now) else {
                break;
            };
            out.push(bar);
            cursor = self.timeline.prev_open(interval, open);
        }
        out.reverse();
        out
    }

    fn served(&self, bars: Vec<KLine>) -> Vec<KLine> {
        self.rows_served.fetch_add(bars.len(), Ordering::SeqCst);
        bars
    }
}

#[async_trait]
impl KlineProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supported_intervals(&self) -> &'static [Interval] {
        self.intervals
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn fetch_recent(&self, symbol: &str, interval: Interval) -> Result<Vec<KLine>, KlineError> {
        self.recent_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.enter(interval).await?;
        let live = SyntheticTimeline::bounds(interval, now).map(|b| b.start);
        Ok(self.served(self.page_back(symbol, interval, live, now)))
    }

    async fn fetch_range(
        &self,
        symbol: &str,
        interval: Interval,
        direction: FetchDirection,
        from: u64,
    ) -> Result<Vec<KLine>, KlineError> {
        self.range_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.enter(interval).await?;
        let Some(live) = SyntheticTimeline::bounds(interval, now).map(|b| b.start) else {
            return Ok(Vec::new());
        };
        let bars = match direction {
            FetchDirection::Backward => {
                let newest = if from > live {
                    Some(live)
                } else {
                    from.checked_sub(1)
                        .and_then(|t| SyntheticTimeline::bounds(interval, t))
                        .map(|b| b.start)
                };
                self.page_back(symbol, interval, newest, now)
            }
            FetchDirection::Forward => {
                let first = self.timeline.first_open(interval).unwrap_or(u64::MAX);
                let mut cursor = SyntheticTimeline::next_open(interval, from).map(|t| t.max(first));
                let mut out = Vec::new();
                while let Some(open) = cursor {
                    if out.len() >= self.page_size || open > live {
                        break;
                    }
                    match self.timeline.bar(symbol, interval, open, now) {
                        Some(bar) => out.push(bar),
                        None => break,
                    }
                    cursor = SyntheticTimeline::next_open(interval, open);
                }
                out
            }
        };
        Ok(self.served(bars))
    }
}
