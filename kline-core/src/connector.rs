use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::stream::FeedHandle;
use crate::{Interval, KLine, KlineError};

/// Direction of a paged provider fetch relative to its cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchDirection {
    /// Bars strictly older than the cursor (newest page first).
    Backward,
    /// Bars strictly newer than the cursor (oldest page first).
    Forward,
}

/// Upstream source of candle history (an exchange REST API).
///
/// Every method returns bars **ascending** by `open_time`. Chain pointers are set
/// on every bar, including the oldest bar of a page, except when the provider
/// knows the bar has no predecessor (start of listing): then it carries
/// [`UNKNOWN_PREDECESSOR`](crate::UNKNOWN_PREDECESSOR).
#[async_trait]
pub trait KlineProvider: Send + Sync {
    /// A stable identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Base intervals this provider serves natively.
    fn supported_intervals(&self) -> &'static [Interval];

    /// Maximum bars returned by one call.
    fn page_size(&self) -> usize {
        1000
    }

    /// The most recent window: closed history ending in the still-forming bar
    /// (`closed == false`) as last element.
    async fn fetch_recent(&self, symbol: &str, interval: Interval) -> Result<Vec<KLine>, KlineError>;

    /// One page relative to `from` (exclusive).
    ///
    /// `Backward` returns the newest `page_size()` bars with `open_time < from`;
    /// `Forward` the oldest `page_size()` bars with `open_time > from`, where the
    /// live bar, if reached, is returned with `closed == false`.
    async fn fetch_range(
        &self,
        symbol: &str,
        interval: Interval,
        direction: FetchDirection,
        from: u64,
    ) -> Result<Vec<KLine>, KlineError>;
}

/// Persistent, append-only candle storage with one table per supported interval.
#[async_trait]
pub trait KlineStore: Send + Sync {
    /// Intervals that have a table.
    fn supported_intervals(&self) -> &'static [Interval];

    /// Up to `limit` bars with `open_time <= until`, **newest first**.
    async fn query(
        &self,
        symbol: &str,
        interval: Interval,
        until: u64,
        limit: usize,
    ) -> Result<Vec<KLine>, KlineError>;

    /// Insert-if-absent keyed by `(symbol, interval, open_time)`.
    ///
    /// Returns `true` if a new row was written, `false` on conflict.
    async fn insert(&self, interval: Interval, kline: &KLine) -> Result<bool, KlineError>;

    /// Open time of the newest stored bar, if any.
    async fn latest_open_time(&self, symbol: &str, interval: Interval)
    -> Result<Option<u64>, KlineError>;

    /// Open time of the oldest stored bar, if any.
    async fn oldest_open_time(&self, symbol: &str, interval: Interval)
    -> Result<Option<u64>, KlineError>;
}

/// One streaming tick: a partial or final update of the bar for a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEvent {
    /// Instrument identifier.
    pub symbol: String,
    /// Base interval of the stream.
    pub interval: Interval,
    /// The bar as currently known; `closed` marks the final update.
    pub kline: KLine,
}

/// Live candle stream (an exchange websocket).
///
/// Events for one `(symbol, interval)` arrive in temporal order; the same
/// `open_time` may repeat (refinement) before advancing.
#[async_trait]
pub trait KlineFeed: Send + Sync {
    /// A stable identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Subscribe to the given streams.
    async fn subscribe(
        &self,
        streams: &[(String, Interval)],
    ) -> Result<(FeedHandle, tokio::sync::mpsc::Receiver<FeedEvent>), KlineError>;
}
