#![allow(dead_code)]

use std::sync::Arc;

use kline::{BackoffConfig, Interval, KLine, KlineService, LiveCacheConfig, check_chain};
use kline_mock::{MemoryStore, MockProvider};

pub const MINUTE: u64 = 60_000;
pub const SYMBOL: &str = "BTCUSDT";
/// Listing time of the synthetic market; aligned to 5 minutes.
pub const LISTING: u64 = 1_000 * MINUTE;
/// Open time of the forming one-minute bar at [`NOW`].
pub const LIVE_OPEN: u64 = LISTING + 300 * MINUTE;
pub const NOW: u64 = LIVE_OPEN + 30_000;

pub fn minutes(n: u32) -> Interval {
    Interval::minutes(n).unwrap()
}

pub fn provider() -> Arc<MockProvider> {
    Arc::new(MockProvider::new(LISTING, NOW).with_page_size(100))
}

pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        min_backoff_ms: 1,
        max_backoff_ms: 4,
        factor: 2,
        jitter_percent: 0,
        max_attempts: 3,
    }
}

pub fn live_config(archive_length: usize) -> LiveCacheConfig {
    LiveCacheConfig {
        archive_lengths: vec![(Interval::ONE_MINUTE, archive_length), (Interval::ONE_HOUR, 3)],
    }
}

/// Store-backed service without live tracking.
pub fn with_store(provider: &Arc<MockProvider>, store: &Arc<MemoryStore>) -> KlineService {
    KlineService::builder()
        .with_provider(provider.clone())
        .with_store(store.clone())
        .backoff(fast_backoff())
        .build()
        .unwrap()
}

/// Provider-only service without live tracking.
pub fn provider_only(provider: &Arc<MockProvider>) -> KlineService {
    KlineService::builder()
        .with_provider(provider.clone())
        .backoff(fast_backoff())
        .build()
        .unwrap()
}

/// Bars are contiguous, chained and `width` wide.
pub fn assert_contiguous(bars: &[KLine], width: u64) {
    assert!(check_chain(bars), "chain broken: {bars:?}");
    for w in bars.windows(2) {
        assert_eq!(w[0].close_time + 1, w[1].open_time);
    }
    for b in bars {
        assert_eq!(b.open_time % width, 0, "unaligned bar at {}", b.open_time);
        assert_eq!(b.close_time - b.open_time + 1, width);
    }
}
