use kline_core::{Bucket, Interval, KLine, ResamplePlan, UNKNOWN_PREDECESSOR};
use rust_decimal::Decimal;

/// Deterministic candle history that starts at a fixed listing time.
///
/// Bar prices depend only on the symbol and the bar's open time, so the same bar is
/// produced no matter which page or interval it is read through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticTimeline {
    listing_start: u64,
}

impl SyntheticTimeline {
    /// History begins with the first `interval` bar opening at or after `listing_start`.
    #[must_use]
    pub const fn new(listing_start: u64) -> Self {
        Self { listing_start }
    }

    /// Listing time in milliseconds.
    #[must_use]
    pub const fn listing_start(&self) -> u64 {
        self.listing_start
    }

    /// Bounds of the `interval` bar containing `ts`.
    #[must_use]
    pub fn bounds(interval: Interval, ts: u64) -> Option<Bucket> {
        ResamplePlan::new(interval, interval).ok()?.bucket_of(ts)
    }

    /// Open time of the oldest bar in history.
    #[must_use]
    pub fn first_open(&self, interval: Interval) -> Option<u64> {
        let b = Self::bounds(interval, self.listing_start)?;
        if b.start == self.listing_start {
            Some(b.start)
        } else {
            Some(b.end + 1)
        }
    }

    /// Open time of the bar preceding the one opening at `open_time`.
    #[must_use]
    pub fn prev_open(&self, interval: Interval, open_time: u64) -> Option<u64> {
        let prev = Self::bounds(interval, open_time.checked_sub(1)?)?.start;
        (prev >= self.first_open(interval)?).then_some(prev)
    }

    /// Open time of the bar following the one containing `open_time`.
    #[must_use]
    pub fn next_open(interval: Interval, open_time: u64) -> Option<u64> {
        Self::bounds(interval, open_time)?.end.checked_add(1)
    }

    /// The bar opening at `open_time`, as seen at wall-clock `now`.
    ///
    /// `None` for unaligned times, for bars before the listing and for bars that have not
    /// opened yet. The bar containing `now` is returned with `closed = false`.
    #[must_use]
    pub fn bar(&self, symbol: &str, interval: Interval, open_time: u64, now: u64) -> Option<KLine> {
        let b = Self::bounds(interval, open_time)?;
        let first = self.first_open(interval)?;
        if b.start != open_time || open_time < first || open_time > now {
            return None;
        }
        let seed = seed(symbol, open_time);
        let open = Decimal::new(10_000 + (seed % 5_000) as i64, 2);
        let drift = Decimal::new((seed >> 16) as i64 % 200 - 100, 2);
        let close = open + drift;
        let volume = Decimal::new((seed >> 32) as i64 % 10_000 + 1, 3);
        Some(KLine {
            symbol: symbol.to_string(),
            open_time,
            close_time: b.end,
            open,
            close,
            high: open.max(close) + Decimal::new(25, 2),
            low: open.min(close) - Decimal::new(25, 2),
            base_volume: volume,
            quote_volume: volume * open,
            taker_buy_base_volume: volume / Decimal::TWO,
            taker_buy_quote_volume: volume * open / Decimal::TWO,
            prev_close_time: if open_time == first {
                UNKNOWN_PREDECESSOR
            } else {
                open_time - 1
            },
            closed: b.end < now,
        })
    }
}

// FNV-1a over the symbol and the minute index.
fn seed(symbol: &str, open_time: u64) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in symbol.bytes().chain((open_time / 60_000).to_le_bytes()) {
        h ^= u64::from(byte);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}
