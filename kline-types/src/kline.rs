use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Chain-pointer value meaning "predecessor unknown": either the true start of
/// history or a gap that still needs repair.
pub const UNKNOWN_PREDECESSOR: u64 = 0;

/// One OHLCV interval for one symbol.
///
/// Times are millisecond epoch bounds; a fully-formed bar satisfies
/// `close_time == open_time + width - 1`. Bars are ordered by `open_time`
/// everywhere in this workspace; structural equality compares every field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KLine {
    /// Instrument identifier, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Inclusive start of the bar, ms since epoch.
    pub open_time: u64,
    /// Inclusive end of the bar, ms since epoch.
    pub close_time: u64,
    /// First traded price.
    pub open: Decimal,
    /// Last traded price.
    pub close: Decimal,
    /// Highest traded price.
    pub high: Decimal,
    /// Lowest traded price.
    pub low: Decimal,
    /// Traded base-asset volume.
    pub base_volume: Decimal,
    /// Traded quote-asset volume.
    pub quote_volume: Decimal,
    /// Base volume bought by takers.
    pub taker_buy_base_volume: Decimal,
    /// Quote volume bought by takers.
    pub taker_buy_quote_volume: Decimal,
    /// `close_time` of the chronologically preceding bar, or [`UNKNOWN_PREDECESSOR`].
    pub prev_close_time: u64,
    /// Whether the bar is finalized. Open bars may still change and are never persisted.
    pub closed: bool,
}

impl KLine {
    /// Chain law: `self` directly follows `prev`.
    #[must_use]
    pub const fn follows(&self, prev: &Self) -> bool {
        self.prev_close_time == prev.close_time
    }

    /// Whether the chain pointer refers to a known predecessor.
    #[must_use]
    pub const fn has_known_predecessor(&self) -> bool {
        self.prev_close_time != UNKNOWN_PREDECESSOR
    }

    /// Whether the bar may be written to persistent storage (closed, chained).
    #[must_use]
    pub const fn is_persistable(&self) -> bool {
        self.closed && self.has_known_predecessor()
    }

    /// `open_time` as a UTC timestamp, for display.
    #[must_use]
    pub fn open_datetime(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.open_time)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_predicates() {
        let a = KLine {
            open_time: 0,
            close_time: 59_999,
            closed: true,
            ..KLine::default()
        };
        let mut b = KLine {
            open_time: 60_000,
            close_time: 119_999,
            prev_close_time: 59_999,
            closed: true,
            ..KLine::default()
        };
        assert!(b.follows(&a));
        assert!(b.is_persistable());
        assert!(!a.is_persistable());
        b.closed = false;
        assert!(!b.is_persistable());
        assert_eq!(
            b.open_datetime().map(|t| t.timestamp()),
            Some(60)
        );
    }
}
