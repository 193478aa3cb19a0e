//! Supported timeframe tables and optimal-timeframe selection.
//!
//! A source (provider or store) natively serves a fixed set of intervals. A request for
//! any other interval is served by loading the largest native interval of the same unit
//! that divides it, then resampling.

use crate::types::{Interval, IntervalUnit};

/// A list of natively supported intervals.
pub type TimeframeTable = &'static [Interval];

const fn iv(unit: IntervalUnit, duration: u32) -> Interval {
    match Interval::checked(unit, duration) {
        Some(i) => i,
        None => Interval::ONE_MINUTE,
    }
}

/// Intervals an upstream exchange serves natively.
pub const PROVIDER_TIMEFRAMES: TimeframeTable = &[
    iv(IntervalUnit::Minute, 1),
    iv(IntervalUnit::Minute, 3),
    iv(IntervalUnit::Minute, 5),
    iv(IntervalUnit::Minute, 15),
    iv(IntervalUnit::Minute, 30),
    iv(IntervalUnit::Hour, 1),
    iv(IntervalUnit::Hour, 2),
    iv(IntervalUnit::Hour, 4),
    iv(IntervalUnit::Hour, 6),
    iv(IntervalUnit::Hour, 8),
    iv(IntervalUnit::Hour, 12),
    iv(IntervalUnit::Day, 1),
    iv(IntervalUnit::Day, 3),
    iv(IntervalUnit::Week, 1),
    iv(IntervalUnit::Month, 1),
];

/// Intervals the persistent store keeps tables for.
pub const STORE_TIMEFRAMES: TimeframeTable = &[
    iv(IntervalUnit::Minute, 1),
    iv(IntervalUnit::Minute, 2),
    iv(IntervalUnit::Minute, 3),
    iv(IntervalUnit::Minute, 4),
    iv(IntervalUnit::Minute, 5),
    iv(IntervalUnit::Minute, 21),
    iv(IntervalUnit::Minute, 72),
    iv(IntervalUnit::Hour, 1),
    iv(IntervalUnit::Hour, 4),
    iv(IntervalUnit::Hour, 6),
    iv(IntervalUnit::Day, 1),
    iv(IntervalUnit::Day, 3),
    iv(IntervalUnit::Week, 1),
    iv(IntervalUnit::Month, 1),
];

/// Pick the largest interval in `table` with the same unit as `interval` whose duration
/// divides `interval`'s duration.
///
/// Returns `None` when the table has no compatible entry.
#[must_use]
pub fn optimal_timeframe(table: &[Interval], interval: Interval) -> Option<Interval> {
    table
        .iter()
        .copied()
        .filter(|base| interval.factor_of(*base).is_some())
        .max_by_key(|base| base.duration())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Interval {
        s.parse().unwrap()
    }

    #[test]
    fn picks_largest_divisor() {
        assert_eq!(optimal_timeframe(PROVIDER_TIMEFRAMES, parse("45m")), Some(parse("15m")));
        assert_eq!(optimal_timeframe(PROVIDER_TIMEFRAMES, parse("7m")), Some(parse("1m")));
        assert_eq!(optimal_timeframe(STORE_TIMEFRAMES, parse("42m")), Some(parse("21m")));
        assert_eq!(optimal_timeframe(STORE_TIMEFRAMES, parse("144m")), Some(parse("72m")));
        assert_eq!(optimal_timeframe(PROVIDER_TIMEFRAMES, parse("24h")), Some(parse("12h")));
        assert_eq!(optimal_timeframe(STORE_TIMEFRAMES, parse("3M")), Some(parse("1M")));
    }

    #[test]
    fn exact_match_wins() {
        assert_eq!(optimal_timeframe(STORE_TIMEFRAMES, parse("4h")), Some(parse("4h")));
    }

    #[test]
    fn none_without_compatible_unit() {
        assert_eq!(optimal_timeframe(&[Interval::ONE_MINUTE], Interval::ONE_DAY), None);
        assert_eq!(optimal_timeframe(&[], Interval::ONE_MINUTE), None);
    }
}
