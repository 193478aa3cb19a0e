//! Candle intervals such as `1m`, `15m`, `4h`, `1w` or `1M`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::KlineError;

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;
const WEEK_MS: u64 = 7 * DAY_MS;

/// Calendar unit of an [`Interval`], identified by its single-letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntervalUnit {
    /// `m`
    Minute,
    /// `h`
    Hour,
    /// `d`
    Day,
    /// `w`, weeks start Monday 00:00 UTC.
    Week,
    /// `M`, calendar months.
    Month,
}

impl IntervalUnit {
    /// All units in ascending order of size.
    pub const ALL: [Self; 5] = [
        Self::Minute,
        Self::Hour,
        Self::Day,
        Self::Week,
        Self::Month,
    ];

    /// The single-letter code used in interval strings.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Minute => 'm',
            Self::Hour => 'h',
            Self::Day => 'd',
            Self::Week => 'w',
            Self::Month => 'M',
        }
    }

    /// Parse a single-letter code. Case matters: `m` is minutes, `M` is months.
    #[must_use]
    pub const fn from_letter(c: char) -> Option<Self> {
        match c {
            'm' => Some(Self::Minute),
            'h' => Some(Self::Hour),
            'd' => Some(Self::Day),
            'w' => Some(Self::Week),
            'M' => Some(Self::Month),
            _ => None,
        }
    }

    /// Width of one unit in milliseconds; `None` for months, which vary in length.
    #[must_use]
    pub const fn millis(self) -> Option<u64> {
        match self {
            Self::Minute => Some(MINUTE_MS),
            Self::Hour => Some(HOUR_MS),
            Self::Day => Some(DAY_MS),
            Self::Week => Some(WEEK_MS),
            Self::Month => None,
        }
    }
}

/// A candle interval: a unit and a positive multiplier.
///
/// Serialized as its display form (`"15m"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    unit: IntervalUnit,
    duration: u32,
}

impl Interval {
    /// `1m`
    pub const ONE_MINUTE: Self = Self::of(IntervalUnit::Minute, 1);
    /// `1h`
    pub const ONE_HOUR: Self = Self::of(IntervalUnit::Hour, 1);
    /// `1d`
    pub const ONE_DAY: Self = Self::of(IntervalUnit::Day, 1);
    /// `1w`
    pub const ONE_WEEK: Self = Self::of(IntervalUnit::Week, 1);
    /// `1M`
    pub const ONE_MONTH: Self = Self::of(IntervalUnit::Month, 1);

    const fn of(unit: IntervalUnit, duration: u32) -> Self {
        Self { unit, duration }
    }

    /// Build an interval.
    ///
    /// # Errors
    /// Returns `KlineError::InvalidArg` when `duration` is zero.
    pub fn new(unit: IntervalUnit, duration: u32) -> Result<Self, KlineError> {
        if duration == 0 {
            return Err(KlineError::InvalidArg(format!(
                "interval duration must be positive (unit {})",
                unit.letter()
            )));
        }
        Ok(Self::of(unit, duration))
    }

    /// `const` constructor; `None` when `duration` is zero.
    #[must_use]
    pub const fn checked(unit: IntervalUnit, duration: u32) -> Option<Self> {
        if duration == 0 {
            None
        } else {
            Some(Self::of(unit, duration))
        }
    }

    /// Shorthand for `n` minutes.
    ///
    /// # Errors
    /// Returns `KlineError::InvalidArg` when `n` is zero.
    pub fn minutes(n: u32) -> Result<Self, KlineError> {
        Self::new(IntervalUnit::Minute, n)
    }

    /// Shorthand for `n` hours.
    ///
    /// # Errors
    /// Returns `KlineError::InvalidArg` when `n` is zero.
    pub fn hours(n: u32) -> Result<Self, KlineError> {
        Self::new(IntervalUnit::Hour, n)
    }

    /// Shorthand for `n` days.
    ///
    /// # Errors
    /// Returns `KlineError::InvalidArg` when `n` is zero.
    pub fn days(n: u32) -> Result<Self, KlineError> {
        Self::new(IntervalUnit::Day, n)
    }

    /// The interval's unit.
    #[must_use]
    pub const fn unit(self) -> IntervalUnit {
        self.unit
    }

    /// The interval's multiplier.
    #[must_use]
    pub const fn duration(self) -> u32 {
        self.duration
    }

    /// The one-unit interval of the same unit (`15m` -> `1m`).
    #[must_use]
    pub const fn unit_interval(self) -> Self {
        Self::of(self.unit, 1)
    }

    /// Fixed width in milliseconds, `None` for month-based intervals.
    #[must_use]
    pub const fn width_ms(self) -> Option<u64> {
        match self.unit.millis() {
            Some(ms) => Some(ms * (self.duration as u64)),
            None => None,
        }
    }

    /// How many `base` bars make up one bar of `self`, if `self` is an integer
    /// multiple of `base` in the same unit.
    #[must_use]
    pub const fn factor_of(self, base: Self) -> Option<u32> {
        if self.unit as u8 != base.unit as u8 || self.duration % base.duration != 0 {
            return None;
        }
        Some(self.duration / base.duration)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.duration, self.unit.letter())
    }
}

impl FromStr for Interval {
    type Err = KlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars
            .next_back()
            .ok_or_else(|| KlineError::InvalidArg("empty interval".into()))?;
        let unit = IntervalUnit::from_letter(letter)
            .ok_or_else(|| KlineError::InvalidArg(format!("unknown interval unit in {s:?}")))?;
        let digits = chars.as_str();
        let duration: u32 = if digits.is_empty() {
            1
        } else {
            digits
                .parse()
                .map_err(|_| KlineError::InvalidArg(format!("bad interval duration in {s:?}")))?
        };
        Self::new(unit, duration)
    }
}

impl TryFrom<String> for Interval {
    type Error = KlineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats() {
        let iv: Interval = "15m".parse().unwrap();
        assert_eq!(iv.unit(), IntervalUnit::Minute);
        assert_eq!(iv.duration(), 15);
        assert_eq!(iv.to_string(), "15m");
        assert_eq!("M".parse::<Interval>().unwrap(), Interval::ONE_MONTH);
    }

    #[test]
    fn rejects_zero_and_unknown_units() {
        assert!("0h".parse::<Interval>().is_err());
        assert!("5x".parse::<Interval>().is_err());
        assert!("".parse::<Interval>().is_err());
        assert!("-1m".parse::<Interval>().is_err());
    }

    #[test]
    fn factor_requires_same_unit_and_divisor() {
        let m3 = Interval::minutes(3).unwrap();
        let m21 = Interval::minutes(21).unwrap();
        assert_eq!(m21.factor_of(m3), Some(7));
        assert_eq!(m3.factor_of(m21), None);
        assert_eq!(Interval::ONE_HOUR.factor_of(Interval::ONE_MINUTE), None);
    }
}
