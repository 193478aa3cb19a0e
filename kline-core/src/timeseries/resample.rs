use chrono::{DateTime, Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::types::{Interval, IntervalUnit, KLine, KlineError, UNKNOWN_PREDECESSOR};

const DAY_MS: u64 = 86_400_000;
// 1970-01-01 was a Thursday; shifting by three days puts Monday at the origin.
const WEEK_ORIGIN_SHIFT_MS: u64 = 3 * DAY_MS;

/// Ordering of a bar slice handed to [`resample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Oldest bar first.
    Ascending,
    /// Newest bar first.
    Descending,
}

/// Inclusive millisecond bounds of one target-interval bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// First millisecond of the bucket.
    pub start: u64,
    /// Last millisecond of the bucket.
    pub end: u64,
}

/// A validated base -> target aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResamplePlan {
    base: Interval,
    target: Interval,
    factor: u32,
}

impl ResamplePlan {
    /// Build a plan aggregating `base` bars into `target` bars.
    ///
    /// # Errors
    /// Returns `KlineError::InvalidArg` unless both intervals share a unit and `target`
    /// is an integer multiple of `base`.
    pub fn new(base: Interval, target: Interval) -> Result<Self, KlineError> {
        let factor = target.factor_of(base).ok_or_else(|| {
            KlineError::InvalidArg(format!("cannot resample {base} into {target}"))
        })?;
        Ok(Self {
            base,
            target,
            factor,
        })
    }

    /// Source granularity.
    #[must_use]
    pub const fn base(&self) -> Interval {
        self.base
    }

    /// Output granularity.
    #[must_use]
    pub const fn target(&self) -> Interval {
        self.target
    }

    /// Number of base bars in one complete target bar.
    #[must_use]
    pub const fn factor(&self) -> u32 {
        self.factor
    }

    /// The target bucket containing millisecond `ts`.
    ///
    /// `None` when the bucket starts before the epoch or lies outside the calendar range.
    #[must_use]
    pub fn bucket_of(&self, ts: u64) -> Option<Bucket> {
        let n = u64::from(self.target.duration());
        match self.target.unit() {
            IntervalUnit::Month => month_bucket(ts, self.target.duration()),
            IntervalUnit::Week => {
                let width = self.target.width_ms()?;
                let shifted = ts.checked_add(WEEK_ORIGIN_SHIFT_MS)?;
                let start = (shifted / width * width).checked_sub(WEEK_ORIGIN_SHIFT_MS)?;
                Some(Bucket {
                    start,
                    end: start + width - 1,
                })
            }
            unit => {
                let width = unit.millis()? * n;
                let start = ts / width * width;
                Some(Bucket {
                    start,
                    end: start + width - 1,
                })
            }
        }
    }

    /// Whether `open_time` is the first millisecond of its bucket.
    #[must_use]
    pub fn is_bucket_start(&self, open_time: u64) -> bool {
        self.bucket_of(open_time)
            .is_some_and(|b| b.start == open_time)
    }

    /// Close time of the bucket preceding the one containing `open_time`.
    #[must_use]
    pub fn previous_bucket_end(&self, open_time: u64) -> Option<u64> {
        self.bucket_of(open_time)?.start.checked_sub(1)
    }
}

fn month_index(ts: u64) -> Option<i64> {
    let dt = DateTime::from_timestamp_millis(i64::try_from(ts).ok()?)?;
    Some(i64::from(dt.year()) * 12 + i64::from(dt.month0()))
}

fn month_start_ms(index: i64) -> Option<u64> {
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
    let ms = NaiveDate::from_ymd_opt(year, month, 1)?
        .and_hms_opt(0, 0, 0)?
        .and_utc()
        .timestamp_millis();
    u64::try_from(ms).ok()
}

fn month_bucket(ts: u64, months: u32) -> Option<Bucket> {
    let n = i64::from(months);
    let first = month_index(ts)?.div_euclid(n) * n;
    let start = month_start_ms(first)?;
    let next = month_start_ms(first + n)?;
    Some(Bucket {
        start,
        end: next - 1,
    })
}

struct Accumulator<'a> {
    bucket: Bucket,
    oldest: &'a KLine,
    newest: &'a KLine,
    high: Decimal,
    low: Decimal,
    base_volume: Decimal,
    quote_volume: Decimal,
    taker_buy_base_volume: Decimal,
    taker_buy_quote_volume: Decimal,
    members: u32,
}

impl<'a> Accumulator<'a> {
    fn start(bucket: Bucket, bar: &'a KLine) -> Self {
        Self {
            bucket,
            oldest: bar,
            newest: bar,
            high: bar.high,
            low: bar.low,
            base_volume: bar.base_volume,
            quote_volume: bar.quote_volume,
            taker_buy_base_volume: bar.taker_buy_base_volume,
            taker_buy_quote_volume: bar.taker_buy_quote_volume,
            members: 1,
        }
    }

    fn push(&mut self, bar: &'a KLine) {
        self.newest = bar;
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.base_volume += bar.base_volume;
        self.quote_volume += bar.quote_volume;
        self.taker_buy_base_volume += bar.taker_buy_base_volume;
        self.taker_buy_quote_volume += bar.taker_buy_quote_volume;
        self.members += 1;
    }

    fn finish(self, plan: &ResamplePlan) -> KLine {
        // The bucket points at the end of whichever bucket holds its oldest member's
        // predecessor. A predecessor inside this same bucket means members are missing.
        let prev_close_time = if self.oldest.has_known_predecessor() {
            plan.bucket_of(self.oldest.prev_close_time)
                .filter(|b| b.end < self.bucket.start)
                .map_or(UNKNOWN_PREDECESSOR, |b| b.end)
        } else {
            UNKNOWN_PREDECESSOR
        };
        KLine {
            symbol: self.oldest.symbol.clone(),
            open_time: self.bucket.start,
            close_time: self.bucket.end,
            open: self.oldest.open,
            close: self.newest.close,
            high: self.high,
            low: self.low,
            base_volume: self.base_volume,
            quote_volume: self.quote_volume,
            taker_buy_base_volume: self.taker_buy_base_volume,
            taker_buy_quote_volume: self.taker_buy_quote_volume,
            prev_close_time,
            closed: self.members >= plan.factor && self.newest.closed,
        }
    }
}

/// Aggregate chronologically ordered bars into target buckets.
///
/// Bars before the first bucket boundary are discarded since their bucket cannot be
/// completed without earlier data.
fn aggregate<'a, I>(bars: I, plan: &ResamplePlan) -> Vec<KLine>
where
    I: Iterator<Item = &'a KLine>,
{
    let mut out = Vec::new();
    let mut current: Option<Accumulator<'a>> = None;
    for bar in bars.skip_while(|b| !plan.is_bucket_start(b.open_time)) {
        let Some(bucket) = plan.bucket_of(bar.open_time) else {
            continue;
        };
        match current.as_mut() {
            Some(acc) if acc.bucket == bucket => acc.push(bar),
            _ => {
                if let Some(done) = current.replace(Accumulator::start(bucket, bar)) {
                    out.push(done.finish(plan));
                }
            }
        }
    }
    if let Some(last) = current {
        out.push(last.finish(plan));
    }
    out
}

/// Resample base-granularity bars into the plan's target interval.
///
/// `order` describes the input and is preserved in the output. Leading (oldest) bars
/// that do not begin a bucket are dropped; the newest bucket is emitted with
/// `closed = false` unless it is complete and its newest member is closed. Output bars
/// span their whole bucket, so a still-forming bar carries its final `close_time`.
#[must_use]
pub fn resample(bars: &[KLine], plan: &ResamplePlan, order: SortOrder) -> Vec<KLine> {
    if plan.factor == 1 {
        return bars.to_vec();
    }
    match order {
        SortOrder::Ascending => aggregate(bars.iter(), plan),
        SortOrder::Descending => {
            let mut out = aggregate(bars.iter().rev(), plan);
            out.reverse();
            out
        }
    }
}
