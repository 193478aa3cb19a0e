use crate::types::{Gap, KLine};

/// Check that every bar after the first points at its predecessor's `close_time`.
///
/// The first bar's pointer is not inspected: it may be the unknown-predecessor sentinel
/// (start of history) or refer to a bar outside the slice. Input must be ascending.
///
/// ```
/// use kline_core::{check_chain, KLine};
///
/// let bar = |open: u64, prev: u64| KLine {
///     open_time: open,
///     close_time: open + 59_999,
///     prev_close_time: prev,
///     closed: true,
///     ..KLine::default()
/// };
/// assert!(check_chain(&[bar(0, 0), bar(60_000, 59_999)]));
/// assert!(!check_chain(&[bar(0, 0), bar(120_000, 119_999)]));
/// assert!(check_chain(&[]));
/// ```
#[must_use]
pub fn check_chain(bars: &[KLine]) -> bool {
    bars.windows(2).all(|w| w[1].follows(&w[0]))
}

/// Collect every chain break in an ascending slice.
///
/// A break between positions `i-1` and `i` is reported as
/// `Gap { from: bars[i-1].open_time, to: bars[i].open_time }`.
#[must_use]
pub fn find_gaps(bars: &[KLine]) -> Vec<Gap> {
    bars.windows(2)
        .filter(|w| !w[1].follows(&w[0]))
        .map(|w| Gap {
            from: w[0].open_time,
            to: w[1].open_time,
        })
        .collect()
}
