#![allow(dead_code)]

use kline_core::KLine;
use rust_decimal::Decimal;

pub const MINUTE: u64 = 60_000;

/// A closed one-minute-wide bar (or any `width`) chained to `prev`.
pub fn bar(open_time: u64, width: u64, prev: u64, price: i64) -> KLine {
    KLine {
        symbol: "BTCUSDT".into(),
        open_time,
        close_time: open_time + width - 1,
        open: Decimal::new(price, 2),
        close: Decimal::new(price + 5, 2),
        high: Decimal::new(price + 10, 2),
        low: Decimal::new(price - 10, 2),
        base_volume: Decimal::new(3, 0),
        quote_volume: Decimal::new(price * 3, 2),
        taker_buy_base_volume: Decimal::ONE,
        taker_buy_quote_volume: Decimal::new(price, 2),
        prev_close_time: prev,
        closed: true,
    }
}

/// `count` contiguous, correctly chained bars starting at `start`.
///
/// The first bar points at the bar that would precede it, or `0` when `start` is `0`.
pub fn series(start: u64, width: u64, count: usize) -> Vec<KLine> {
    (0..count as u64)
        .map(|i| {
            let open = start + i * width;
            let prev = if open == 0 { 0 } else { open - 1 };
            bar(open, width, prev, 10_000 + i as i64)
        })
        .collect()
}
