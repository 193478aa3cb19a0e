//! Candle-specific data transfer objects and configuration primitives shared by the
//! kline workspace.
#![warn(missing_docs)]

mod config;
mod error;
mod gap;
mod interval;
mod kline;

pub use config::{BackfillConfig, BackoffConfig, KlineConfig, LiveCacheConfig, RateLimitConfig};
pub use error::KlineError;
pub use gap::Gap;
pub use interval::{Interval, IntervalUnit};
pub use kline::{KLine, UNKNOWN_PREDECESSOR};
