//! Re-export of foundational types from `kline-types`.
// Consolidated re-exports so downstream crates can depend on `kline-core` only

pub use kline_types::{
    BackfillConfig, BackoffConfig, Gap, Interval, IntervalUnit, KLine, KlineConfig, KlineError,
    LiveCacheConfig, RateLimitConfig, UNKNOWN_PREDECESSOR,
};
