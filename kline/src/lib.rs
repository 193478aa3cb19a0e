//! Kline serves chain-validated candle history for trading symbols.
//!
//! Overview
//! - Reads go to the live cache first, then to the persistent store, and finally to the
//!   upstream provider. Every answer satisfies the chain law: each bar's
//!   `prev_close_time` equals the previous bar's `close_time`.
//! - Any interval the sources do not serve natively is resampled from the largest
//!   native interval of the same unit that divides it.
//! - Store holes are detected while paging and repaired from the provider. A hole the
//!   provider cannot fill is returned as `KlineError::ChainBreak` instead of being
//!   papered over.
//! - The live cache keeps a bounded archive per tracked `(symbol, base interval)` and
//!   splices streamed ticks onto history loaded on first use. Concurrent readers share
//!   one load.
//!
//! Key behaviors and trade-offs
//! - Transient provider failures are retried under `BackoffConfig` (exponential, jittered,
//!   bounded). Store failures and chain breaks surface immediately.
//! - A request deadline (`request_timeout`) bounds a whole call, including retries.
//! - Open (still-forming) bars are returned to callers but never persisted.
//!
//! Examples
//! ```rust,ignore
//! use std::sync::Arc;
//! use kline::{Interval, KlineService, RateLimitConfig};
//!
//! let svc = KlineService::builder()
//!     .with_provider(Arc::new(exchange))
//!     .with_store(Arc::new(db))
//!     .track_symbol("BTCUSDT")
//!     .rate_limit(RateLimitConfig::default())
//!     .build()?;
//!
//! let bars = svc.get_last_klines("BTCUSDT", "15m".parse()?, 100).await?;
//! let feed = svc.attach_feed(Arc::new(websocket)).await?;
//! // ...
//! feed.stop().await;
//! ```
#![warn(missing_docs)]

/// Store-backed history: paging, gap repair, explicit backfill.
pub mod backfill;
/// Retry and jittered backoff helpers.
pub mod backoff;
mod core;
/// Live caches fed by streamed ticks.
pub mod live;

pub use crate::core::{KlineService, KlineServiceBuilder};
pub use backfill::{BackfillDirection, BackfillReport, BackfillState};
pub use kline_core::{
    BackfillConfig, BackoffConfig, FeedEvent, FeedHandle, FetchDirection, Gap, Interval,
    IntervalUnit, KLine, KlineConfig, KlineError, KlineFeed, KlineProvider, KlineStore,
    LiveCacheConfig, Middleware, RateLimitConfig, SortOrder, UNKNOWN_PREDECESSOR, check_chain,
    find_gaps, resample, ResamplePlan,
};
pub use kline_middleware::{RateLimitMiddleware, RateLimitedProvider, TokenBucket};
pub use live::{LiveCache, SymbolCache};
