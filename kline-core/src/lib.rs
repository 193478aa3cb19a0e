//! kline-core
//!
//! Core types, traits, and utilities shared across the kline workspace.
//!
//! - `types`: candle DTOs, intervals, errors and configuration (re-exported from `kline-types`).
//! - `connector`: the `KlineProvider`, `KlineStore` and `KlineFeed` collaborator traits.
//! - `timeframes`: base-granularity tables and optimal timeframe selection.
//! - `timeseries`: resampling into coarser intervals and chain-law checks.
//!
//! Async runtime (Tokio)
//! ---------------------
//! This crate assumes the Tokio ecosystem as the async runtime:
//!
//! - `stream::FeedHandle` wraps `tokio::task::JoinHandle<()>` and uses
//!   `tokio::sync::oneshot::Sender<()>` for cooperative shutdown.
//! - `connector::KlineFeed` returns `(FeedHandle, tokio::sync::mpsc::Receiver<FeedEvent>)`.
//!
#![warn(missing_docs)]

/// Collaborator traits: provider, store, feed.
pub mod connector;
/// Middleware trait implemented by provider wrappers.
pub mod middleware;
/// Feed handle and the drop-time stop/abort logic behind it.
pub mod stream;
/// Base timeframe tables and optimal timeframe lookup.
pub mod timeframes;
/// Time-series utilities for resampling and chain validation.
pub mod timeseries;
/// Candle DTOs, intervals, errors and configuration from `kline-types`.
pub mod types;

pub use connector::{FeedEvent, FetchDirection, KlineFeed, KlineProvider, KlineStore};
pub use middleware::Middleware;
pub use stream::FeedHandle;
pub use timeframes::{
    PROVIDER_TIMEFRAMES, STORE_TIMEFRAMES, TimeframeTable, optimal_timeframe,
};
pub use timeseries::chain::{check_chain, find_gaps};
pub use timeseries::resample::{Bucket, ResamplePlan, SortOrder, resample};
pub use types::*;
