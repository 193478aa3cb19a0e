use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the kline workspace.
///
/// Pure helpers (resampling, chain checks) never produce these; every I/O-bound
/// collaborator call (provider, store, feed) does.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum KlineError {
    /// Invalid input argument (bad interval string, zero limit, mismatched resample plan).
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// No base timeframe of the given source divides the requested interval.
    #[error("unsupported interval {interval} for {source_name}")]
    UnsupportedInterval {
        /// Requested interval, e.g. "7h".
        interval: String,
        /// Which side could not serve it ("provider", "store", "live cache").
        source_name: String,
    },

    /// Issues with returned data that are not chain related (misaligned pages, etc.).
    #[error("data issue: {0}")]
    Data(String),

    /// A broken chain pointer that backfill could not repair.
    #[error("chain break for {symbol} {interval}: {from}..{to}")]
    ChainBreak {
        /// Instrument identifier.
        symbol: String,
        /// Interval of the series that broke.
        interval: String,
        /// Open time of the last bar before the break.
        from: u64,
        /// Open time of the first bar after the break.
        to: u64,
    },

    /// Transient upstream failure (network, HTTP status, decode).
    #[error("{provider} unavailable: {msg}")]
    ProviderUnavailable {
        /// Provider name.
        provider: String,
        /// Human-readable error message.
        msg: String,
    },

    /// The persistent store rejected a write.
    #[error("store write failed: {msg}")]
    StoreWrite {
        /// Human-readable error message.
        msg: String,
    },

    /// The persistent store failed to answer a query.
    #[error("store read failed: {msg}")]
    StoreRead {
        /// Human-readable error message.
        msg: String,
    },

    /// A resource could not be found.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource, e.g. "store for BTCUSDT".
        what: String,
    },

    /// The overall request exceeded the configured deadline.
    #[error("request timed out: {operation}")]
    RequestTimeout {
        /// Operation label, e.g. "get_last_klines".
        operation: String,
    },

    /// The retry policy gave up on a transient failure.
    #[error("{operation} gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Operation label.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last error observed.
        last: Box<KlineError>,
    },

    /// A live-cache load ended without committing history.
    #[error("live cache load failed for {symbol} {interval}: {msg}")]
    LoadFailed {
        /// Instrument identifier.
        symbol: String,
        /// Base interval of the cache.
        interval: String,
        /// Human-readable reason.
        msg: String,
    },

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl KlineError {
    /// Helper: build a `ProviderUnavailable` error.
    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build an `UnsupportedInterval` error.
    pub fn unsupported_interval(interval: impl ToString, source_name: impl Into<String>) -> Self {
        Self::UnsupportedInterval {
            interval: interval.to_string(),
            source_name: source_name.into(),
        }
    }

    /// Helper: build a `ChainBreak` error.
    pub fn chain_break(symbol: impl Into<String>, interval: impl ToString, from: u64, to: u64) -> Self {
        Self::ChainBreak {
            symbol: symbol.into(),
            interval: interval.to_string(),
            from,
            to,
        }
    }

    /// Helper: build a `StoreWrite` error.
    pub fn store_write(msg: impl Into<String>) -> Self {
        Self::StoreWrite { msg: msg.into() }
    }

    /// Helper: build a `StoreRead` error.
    pub fn store_read(msg: impl Into<String>) -> Self {
        Self::StoreRead { msg: msg.into() }
    }

    /// Helper: build a `NotFound` error for a description of the missing resource.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Helper: build a `RequestTimeout` error.
    #[must_use]
    pub fn request_timeout(operation: impl Into<String>) -> Self {
        Self::RequestTimeout {
            operation: operation.into(),
        }
    }

    /// Returns true if a retry policy may attempt the failed call again.
    ///
    /// Only upstream unavailability qualifies. Chain breaks, store failures and
    /// argument errors are deterministic and surface immediately.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }
}
