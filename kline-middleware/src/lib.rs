//! kline-middleware
//!
//! Wrappers layered around a [`KlineProvider`](kline_core::KlineProvider) through the
//! [`Middleware`](kline_core::Middleware) trait.

mod rate_limit;

pub use crate::rate_limit::{RateLimitMiddleware, RateLimitedProvider, TokenBucket};
