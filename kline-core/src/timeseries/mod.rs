//! Time-series utilities shared by the backfill engine and the live cache.
//!
//! Modules include:
//! - `chain`: validate the chain law and locate gaps
//! - `resample`: aggregate base bars into coarser intervals
/// Chain-law checks and gap detection.
pub mod chain;
/// Resampling of base-granularity bars into integer-multiple intervals.
pub mod resample;
