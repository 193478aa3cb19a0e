//! Store-backed history: paging, gap repair and extension from the provider.

pub(crate) mod engine;
pub mod state;

pub use state::{BackfillState, Reconcile};

/// Which end of the stored history an explicit backfill extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackfillDirection {
    /// From the newest stored row up to the live edge.
    Latest,
    /// Backwards from the oldest stored row.
    Earlier,
}

/// Outcome of one backfill step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackfillReport {
    /// Provider rows fetched (at the provider's base interval).
    pub fetched: usize,
    /// New rows written to the store.
    pub inserted: usize,
    /// The provider ran out of history before the row budget did.
    pub exhausted: bool,
}
