use serde::{Deserialize, Serialize};

/// A discontinuity in an otherwise ordered bar sequence.
///
/// `from` is the open time of the last bar before the break, `to` the open time of
/// the first bar after it; both bars exist, the bars between them are missing or
/// disagree about the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gap {
    /// Open time of the bar preceding the break.
    pub from: u64,
    /// Open time of the bar following the break.
    pub to: u64,
}
