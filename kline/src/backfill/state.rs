//! Backfill state machine.
//!
//! The machine is pure: the engine performs store/provider I/O for the current state and
//! feeds the outcome back as an [`Event`]. Terminal states are `Satisfied`, `Exhausted`
//! and `Error`.

use std::collections::HashSet;

use kline_core::{Gap, Interval, KlineError};

/// What a reconciliation step asks the provider for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconcile {
    /// Re-fetch the bars between two store rows whose chain is broken.
    Gap(Gap),
    /// Extend the store backwards from its oldest row (`before` is exclusive).
    Older {
        /// Open time the fetched bars must precede.
        before: u64,
    },
}

/// Phase of one backfill invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackfillState {
    /// Not started.
    Idle,
    /// Reading the store backwards page by page.
    PagingStore,
    /// A chain break was found between two store rows.
    GapDetected(Gap),
    /// Fetching from the provider and persisting the result.
    Reconciling(Reconcile),
    /// Enough bars were collected.
    Satisfied,
    /// History is exhausted; the collected bars are all there is.
    Exhausted,
    /// The invocation failed; the error is returned to the caller.
    Error(KlineError),
}

impl BackfillState {
    /// Whether no further event can change the state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Satisfied | Self::Exhausted | Self::Error(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    Start,
    /// A store page chained onto what was already collected.
    PageAccepted {
        have: usize,
        need: usize,
        history_start: bool,
    },
    /// A store page (or its boundary with the collected bars) broke the chain.
    PageBroken(Gap),
    /// The store has nothing older than `before`.
    PageEmpty { before: u64 },
    RepairStarted,
    /// A provider reconciliation finished.
    Reconciled { inserted: usize },
    Fail(KlineError),
}

#[derive(Debug)]
pub(crate) struct Machine {
    symbol: String,
    interval: Interval,
    state: BackfillState,
    seen_gaps: HashSet<Gap>,
}

impl Machine {
    pub fn new(symbol: &str, interval: Interval) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval,
            state: BackfillState::Idle,
            seen_gaps: HashSet::new(),
        }
    }

    pub const fn state(&self) -> &BackfillState {
        &self.state
    }

    fn chain_break(&self, gap: Gap) -> BackfillState {
        BackfillState::Error(KlineError::chain_break(
            self.symbol.clone(),
            self.interval,
            gap.from,
            gap.to,
        ))
    }

    pub fn handle(&mut self, event: Event) -> &BackfillState {
        let current = std::mem::replace(&mut self.state, BackfillState::Idle);
        self.state = self.transition(current, event);
        &self.state
    }

    fn transition(&mut self, state: BackfillState, event: Event) -> BackfillState {
        use BackfillState as S;
        match (state, event) {
            (s, _) if s.is_terminal() => s,
            (_, Event::Fail(e)) => S::Error(e),
            (S::Idle, Event::Start) => S::PagingStore,
            (S::PagingStore, Event::PageAccepted { have, need, .. }) if have >= need => S::Satisfied,
            (
                S::PagingStore,
                Event::PageAccepted {
                    history_start: true,
                    ..
                },
            ) => S::Exhausted,
            (S::PagingStore, Event::PageAccepted { .. }) => S::PagingStore,
            (S::PagingStore, Event::PageBroken(gap)) => {
                // A gap that survived one repair cannot be fixed by the provider.
                if self.seen_gaps.insert(gap) {
                    S::GapDetected(gap)
                } else {
                    self.chain_break(gap)
                }
            }
            (S::PagingStore, Event::PageEmpty { before }) => {
                S::Reconciling(Reconcile::Older { before })
            }
            (S::GapDetected(gap), Event::RepairStarted) => S::Reconciling(Reconcile::Gap(gap)),
            (S::Reconciling(Reconcile::Gap(gap)), Event::Reconciled { inserted }) => {
                if inserted == 0 {
                    self.chain_break(gap)
                } else {
                    S::PagingStore
                }
            }
            (S::Reconciling(Reconcile::Older { .. }), Event::Reconciled { inserted }) => {
                if inserted == 0 {
                    S::Exhausted
                } else {
                    S::PagingStore
                }
            }
            (state, event) => S::Error(KlineError::Other(format!(
                "unexpected backfill event {event:?} in state {state:?}"
            ))),
        }
    }
}
