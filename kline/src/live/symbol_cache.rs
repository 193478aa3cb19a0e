use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kline_core::{BackoffConfig, Interval, KLine, KlineError, KlineProvider, UNKNOWN_PREDECESSOR, check_chain};
use tokio::sync::watch;

use crate::backfill::engine::collect_backward;
use crate::backoff::backoff_delay;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoadStatus {
    Pending,
    Done,
    Failed(KlineError),
}

#[derive(Default)]
struct CacheState {
    /// Closed bars, ascending, chained, at most `archive_length`.
    archived: VecDeque<KLine>,
    active: Option<KLine>,
    archive_filled: bool,
    loading: Option<watch::Receiver<LoadStatus>>,
}

/// Live window for one `(symbol, base interval)`: closed archive plus the forming bar.
///
/// Ticks arrive through [`SymbolCache::set_active_kline`]; history is loaded lazily from
/// the provider on first read, with concurrent readers sharing one load.
pub struct SymbolCache {
    symbol: String,
    interval: Interval,
    archive_length: usize,
    provider: Arc<dyn KlineProvider>,
    backoff: BackoffConfig,
    state: Mutex<CacheState>,
}

impl SymbolCache {
    /// An empty cache keeping `archive_length` closed bars.
    pub fn new(
        symbol: impl Into<String>,
        interval: Interval,
        archive_length: usize,
        provider: Arc<dyn KlineProvider>,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            archive_length,
            provider,
            backoff,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Instrument identifier.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Base interval of the stream.
    pub const fn interval(&self) -> Interval {
        self.interval
    }

    /// Whether the archive currently holds loaded history.
    pub fn is_filled(&self) -> bool {
        self.lock().archive_filled
    }

    /// Number of closed bars held.
    pub fn archived_len(&self) -> usize {
        self.lock().archived.len()
    }

    /// The forming bar as last seen.
    pub fn active(&self) -> Option<KLine> {
        self.lock().active.clone()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one streamed tick.
    ///
    /// The same `open_time` refines the active bar. A newer one rolls the active bar into
    /// the archive when it closed and chains; otherwise the archive is dropped and will be
    /// reloaded on the next read.
    pub fn set_active_kline(&self, mut kline: KLine) {
        let mut st = self.lock();
        let Some(mut active) = st.active.take() else {
            kline.prev_close_time = UNKNOWN_PREDECESSOR;
            st.active = Some(kline);
            return;
        };
        if kline.open_time == active.open_time {
            kline.prev_close_time = active.prev_close_time;
            st.active = Some(kline);
            return;
        }
        if kline.open_time < active.open_time {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                symbol = %self.symbol,
                interval = %self.interval,
                open_time = kline.open_time,
                "ignoring stale tick"
            );
            st.active = Some(active);
            return;
        }

        if active.close_time.checked_add(1) != Some(kline.open_time) {
            active.prev_close_time = UNKNOWN_PREDECESSOR;
        }
        if !active.closed || !active.has_known_predecessor() {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                symbol = %self.symbol,
                interval = %self.interval,
                skipped_from = active.open_time,
                next = kline.open_time,
                "feed skipped a bar; dropping archive"
            );
            st.archived.clear();
            st.archive_filled = false;
            kline.prev_close_time = UNKNOWN_PREDECESSOR;
        } else {
            kline.prev_close_time = active.close_time;
            st.archived.push_back(active);
            while st.archived.len() > self.archive_length {
                st.archived.pop_front();
            }
        }
        st.active = Some(kline);
    }

    fn snapshot(st: &CacheState) -> Vec<KLine> {
        let mut out: Vec<KLine> = st.archived.iter().cloned().collect();
        if let Some(active) = &st.active {
            let mut forming = active.clone();
            forming.closed = false;
            out.push(forming);
        }
        out
    }

    /// The archive followed by the forming bar (reported open), loading history first
    /// when the archive is not filled.
    ///
    /// # Errors
    /// Returns `KlineError::LoadFailed` when history cannot be loaded within the retry
    /// budget, or when a feed rollover keeps invalidating fresh loads.
    pub async fn get_data(self: &Arc<Self>) -> Result<Vec<KLine>, KlineError> {
        let rounds = self.backoff.max_attempts.max(1);
        for _ in 0..rounds {
            {
                let st = self.lock();
                if st.archive_filled {
                    return Ok(Self::snapshot(&st));
                }
            }
            self.fill_cache().await?;
        }
        Err(self.load_failed("archive invalidated during every load"))
    }

    /// Load history unless already filled, joining an in-flight load if there is one.
    ///
    /// # Errors
    /// Propagates the failure of the load this call waited on.
    pub async fn fill_cache(self: &Arc<Self>) -> Result<(), KlineError> {
        let mut rx = {
            let mut st = self.lock();
            if st.archive_filled {
                return Ok(());
            }
            // A receiver whose sender is gone belongs to a loader that died.
            let in_flight = st
                .loading
                .as_ref()
                .filter(|rx| rx.has_changed().is_ok())
                .cloned();
            match in_flight {
                Some(rx) => rx,
                None => {
                    let (tx, rx) = watch::channel(LoadStatus::Pending);
                    st.loading = Some(rx.clone());
                    let this = Arc::clone(self);
                    tokio::spawn(async move {
                        let outcome = this.load_procedure().await;
                        this.finish_load(&tx, outcome);
                    });
                    rx
                }
            }
        };
        let status = rx
            .wait_for(|s| *s != LoadStatus::Pending)
            .await
            .map_err(|_| self.load_failed("loader stopped"))?
            .clone();
        match status {
            LoadStatus::Failed(e) => Err(e),
            _ => Ok(()),
        }
    }

    fn finish_load(&self, tx: &watch::Sender<LoadStatus>, outcome: Result<(), KlineError>) {
        self.lock().loading = None;
        let status = match outcome {
            Ok(()) => LoadStatus::Done,
            Err(e) => LoadStatus::Failed(e),
        };
        let _ = tx.send(status);
    }

    fn load_failed(&self, msg: impl Into<String>) -> KlineError {
        KlineError::LoadFailed {
            symbol: self.symbol.clone(),
            interval: self.interval.to_string(),
            msg: msg.into(),
        }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "kline::live::load",
            skip(self),
            fields(symbol = %self.symbol, interval = %self.interval),
        )
    )]
    async fn load_procedure(&self) -> Result<(), KlineError> {
        let attempts = self.backoff.max_attempts.max(1);
        let mut failures = 0u32;
        loop {
            let reason = match self.try_load().await {
                Ok(true) => return Ok(()),
                Ok(false) => self.load_failed("history did not splice onto the live bar"),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(self.load_failed(e.to_string())),
            };
            failures += 1;
            if failures >= attempts {
                return Err(self.load_failed(format!("gave up after {failures} attempts: {reason}")));
            }
            let delay = backoff_delay(&self.backoff, failures);
            #[cfg(feature = "tracing")]
            tracing::warn!(failures, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), error = %reason, "live cache load retrying");
            tokio::time::sleep(delay).await;
        }
    }

    // One fetch-and-splice attempt; `Ok(false)` when the result must be discarded.
    async fn try_load(&self) -> Result<bool, KlineError> {
        let retry_once = BackoffConfig {
            max_attempts: 1,
            ..self.backoff
        };
        let (mut bars, _) = collect_backward(
            self.provider.as_ref(),
            &retry_once,
            &self.symbol,
            self.interval,
            None,
            self.archive_length.saturating_add(1),
            |_| false,
        )
        .await
        .map_err(|e| match e {
            KlineError::RetriesExhausted { last, .. } => *last,
            e => e,
        })?;
        if !check_chain(&bars) {
            return Ok(false);
        }
        let Some(tail) = bars.pop() else {
            return Ok(false);
        };

        let mut guard = self.lock();
        let st = &mut *guard;
        match st.active.as_ref().map(|a| a.open_time) {
            // No tick seen yet: the provider's forming bar stands in until one arrives.
            None => st.active = Some(tail),
            Some(open) if open == tail.open_time => {}
            Some(_) => return Ok(false),
        }
        let keep = bars.len().saturating_sub(self.archive_length);
        let archived: VecDeque<KLine> = bars.drain(keep..).collect();
        if let Some(active) = st.active.as_mut() {
            active.prev_close_time = archived.back().map_or(UNKNOWN_PREDECESSOR, |b| b.close_time);
        }
        st.archived = archived;
        st.archive_filled = true;
        #[cfg(feature = "tracing")]
        tracing::info!(archived = st.archived.len(), "live cache filled");
        Ok(true)
    }
}
