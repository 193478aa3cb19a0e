use std::sync::Arc;

use kline_core::{
    BackoffConfig, FetchDirection, Gap, Interval, KLine, KlineConfig, KlineError, KlineProvider, KlineStore,
    ResamplePlan, SortOrder, find_gaps, optimal_timeframe, resample,
};

use super::{BackfillDirection, BackfillReport};
use super::state::{BackfillState, Event, Machine, Reconcile};
use crate::backoff::retry;

async fn fetch_recent(
    provider: &dyn KlineProvider,
    backoff: &BackoffConfig,
    symbol: &str,
    interval: Interval,
) -> Result<Vec<KLine>, KlineError> {
    retry(backoff, "fetch_recent", || {
        provider.fetch_recent(symbol, interval)
    })
    .await
}

async fn fetch_before(
    provider: &dyn KlineProvider,
    backoff: &BackoffConfig,
    symbol: &str,
    interval: Interval,
    before: u64,
) -> Result<Vec<KLine>, KlineError> {
    retry(backoff, "fetch_range", || {
        provider.fetch_range(symbol, interval, FetchDirection::Backward, before)
    })
    .await
}

/// Collect provider bars newest-to-oldest, returned ascending.
///
/// Starts at the live edge (`before = None`) or just before `before`, then pages
/// backwards until `max_rows` bars are held, `reached` accepts the oldest bar, or history
/// starts. The flag reports whether history (or the provider) ran out.
pub(crate) async fn collect_backward<F>(
    provider: &dyn KlineProvider,
    backoff: &BackoffConfig,
    symbol: &str,
    interval: Interval,
    before: Option<u64>,
    max_rows: usize,
    reached: F,
) -> Result<(Vec<KLine>, bool), KlineError>
where
    F: Fn(&KLine) -> bool,
{
    let mut bars = match before {
        None => fetch_recent(provider, backoff, symbol, interval).await?,
        Some(t) => fetch_before(provider, backoff, symbol, interval, t).await?,
    };
    loop {
        let Some(oldest) = bars.first() else {
            return Ok((bars, true));
        };
        if !oldest.has_known_predecessor() {
            return Ok((bars, true));
        }
        if bars.len() >= max_rows || reached(oldest) {
            return Ok((bars, false));
        }
        let cursor = oldest.open_time;
        let mut page = fetch_before(provider, backoff, symbol, interval, cursor).await?;
        page.retain(|k| k.open_time < cursor);
        if page.is_empty() {
            return Ok((bars, true));
        }
        bars.splice(0..0, page);
    }
}

/// Serve a read straight from the provider, without persistence.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(
        name = "kline::backfill::read_from_provider",
        skip(provider, cfg),
        fields(provider = provider.name(), interval = %interval),
    )
)]
pub(crate) async fn read_from_provider(
    provider: &dyn KlineProvider,
    cfg: &KlineConfig,
    symbol: &str,
    interval: Interval,
    cursor: Option<u64>,
    limit: usize,
) -> Result<Vec<KLine>, KlineError> {
    let base = optimal_timeframe(provider.supported_intervals(), interval)
        .ok_or_else(|| KlineError::unsupported_interval(interval, provider.name()))?;
    let plan = ResamplePlan::new(base, interval)?;
    let need = limit.saturating_add(1).saturating_mul(plan.factor() as usize);
    let before = cursor.map(|c| c.saturating_add(1));
    let (bars, _) = collect_backward(provider, &cfg.backoff, symbol, base, before, need, |_| false).await?;
    if let Some(gap) = find_gaps(&bars).first() {
        return Err(KlineError::chain_break(symbol, base, gap.from, gap.to));
    }
    let mut out = resample(&bars, &plan, SortOrder::Ascending);
    Ok(out.split_off(out.len().saturating_sub(limit)))
}

// Rows of a newest-first `page` that chain onto `newest`, and the break after them.
fn first_break(newest: Option<&KLine>, page: &[KLine]) -> Option<(usize, Gap)> {
    let mut newer = newest;
    for (i, bar) in page.iter().enumerate() {
        if let Some(n) = newer.filter(|n| !n.follows(bar)) {
            return Some((
                i,
                Gap {
                    from: bar.open_time,
                    to: n.open_time,
                },
            ));
        }
        newer = Some(bar);
    }
    None
}

/// Store-backed read and reconciliation for one call.
pub(crate) struct Engine<'a> {
    provider: &'a dyn KlineProvider,
    store: &'a dyn KlineStore,
    cfg: &'a KlineConfig,
}

impl<'a> Engine<'a> {
    pub(crate) fn new(
        provider: &'a Arc<dyn KlineProvider>,
        store: &'a Arc<dyn KlineStore>,
        cfg: &'a KlineConfig,
    ) -> Self {
        Self {
            provider: provider.as_ref(),
            store: store.as_ref(),
            cfg,
        }
    }

    fn db_base(&self, interval: Interval) -> Result<Interval, KlineError> {
        optimal_timeframe(self.store.supported_intervals(), interval)
            .ok_or_else(|| KlineError::unsupported_interval(interval, "store"))
    }

    // Provider granularity used to fill one store table.
    fn load_plan(&self, db_base: Interval) -> Result<ResamplePlan, KlineError> {
        let load_base = optimal_timeframe(self.provider.supported_intervals(), db_base)
            .ok_or_else(|| KlineError::unsupported_interval(db_base, self.provider.name()))?;
        ResamplePlan::new(load_base, db_base)
    }

    async fn persist(&self, db_base: Interval, bars: &[KLine]) -> Result<usize, KlineError> {
        let mut inserted = 0;
        for bar in bars.iter().filter(|k| k.is_persistable()) {
            if self.store.insert(db_base, bar).await? {
                inserted += 1;
            }
        }
        #[cfg(feature = "tracing")]
        if inserted > 0 {
            tracing::debug!(interval = %db_base, inserted, "persisted bars");
        }
        Ok(inserted)
    }

    /// Bring the store up to the live edge; returns the still-open newest bar.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "kline::backfill::fill_to_latest",
            skip(self),
            fields(interval = %db_base),
        )
    )]
    pub(crate) async fn fill_to_latest(
        &self,
        symbol: &str,
        db_base: Interval,
        max_rows: usize,
    ) -> Result<(BackfillReport, Option<KLine>), KlineError> {
        let plan = self.load_plan(db_base)?;
        let latest = self.store.latest_open_time(symbol, db_base).await?;
        let (bars, exhausted) = collect_backward(
            self.provider,
            &self.cfg.backoff,
            symbol,
            plan.base(),
            None,
            max_rows,
            |oldest| latest.is_some_and(|l| oldest.open_time <= l),
        )
        .await?;
        let mut out = resample(&bars, &plan, SortOrder::Ascending);
        let tail = if out.last().is_some_and(|k| !k.closed) {
            out.pop()
        } else {
            None
        };
        let inserted = self.persist(db_base, &out).await?;
        Ok((
            BackfillReport {
                fetched: bars.len(),
                inserted,
                exhausted,
            },
            tail,
        ))
    }

    /// Extend the store backwards from `before` (exclusive).
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "kline::backfill::fill_with_prev_values",
            skip(self),
            fields(interval = %db_base),
        )
    )]
    pub(crate) async fn fill_with_prev_values(
        &self,
        symbol: &str,
        db_base: Interval,
        before: u64,
        max_rows: usize,
    ) -> Result<BackfillReport, KlineError> {
        let plan = self.load_plan(db_base)?;
        let (bars, exhausted) = collect_backward(
            self.provider,
            &self.cfg.backoff,
            symbol,
            plan.base(),
            Some(before),
            max_rows.max(1),
            |_| false,
        )
        .await?;
        let out = resample(&bars, &plan, SortOrder::Ascending);
        let older: Vec<KLine> = out.into_iter().filter(|k| k.open_time < before).collect();
        let inserted = self.persist(db_base, &older).await?;
        Ok(BackfillReport {
            fetched: bars.len(),
            inserted,
            exhausted,
        })
    }

    /// Bring the store's recent end up to the `db_base` bucket containing `cursor`, when
    /// the newest stored row is older than that bucket.
    ///
    /// Fetches at most `max_rows` provider rows ending at the cursor bucket; an older hole
    /// left behind is repaired by paging. Returns the bucket as an open bar when it is still
    /// forming, since open bars are never persisted.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "kline::backfill::fill_to_cursor",
            skip(self),
            fields(interval = %db_base),
        )
    )]
    async fn fill_to_cursor(
        &self,
        symbol: &str,
        db_base: Interval,
        cursor: u64,
        max_rows: usize,
    ) -> Result<Option<KLine>, KlineError> {
        let Some(bucket) = ResamplePlan::new(db_base, db_base)?.bucket_of(cursor) else {
            return Ok(None);
        };
        let latest = self.store.latest_open_time(symbol, db_base).await?;
        if !latest.is_some_and(|l| l < bucket.start) {
            return Ok(None);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(symbol, latest, cursor_bucket = bucket.start, "store lags behind cursor");

        let plan = self.load_plan(db_base)?;
        let (bars, _) = collect_backward(
            self.provider,
            &self.cfg.backoff,
            symbol,
            plan.base(),
            Some(bucket.end.saturating_add(1)),
            max_rows.max(1),
            |oldest| latest.is_some_and(|l| oldest.open_time <= l),
        )
        .await?;
        let mut out = resample(&bars, &plan, SortOrder::Ascending);
        let tail = if out.last().is_some_and(|k| !k.closed) {
            out.pop()
        } else {
            None
        };
        self.persist(db_base, &out).await?;
        Ok(tail)
    }

    /// Re-fetch the bars strictly between `gap.from` and `gap.to` and persist them.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "kline::backfill::repair_gap",
            skip(self),
            fields(interval = %db_base, from = gap.from, to = gap.to),
        )
    )]
    async fn repair_gap(&self, symbol: &str, db_base: Interval, gap: Gap) -> Result<usize, KlineError> {
        let plan = self.load_plan(db_base)?;
        let (bars, _) = collect_backward(
            self.provider,
            &self.cfg.backoff,
            symbol,
            plan.base(),
            Some(gap.to),
            self.cfg.backfill.max_rows_per_call.max(1),
            |oldest| oldest.open_time <= gap.from,
        )
        .await?;
        let missing: Vec<KLine> = resample(&bars, &plan, SortOrder::Ascending)
            .into_iter()
            .filter(|k| k.open_time > gap.from && k.open_time < gap.to)
            .collect();
        self.persist(db_base, &missing).await
    }

    fn provider_rows_for(&self, db_base: Interval, db_rows: usize) -> usize {
        let load_factor = self.load_plan(db_base).map_or(1, |p| p.factor() as usize);
        db_rows
            .saturating_add(1)
            .saturating_mul(load_factor)
            .min(self.cfg.backfill.max_rows_per_call.max(1))
    }

    // One store page, validated against the bars collected so far (newest first).
    async fn page(
        &self,
        symbol: &str,
        db_base: Interval,
        until: &mut u64,
        acc: &mut Vec<KLine>,
        need: usize,
    ) -> Result<Event, KlineError> {
        let mut page = self
            .store
            .query(symbol, db_base, *until, self.cfg.backfill.store_page_size.max(1))
            .await?;
        if page.is_empty() {
            let before = acc.last().map_or(until.saturating_add(1), |k| k.open_time);
            return Ok(Event::PageEmpty { before });
        }
        if let Some((valid, gap)) = first_break(acc.last(), &page) {
            #[cfg(feature = "tracing")]
            tracing::info!(symbol, interval = %db_base, from = gap.from, to = gap.to, "chain break in store");
            // A break older than what the caller needs does not block the read.
            if acc.len() + valid < need {
                return Ok(Event::PageBroken(gap));
            }
            page.truncate(valid);
        }
        let (oldest_open, history_start) = page
            .last()
            .map_or((0, true), |k| (k.open_time, !k.has_known_predecessor()));
        acc.extend(page);
        let history_start = match oldest_open.checked_sub(1) {
            Some(t) => {
                *until = t;
                history_start
            }
            None => true,
        };
        Ok(Event::PageAccepted {
            have: acc.len(),
            need,
            history_start,
        })
    }

    /// Return up to `limit` `interval` bars with `open_time <= cursor` (or up to the live
    /// edge when `cursor` is `None`), repairing the store on the way.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "kline::backfill::read",
            skip(self),
            fields(interval = %interval),
        )
    )]
    pub(crate) async fn read(
        &self,
        symbol: &str,
        interval: Interval,
        cursor: Option<u64>,
        limit: usize,
    ) -> Result<Vec<KLine>, KlineError> {
        let db_base = self.db_base(interval)?;
        let plan = ResamplePlan::new(db_base, interval)?;
        let need = limit.saturating_add(1).saturating_mul(plan.factor() as usize);

        // Newest first.
        let mut acc: Vec<KLine> = Vec::new();
        let mut until = cursor.unwrap_or(u64::MAX);
        let tail = match cursor {
            None => {
                self.fill_to_latest(symbol, db_base, self.cfg.backfill.max_rows_per_call)
                    .await?
                    .1
            }
            Some(c) => {
                let rows = self.provider_rows_for(db_base, need);
                self.fill_to_cursor(symbol, db_base, c, rows).await?
            }
        };
        if let Some(t) = tail {
            until = t.open_time.saturating_sub(1);
            acc.push(t);
        }

        let mut machine = Machine::new(symbol, db_base);
        machine.handle(Event::Start);
        loop {
            let outcome = match machine.state().clone() {
                BackfillState::Idle => Ok(Event::Start),
                BackfillState::PagingStore => {
                    self.page(symbol, db_base, &mut until, &mut acc, need).await
                }
                BackfillState::GapDetected(_) => Ok(Event::RepairStarted),
                BackfillState::Reconciling(Reconcile::Gap(gap)) => self
                    .repair_gap(symbol, db_base, gap)
                    .await
                    .map(|inserted| Event::Reconciled { inserted }),
                BackfillState::Reconciling(Reconcile::Older { before }) => {
                    let rows = self.provider_rows_for(db_base, need.saturating_sub(acc.len()));
                    self.fill_with_prev_values(symbol, db_base, before, rows)
                        .await
                        .map(|r| Event::Reconciled {
                            inserted: r.inserted,
                        })
                }
                BackfillState::Satisfied | BackfillState::Exhausted => break,
                BackfillState::Error(e) => return Err(e),
            };
            machine.handle(outcome.unwrap_or_else(Event::Fail));
        }

        let mut out = resample(&acc, &plan, SortOrder::Descending);
        out.reverse();
        let out = out.split_off(out.len().saturating_sub(limit));
        if let Some(gap) = find_gaps(&out).first() {
            return Err(KlineError::chain_break(symbol, interval, gap.from, gap.to));
        }
        Ok(out)
    }

    /// Explicit store maintenance, bounded by `limit` provider rows.
    pub(crate) async fn backfill(
        &self,
        symbol: &str,
        interval: Interval,
        direction: BackfillDirection,
        limit: usize,
    ) -> Result<BackfillReport, KlineError> {
        let db_base = self.db_base(interval)?;
        match direction {
            BackfillDirection::Latest => self
                .fill_to_latest(symbol, db_base, limit.max(1))
                .await
                .map(|(report, _)| report),
            BackfillDirection::Earlier => {
                let before = self
                    .store
                    .oldest_open_time(symbol, db_base)
                    .await?
                    .unwrap_or(u64::MAX);
                self.fill_with_prev_values(symbol, db_base, before, limit).await
            }
        }
    }
}
