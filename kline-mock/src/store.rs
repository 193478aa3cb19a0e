use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kline_core::{Interval, KLine, KlineError, KlineStore, STORE_TIMEFRAMES};

type Table = BTreeMap<u64, KLine>;

/// In-memory candle store: one ordered table per `(symbol, interval)`.
///
/// Inserts are idempotent on `open_time`, matching `INSERT .. ON CONFLICT DO NOTHING`.
pub struct MemoryStore {
    intervals: &'static [Interval],
    tables: Mutex<HashMap<(String, Interval), Table>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    inserted: AtomicUsize,
    queries: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store advertising the standard store timeframes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            intervals: STORE_TIMEFRAMES,
            tables: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            inserted: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    /// Override the advertised tables.
    #[must_use]
    pub fn with_intervals(mut self, intervals: &'static [Interval]) -> Self {
        self.intervals = intervals;
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, Interval), Table>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write rows directly, bypassing failure injection and counters (fixtures).
    pub fn seed(&self, interval: Interval, bars: impl IntoIterator<Item = KLine>) {
        let mut tables = self.lock();
        for bar in bars {
            tables
                .entry((bar.symbol.clone(), interval))
                .or_default()
                .insert(bar.open_time, bar);
        }
    }

    /// Remove rows with `from <= open_time <= to`, simulating lost data.
    pub fn delete_range(&self, symbol: &str, interval: Interval, from: u64, to: u64) {
        if let Some(t) = self.lock().get_mut(&(symbol.to_string(), interval)) {
            t.retain(|open, _| *open < from || *open > to);
        }
    }

    /// All rows of one table, ascending.
    pub fn rows(&self, symbol: &str, interval: Interval) -> Vec<KLine> {
        self.lock()
            .get(&(symbol.to_string(), interval))
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Make subsequent inserts fail with `StoreWrite`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent reads fail with `StoreRead`.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// New rows written through [`KlineStore::insert`].
    pub fn inserted(&self) -> usize {
        self.inserted.load(Ordering::SeqCst)
    }

    /// Number of `query` calls observed.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check_table(&self, interval: Interval) -> Result<(), KlineError> {
        if self.intervals.contains(&interval) {
            Ok(())
        } else {
            Err(KlineError::unsupported_interval(interval, "memory-store"))
        }
    }

    fn check_read(&self) -> Result<(), KlineError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(KlineError::store_read("injected read failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl KlineStore for MemoryStore {
    fn supported_intervals(&self) -> &'static [Interval] {
        self.intervals
    }

    async fn query(
        &self,
        symbol: &str,
        interval: Interval,
        until: u64,
        limit: usize,
    ) -> Result<Vec<KLine>, KlineError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        self.check_table(interval)?;
        Ok(self
            .lock()
            .get(&(symbol.to_string(), interval))
            .map(|t| t.range(..=until).rev().take(limit).map(|(_, k)| k.clone()).collect())
            .unwrap_or_default())
    }

    async fn insert(&self, interval: Interval, kline: &KLine) -> Result<bool, KlineError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KlineError::store_write(format!(
                "injected write failure for {} {} at {}",
                kline.symbol, interval, kline.open_time
            )));
        }
        self.check_table(interval)?;
        let mut tables = self.lock();
        let table = tables.entry((kline.symbol.clone(), interval)).or_default();
        if table.contains_key(&kline.open_time) {
            return Ok(false);
        }
        table.insert(kline.open_time, kline.clone());
        drop(tables);
        self.inserted.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn latest_open_time(&self, symbol: &str, interval: Interval) -> Result<Option<u64>, KlineError> {
        self.check_read()?;
        Ok(self
            .lock()
            .get(&(symbol.to_string(), interval))
            .and_then(|t| t.keys().next_back().copied()))
    }

    async fn oldest_open_time(&self, symbol: &str, interval: Interval) -> Result<Option<u64>, KlineError> {
        self.check_read()?;
        Ok(self
            .lock()
            .get(&(symbol.to_string(), interval))
            .and_then(|t| t.keys().next().copied()))
    }
}
