//! Integration tests for the refresh job against real stores.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use breadthlab_core::data::{
    BarSink, BarSource, DataError, MemoryStore, ParquetStore, SnapshotStore, SyntheticConfig,
    SyntheticUniverse,
};
use breadthlab_core::domain::{IndicatorSnapshot, MarketSegment, PriceBar};
use breadthlab_runner::{RefreshConfig, RefreshError, RefreshJob, RefreshProgress, RefreshSummary};
use chrono::NaiveDate;

// ── Helpers ──────────────────────────────────────────────────────────

fn universe() -> SyntheticUniverse {
    SyntheticUniverse::generate(&SyntheticConfig {
        listed_symbols: 6,
        otc_symbols: 2,
        trading_days: 240,
        ..SyntheticConfig::default()
    })
}

/// Store wrapper that fails or panics for chosen symbols.
struct FlakyStore {
    inner: MemoryStore,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    enumeration_down: bool,
}

impl FlakyStore {
    fn new(bars: Vec<PriceBar>) -> Self {
        Self {
            inner: MemoryStore::with_bars(bars),
            failing: HashSet::new(),
            panicking: HashSet::new(),
            enumeration_down: false,
        }
    }
}

impl BarSource for FlakyStore {
    fn symbol_bars(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>, DataError> {
        if self.failing.contains(symbol) {
            return Err(DataError::Storage(format!("simulated outage for {symbol}")));
        }
        if self.panicking.contains(symbol) {
            panic!("corrupt window for {symbol}");
        }
        self.inner.symbol_bars(symbol, start, end)
    }

    fn segment_bars(&self, segment: MarketSegment, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>, DataError> {
        if self.enumeration_down {
            return Err(DataError::Storage("listing service unavailable".into()));
        }
        self.inner.segment_bars(segment, start, end)
    }
}

impl BarSink for FlakyStore {
    fn insert_bars(&self, bars: &[PriceBar]) -> Result<usize, DataError> {
        self.inner.insert_bars(bars)
    }
}

impl SnapshotStore for FlakyStore {
    fn upsert_snapshot(&self, snapshot: &IndicatorSnapshot) -> Result<(), DataError> {
        self.inner.upsert_snapshot(snapshot)
    }

    fn snapshot(&self, symbol: &str, date: NaiveDate) -> Result<Option<IndicatorSnapshot>, DataError> {
        self.inner.snapshot(symbol, date)
    }

    fn snapshots_on(&self, segment: MarketSegment, date: NaiveDate) -> Result<Vec<IndicatorSnapshot>, DataError> {
        self.inner.snapshots_on(segment, date)
    }

    fn symbol_snapshots(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<IndicatorSnapshot>, DataError> {
        self.inner.symbol_snapshots(symbol, start, end)
    }
}

#[derive(Default)]
struct Recorder {
    started_with: Mutex<Option<usize>>,
    symbols_seen: AtomicUsize,
    max_done: AtomicUsize,
    finished: Mutex<Option<RefreshSummary>>,
}

impl RefreshProgress for Recorder {
    fn on_start(&self, _segment: MarketSegment, _date: NaiveDate, total: usize) {
        *self.started_with.lock().unwrap() = Some(total);
    }

    fn on_symbol(&self, _symbol: &str, done: usize, _total: usize, _result: &Result<(), String>) {
        self.symbols_seen.fetch_add(1, Ordering::SeqCst);
        self.max_done.fetch_max(done, Ordering::SeqCst);
    }

    fn on_complete(&self, summary: &RefreshSummary) {
        *self.finished.lock().unwrap() = Some(summary.clone());
    }
}

// ── Failure isolation ────────────────────────────────────────────────

#[test]
fn failing_and_panicking_symbols_do_not_stop_the_batch() {
    let u = universe();
    let last = u.last_date().unwrap();
    let mut flaky = FlakyStore::new(u.into_bars());
    flaky.failing.insert("1102".into());
    flaky.panicking.insert("1104".into());
    let store = Arc::new(flaky);

    let job = RefreshJob::new(store.clone(), RefreshConfig::default());
    let summary = job.refresh(last, MarketSegment::Listed, None).unwrap();

    assert_eq!(summary.symbols_total, 6);
    assert_eq!(summary.updated_count, 4);
    let mut failed: Vec<&str> = summary.failed.iter().map(|f| f.symbol.as_str()).collect();
    failed.sort_unstable();
    assert_eq!(failed, vec!["1102", "1104"]);
    assert!(summary.failed.iter().any(|f| f.error.contains("simulated outage")));
    assert!(summary.failed.iter().any(|f| f.error.contains("panicked")));

    assert!(store.snapshot("1101", last).unwrap().is_some());
    assert!(store.snapshot("1102", last).unwrap().is_none());
    assert_eq!(store.snapshots_on(MarketSegment::Listed, last).unwrap().len(), 4);
}

#[test]
fn enumeration_failure_aborts() {
    let u = universe();
    let last = u.last_date().unwrap();
    let mut flaky = FlakyStore::new(u.into_bars());
    flaky.enumeration_down = true;

    let job = RefreshJob::new(Arc::new(flaky), RefreshConfig::default());
    let err = job.refresh(last, MarketSegment::Listed, None).unwrap_err();
    assert!(matches!(err, RefreshError::Enumerate { .. }));
}

#[test]
fn progress_sees_every_unit() {
    let u = universe();
    let last = u.last_date().unwrap();
    let mut flaky = FlakyStore::new(u.into_bars());
    flaky.failing.insert("1101".into());
    let job = RefreshJob::new(Arc::new(flaky), RefreshConfig::default());

    let recorder = Recorder::default();
    let summary = job.refresh(last, MarketSegment::Listed, Some(&recorder)).unwrap();

    assert_eq!(*recorder.started_with.lock().unwrap(), Some(6));
    assert_eq!(recorder.symbols_seen.load(Ordering::SeqCst), 6);
    assert_eq!(recorder.max_done.load(Ordering::SeqCst), 6);
    assert_eq!(recorder.finished.lock().unwrap().as_ref(), Some(&summary));
}

// ── Idempotence ──────────────────────────────────────────────────────

#[test]
fn rerunning_a_date_on_parquet_is_idempotent() {
    let u = universe();
    let last = u.last_date().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ParquetStore::new(dir.path()));
    store.insert_bars(u.bars()).unwrap();

    let job = RefreshJob::new(store.clone(), RefreshConfig::default());
    let first = job.refresh(last, MarketSegment::Otc, None).unwrap();
    let snaps = store.snapshots_on(MarketSegment::Otc, last).unwrap();
    let second = job.refresh(last, MarketSegment::Otc, None).unwrap();

    assert_eq!(first.updated_count, 2);
    assert_eq!(second.updated_count, 2);
    assert_eq!(store.snapshots_on(MarketSegment::Otc, last).unwrap(), snaps);
    assert!(snaps.iter().all(|s| s.sma200.is_some()));
}

#[test]
fn short_lookback_leaves_long_indicators_empty() {
    let u = universe();
    let last = u.last_date().unwrap();
    let store = Arc::new(MemoryStore::with_bars(u.into_bars()));
    let config = RefreshConfig { lookback_days: 60, ..RefreshConfig::default() };

    let summary = RefreshJob::new(store.clone(), config).refresh(last, MarketSegment::Otc, None).unwrap();
    assert_eq!(summary.updated_count, 2);
    for snap in store.snapshots_on(MarketSegment::Otc, last).unwrap() {
        assert!(snap.sma20.is_some());
        assert!(snap.sma200.is_none());
    }
}
