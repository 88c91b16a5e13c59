//! Daily indicator refresh.
//!
//! For one segment and date: enumerate the symbols that traded, load each
//! symbol's lookback window, compute its snapshot and persist it. Symbols are
//! independent units. A unit that fails (or panics) is recorded in the
//! summary and the rest of the batch carries on; only failing to enumerate
//! the universe aborts the run.

use breadthlab_core::data::{BarSource, DataError, MarketStore, SnapshotStore};
use breadthlab_core::domain::{IndicatorSnapshot, MarketSegment};
use breadthlab_core::indicators::IndicatorEngine;
use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RefreshConfig;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("failed to enumerate {segment} symbols on {date}: {source}")]
    Enumerate {
        segment: MarketSegment,
        date: NaiveDate,
        #[source]
        source: DataError,
    },

    #[error("failed to build refresh thread pool: {0}")]
    ThreadPool(String),

    #[error("invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

/// A symbol whose unit did not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshFailure {
    pub symbol: String,
    pub error: String,
}

/// Outcome of refreshing one segment on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub segment: MarketSegment,
    pub date: NaiveDate,
    pub symbols_total: usize,
    pub updated_count: usize,
    pub failed: Vec<RefreshFailure>,
    pub elapsed_ms: u64,
}

impl RefreshSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Progress callbacks for a refresh run.
pub trait RefreshProgress: Send + Sync {
    /// Called once the universe is known.
    fn on_start(&self, segment: MarketSegment, date: NaiveDate, total: usize);

    /// Called as each symbol finishes; `done` counts finished units.
    fn on_symbol(&self, symbol: &str, done: usize, total: usize, result: &Result<(), String>);

    /// Called when the batch is done.
    fn on_complete(&self, summary: &RefreshSummary);
}

/// Prints progress to stdout.
pub struct StdoutProgress;

impl RefreshProgress for StdoutProgress {
    fn on_start(&self, segment: MarketSegment, date: NaiveDate, total: usize) {
        println!("Refreshing {total} {segment} symbols for {date}");
    }

    fn on_symbol(&self, symbol: &str, done: usize, total: usize, result: &Result<(), String>) {
        if let Err(e) = result {
            println!("  [{done}/{total}] FAIL: {symbol}: {e}");
        }
    }

    fn on_complete(&self, summary: &RefreshSummary) {
        println!(
            "Refresh complete: {}/{} updated, {} failed ({} ms)",
            summary.updated_count,
            summary.symbols_total,
            summary.failed.len(),
            summary.elapsed_ms
        );
    }
}

/// Emits progress as tracing events.
pub struct TracingProgress;

impl RefreshProgress for TracingProgress {
    fn on_start(&self, segment: MarketSegment, date: NaiveDate, total: usize) {
        info!(%segment, %date, total, "refresh started");
    }

    fn on_symbol(&self, symbol: &str, done: usize, total: usize, result: &Result<(), String>) {
        match result {
            Ok(()) => debug!(symbol, done, total, "symbol refreshed"),
            Err(error) => warn!(symbol, done, total, %error, "symbol refresh failed"),
        }
    }

    fn on_complete(&self, summary: &RefreshSummary) {
        info!(
            segment = %summary.segment,
            date = %summary.date,
            updated = summary.updated_count,
            failed = summary.failed.len(),
            elapsed_ms = summary.elapsed_ms,
            "refresh complete"
        );
    }
}

/// Recomputes and persists indicator snapshots.
pub struct RefreshJob {
    store: Arc<dyn MarketStore>,
    engine: IndicatorEngine,
    config: RefreshConfig,
}

impl RefreshJob {
    pub fn new(store: Arc<dyn MarketStore>, config: RefreshConfig) -> Self {
        Self {
            store,
            engine: IndicatorEngine::default(),
            config,
        }
    }

    /// One unit: fetch the window, compute, persist.
    ///
    /// A window too short for some indicators still yields a snapshot with
    /// those fields empty.
    fn refresh_symbol(&self, symbol: &str, segment: MarketSegment, date: NaiveDate) -> Result<(), DataError> {
        let start = date - Duration::days(self.config.lookback_days);
        let bars = self.store.symbol_bars(symbol, start, date)?;
        let snapshot = self
            .engine
            .latest(&bars)
            .filter(|s| s.date == date)
            .unwrap_or_else(|| IndicatorSnapshot::empty(symbol, segment, date));
        self.store.upsert_snapshot(&snapshot)
    }

    /// Runs one unit, converting a panic into an error.
    fn run_unit(&self, symbol: &str, segment: MarketSegment, date: NaiveDate) -> Result<(), String> {
        match catch_unwind(AssertUnwindSafe(|| self.refresh_symbol(symbol, segment, date))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(panic_message(payload.as_ref())),
        }
    }

    /// Refresh every symbol of `segment` that traded on `date`.
    pub fn refresh(
        &self,
        date: NaiveDate,
        segment: MarketSegment,
        progress: Option<&dyn RefreshProgress>,
    ) -> Result<RefreshSummary, RefreshError> {
        let started = Instant::now();
        let symbols = self
            .store
            .symbols_on(segment, date)
            .map_err(|source| RefreshError::Enumerate { segment, date, source })?;
        let total = symbols.len();
        if let Some(p) = progress {
            p.on_start(segment, date, total);
        }

        let done = AtomicUsize::new(0);
        let unit = |symbol: &String| {
            let result = self.run_unit(symbol, segment, date);
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(p) = progress {
                p.on_symbol(symbol, finished, total, &result);
            }
            (symbol.clone(), result)
        };

        let results: Vec<(String, Result<(), String>)> = if self.config.parallel {
            match self.config.threads {
                Some(n) => rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| RefreshError::ThreadPool(e.to_string()))?
                    .install(|| symbols.par_iter().map(unit).collect()),
                None => symbols.par_iter().map(unit).collect(),
            }
        } else {
            symbols.iter().map(unit).collect()
        };

        let mut updated_count = 0;
        let mut failed = Vec::new();
        for (symbol, result) in results {
            match result {
                Ok(()) => updated_count += 1,
                Err(error) => failed.push(RefreshFailure { symbol, error }),
            }
        }

        let summary = RefreshSummary {
            segment,
            date,
            symbols_total: total,
            updated_count,
            failed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        if let Some(p) = progress {
            p.on_complete(&summary);
        }
        Ok(summary)
    }

    /// Refresh every trading date of the segment in `[start, end]`, oldest
    /// first. Dates without bars are skipped.
    pub fn refresh_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        segment: MarketSegment,
        progress: Option<&dyn RefreshProgress>,
    ) -> Result<Vec<RefreshSummary>, RefreshError> {
        if start > end {
            return Err(RefreshError::InvalidRange { start, end });
        }
        let dates = self
            .store
            .trading_dates(segment, start, end)
            .map_err(|source| RefreshError::Enumerate { segment, date: start, source })?;
        dates
            .into_iter()
            .map(|date| self.refresh(date, segment, progress))
            .collect()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
