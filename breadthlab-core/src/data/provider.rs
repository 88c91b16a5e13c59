//! Storage traits and structured error types.
//!
//! `BarSource` is the read side of the ingestion collaborator, `BarSink` its
//! write side, and `SnapshotStore` the persistence collaborator for computed
//! indicators. Implementations: [`MemoryStore`] for tests and small runs,
//! [`ParquetStore`] for on-disk data.
//!
//! [`MemoryStore`]: super::MemoryStore
//! [`ParquetStore`]: super::ParquetStore

use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::domain::{IndicatorSnapshot, MarketSegment, PriceBar};

/// Structured error types for data operations.
///
/// Every variant is an upstream failure: the operation that hit it should
/// abort and may be retried.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read access to end-of-day bars.
pub trait BarSource: Send + Sync {
    /// Bars of one symbol with `start <= date <= end`, ascending by date.
    fn symbol_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError>;

    /// Bars of every symbol in a segment with `start <= date <= end`,
    /// ordered by (symbol, date).
    fn segment_bars(
        &self,
        segment: MarketSegment,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError>;

    /// Distinct symbols with a bar on `date`, ascending.
    fn symbols_on(&self, segment: MarketSegment, date: NaiveDate) -> Result<Vec<String>, DataError> {
        let symbols: BTreeSet<String> = self
            .segment_bars(segment, date, date)?
            .into_iter()
            .map(|b| b.symbol)
            .collect();
        Ok(symbols.into_iter().collect())
    }

    /// Distinct trading dates of the segment within the range, ascending.
    fn trading_dates(
        &self,
        segment: MarketSegment,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, DataError> {
        let dates: BTreeSet<NaiveDate> = self
            .segment_bars(segment, start, end)?
            .into_iter()
            .map(|b| b.date)
            .collect();
        Ok(dates.into_iter().collect())
    }

    /// Most recent trading date of the segment at or before `date`, with no
    /// lookback limit.
    ///
    /// Stores that can answer without scanning every bar should override this.
    fn last_date_on_or_before(
        &self,
        segment: MarketSegment,
        date: NaiveDate,
    ) -> Result<Option<NaiveDate>, DataError> {
        Ok(self.trading_dates(segment, NaiveDate::MIN, date)?.last().copied())
    }

    /// Most recent trading date of the segment at or before `on_or_before`.
    ///
    /// Tries the last two weeks first, then falls back to an unbounded search.
    fn latest_trading_date(
        &self,
        segment: MarketSegment,
        on_or_before: NaiveDate,
    ) -> Result<Option<NaiveDate>, DataError> {
        let window_start = on_or_before
            .checked_sub_signed(Duration::days(14))
            .unwrap_or(NaiveDate::MIN);
        if let Some(last) = self.trading_dates(segment, window_start, on_or_before)?.last() {
            return Ok(Some(*last));
        }
        self.last_date_on_or_before(segment, on_or_before)
    }
}

/// Write access for the ingestion collaborator.
pub trait BarSink: Send + Sync {
    /// Insert bars, replacing any existing bar with the same (symbol, date).
    /// Returns the number of bars written.
    fn insert_bars(&self, bars: &[PriceBar]) -> Result<usize, DataError>;
}

/// A store serving every role: bars in, bars out, snapshots.
pub trait MarketStore: BarSource + BarSink + SnapshotStore {}

impl<T: BarSource + BarSink + SnapshotStore + ?Sized> MarketStore for T {}

/// Persistence of computed indicator snapshots, keyed by (symbol, date).
pub trait SnapshotStore: Send + Sync {
    /// Insert or overwrite the snapshot for (symbol, date).
    fn upsert_snapshot(&self, snapshot: &IndicatorSnapshot) -> Result<(), DataError>;

    fn snapshot(&self, symbol: &str, date: NaiveDate) -> Result<Option<IndicatorSnapshot>, DataError>;

    /// Every snapshot of the segment on `date`, ascending by symbol.
    fn snapshots_on(
        &self,
        segment: MarketSegment,
        date: NaiveDate,
    ) -> Result<Vec<IndicatorSnapshot>, DataError>;

    /// Snapshots of one symbol with `start <= date <= end`, ascending by date.
    fn symbol_snapshots(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorSnapshot>, DataError>;
}
