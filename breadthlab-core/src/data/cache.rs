//! Parquet store with Hive-style partitioning.
//!
//! Layout:
//! - `{root}/bars/segment={SEGMENT}/symbol={SYMBOL}/{year}.parquet`
//! - `{root}/bars/segment={SEGMENT}/symbol={SYMBOL}/meta.json`
//! - `{root}/snapshots/segment={SEGMENT}/symbol={SYMBOL}/{year}.parquet`
//!
//! Features:
//! - Atomic writes (unique temp file in the target dir, renamed into place)
//! - Merge-on-write under a per-symbol-directory lock: existing rows with
//!   the same date are replaced
//! - Integrity validation on load (schema check, row count > 0)
//! - Quarantine for corrupt files on the read path ({filename}.quarantined);
//!   the write path refuses to overwrite a partition it cannot decode
//! - Metadata sidecar per symbol (hash, date range, bar count)
//!
//! Symbols become path components, so only codes passing
//! [`is_storable_symbol`] are accepted for writes.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use super::provider::{BarSink, BarSource, DataError, SnapshotStore};
use crate::domain::snapshot::VALUE_COLUMNS;
use crate::domain::{is_storable_symbol, IndicatorSnapshot, MarketSegment, PriceBar};

const BAR_COLUMNS: [&str; 7] = ["date", "open", "high", "low", "close", "volume", "turnover"];

/// Metadata sidecar for a stored symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    pub segment: MarketSegment,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub bar_count: usize,
    pub data_hash: String,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, Copy)]
enum Table {
    Bars,
    Snapshots,
}

impl Table {
    fn dir_name(self) -> &'static str {
        match self {
            Table::Bars => "bars",
            Table::Snapshots => "snapshots",
        }
    }
}

/// What to do with a partition file that exists but cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnCorrupt {
    /// Move it aside and treat the partition as empty.
    Quarantine,
    /// Fail the operation and leave the file untouched.
    Fail,
}

/// One mutex per symbol directory, shared by every clone of a store.
type DirLocks = Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>;

/// The Parquet store.
///
/// Read-modify-write cycles on a symbol directory are serialized within the
/// process; clones share the same locks.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    root: PathBuf,
    locks: DirLocks,
}

fn check_symbol(symbol: &str) -> Result<(), DataError> {
    if is_storable_symbol(symbol) {
        Ok(())
    } else {
        Err(DataError::ValidationError(format!("invalid symbol '{symbol}'")))
    }
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DirLocks::default(),
        }
    }

    /// The mutex guarding one symbol directory.
    fn dir_lock(&self, dir: &Path) -> Result<Arc<Mutex<()>>, DataError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| DataError::Storage("lock registry poisoned".into()))?;
        Ok(Arc::clone(locks.entry(dir.to_path_buf()).or_default()))
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{table}/segment={SEGMENT}/`
    fn segment_dir(&self, table: Table, segment: MarketSegment) -> PathBuf {
        self.root
            .join(table.dir_name())
            .join(format!("segment={}", segment.as_str()))
    }

    /// `{root}/{table}/segment={SEGMENT}/symbol={SYMBOL}/`
    fn symbol_dir(&self, table: Table, segment: MarketSegment, symbol: &str) -> PathBuf {
        self.segment_dir(table, segment).join(format!("symbol={symbol}"))
    }

    fn year_path(&self, table: Table, segment: MarketSegment, symbol: &str, year: i32) -> PathBuf {
        self.symbol_dir(table, segment, symbol)
            .join(format!("{year}.parquet"))
    }

    fn meta_path(&self, segment: MarketSegment, symbol: &str) -> PathBuf {
        self.symbol_dir(Table::Bars, segment, symbol).join("meta.json")
    }

    /// Segment a symbol is filed under in `table`, if any.
    fn segment_in(&self, table: Table, symbol: &str) -> Option<MarketSegment> {
        if !is_storable_symbol(symbol) {
            return None;
        }
        MarketSegment::ALL
            .into_iter()
            .find(|seg| self.symbol_dir(table, *seg, symbol).is_dir())
    }

    /// Segment a symbol's bars are filed under, if any.
    fn segment_of(&self, symbol: &str) -> Option<MarketSegment> {
        self.segment_in(Table::Bars, symbol)
    }

    /// Symbols with a directory under the segment, ascending.
    pub fn symbols(&self, segment: MarketSegment) -> Result<Vec<String>, DataError> {
        self.list_symbols(Table::Bars, segment)
    }

    fn list_symbols(&self, table: Table, segment: MarketSegment) -> Result<Vec<String>, DataError> {
        let dir = self.segment_dir(table, segment);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut symbols = BTreeSet::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(symbol) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("symbol="))
            {
                symbols.insert(symbol.to_string());
            }
        }
        Ok(symbols.into_iter().collect())
    }

    /// Metadata sidecar for a symbol, if present and readable.
    pub fn get_meta(&self, symbol: &str) -> Option<CacheMeta> {
        self.read_meta(self.segment_of(symbol)?, symbol)
    }

    fn read_meta(&self, segment: MarketSegment, symbol: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(segment, symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Write one symbol's bars, merging with whatever is stored for the
    /// affected years.
    pub fn write_bars(
        &self,
        segment: MarketSegment,
        symbol: &str,
        bars: &[PriceBar],
    ) -> Result<(), DataError> {
        check_symbol(symbol)?;
        if bars.is_empty() {
            return Ok(());
        }
        let lock = self.dir_lock(&self.symbol_dir(Table::Bars, segment, symbol))?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut by_year: BTreeMap<i32, Vec<&PriceBar>> = BTreeMap::new();
        for bar in bars {
            by_year.entry(bar.date.year()).or_default().push(bar);
        }

        for (year, year_bars) in by_year {
            let path = self.year_path(Table::Bars, segment, symbol, year);
            let mut merged: BTreeMap<NaiveDate, PriceBar> = self
                .load_partition(&path, OnCorrupt::Fail, |df| dataframe_to_bars(df, symbol, segment))?
                .into_iter()
                .map(|b| (b.date, b))
                .collect();
            for bar in year_bars {
                merged.insert(bar.date, bar.clone());
            }
            let rows: Vec<&PriceBar> = merged.values().collect();
            write_parquet(&mut bars_to_dataframe(&rows)?, &path)?;
        }

        self.write_meta(segment, symbol)
    }

    /// Rebuild the metadata sidecar from the stored partitions. Callers hold
    /// the symbol directory lock.
    fn write_meta(&self, segment: MarketSegment, symbol: &str) -> Result<(), DataError> {
        let all = self.load_symbol(Table::Bars, segment, symbol, None, None, OnCorrupt::Fail, |df| {
            dataframe_to_bars(df, symbol, segment)
        })?;
        let (Some(first), Some(last)) = (all.first(), all.last()) else {
            return Ok(());
        };

        let hash_input = serde_json::to_vec(&all)
            .map_err(|e| DataError::Storage(format!("hash serialization: {e}")))?;
        let meta = CacheMeta {
            symbol: symbol.to_string(),
            segment,
            start_date: first.date,
            end_date: last.date,
            bar_count: all.len(),
            data_hash: blake3::hash(&hash_input).to_hex().to_string(),
            updated_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::Storage(format!("meta serialization: {e}")))?;
        write_atomic(&self.meta_path(segment, symbol), meta_json.as_bytes())
    }

    /// Load a single partition file; a missing file is an empty partition.
    ///
    /// I/O failures other than "not found" are returned as-is. Only a file
    /// that opens but fails to decode or validate counts as corrupt.
    fn load_partition<T, F>(&self, path: &Path, on_corrupt: OnCorrupt, convert: F) -> Result<Vec<T>, DataError>
    where
        F: Fn(&DataFrame) -> Result<Vec<T>, DataError>,
    {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DataError::Io(e)),
        };
        match read_parquet(file).and_then(|df| convert(&df)) {
            Ok(rows) => Ok(rows),
            Err(e) => match on_corrupt {
                OnCorrupt::Fail => Err(DataError::ValidationError(format!(
                    "corrupt partition {}: {e}",
                    path.display()
                ))),
                OnCorrupt::Quarantine => {
                    self.quarantine(path, &e)?;
                    Ok(Vec::new())
                }
            },
        }
    }

    /// Move a corrupt partition aside as `{filename}.quarantined`.
    fn quarantine(&self, path: &Path, cause: &DataError) -> Result<(), DataError> {
        let dir = path.parent().unwrap_or(self.root.as_path());
        let lock = self.dir_lock(dir)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let target = path.with_extension("parquet.quarantined");
        warn!(path = %path.display(), error = %cause, "quarantining corrupt partition");
        match fs::rename(path, &target) {
            Ok(()) => Ok(()),
            // already moved by a concurrent reader
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DataError::Storage(format!(
                "quarantine of {} failed: {e}",
                path.display()
            ))),
        }
    }

    /// Load every partition of a symbol overlapping `[start, end]`
    /// (unbounded when `None`), filtered to the range and sorted by date.
    fn load_symbol<T, F>(
        &self,
        table: Table,
        segment: MarketSegment,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        on_corrupt: OnCorrupt,
        convert: F,
    ) -> Result<Vec<T>, DataError>
    where
        T: Dated,
        F: Fn(&DataFrame) -> Result<Vec<T>, DataError>,
    {
        let dir = self.symbol_dir(table, segment, symbol);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut years = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            let Some(year) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i32>().ok())
            else {
                continue;
            };
            let after_start = start.map_or(true, |s| year >= s.year());
            let before_end = end.map_or(true, |e| year <= e.year());
            if after_start && before_end {
                years.push(path);
            }
        }

        let mut rows = Vec::new();
        for path in years {
            rows.extend(self.load_partition(&path, on_corrupt, &convert)?);
        }
        rows.retain(|r: &T| {
            start.map_or(true, |s| r.date() >= s) && end.map_or(true, |e| r.date() <= e)
        });
        rows.sort_by_key(|r| r.date());
        debug!(symbol, table = table.dir_name(), rows = rows.len(), "loaded partitions");
        Ok(rows)
    }
}

/// Rows that carry a trading date.
trait Dated {
    fn date(&self) -> NaiveDate;
}

impl Dated for PriceBar {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Dated for IndicatorSnapshot {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl BarSource for ParquetStore {
    fn symbol_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError> {
        let Some(segment) = self.segment_of(symbol) else {
            return Ok(Vec::new());
        };
        self.load_symbol(Table::Bars, segment, symbol, Some(start), Some(end), OnCorrupt::Quarantine, |df| {
            dataframe_to_bars(df, symbol, segment)
        })
    }

    fn segment_bars(
        &self,
        segment: MarketSegment,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError> {
        let mut all = Vec::new();
        for symbol in self.symbols(segment)? {
            all.extend(self.load_symbol(
                Table::Bars,
                segment,
                &symbol,
                Some(start),
                Some(end),
                OnCorrupt::Quarantine,
                |df| dataframe_to_bars(df, &symbol, segment),
            )?);
        }
        Ok(all)
    }

    /// Uses each symbol's metadata sidecar to skip loading partitions where
    /// the answer is already known.
    fn last_date_on_or_before(
        &self,
        segment: MarketSegment,
        date: NaiveDate,
    ) -> Result<Option<NaiveDate>, DataError> {
        let mut latest: Option<NaiveDate> = None;
        for symbol in self.symbols(segment)? {
            let start = match self.read_meta(segment, &symbol) {
                Some(meta) if meta.end_date <= date => {
                    latest = latest.max(Some(meta.end_date));
                    continue;
                }
                Some(meta) if meta.start_date > date => continue,
                Some(meta) => Some(meta.start_date),
                None => None,
            };
            let bars = self.load_symbol(
                Table::Bars,
                segment,
                &symbol,
                start,
                Some(date),
                OnCorrupt::Quarantine,
                |df| dataframe_to_bars(df, &symbol, segment),
            )?;
            latest = latest.max(bars.last().map(|b| b.date));
        }
        Ok(latest)
    }
}

impl BarSink for ParquetStore {
    /// Every symbol is validated before anything is written.
    fn insert_bars(&self, bars: &[PriceBar]) -> Result<usize, DataError> {
        for bar in bars {
            check_symbol(&bar.symbol)?;
        }
        let mut grouped: BTreeMap<(MarketSegment, &str), Vec<PriceBar>> = BTreeMap::new();
        for bar in bars {
            grouped
                .entry((bar.segment, bar.symbol.as_str()))
                .or_default()
                .push(bar.clone());
        }
        for ((segment, symbol), symbol_bars) in grouped {
            self.write_bars(segment, symbol, &symbol_bars)?;
        }
        Ok(bars.len())
    }
}

impl SnapshotStore for ParquetStore {
    fn upsert_snapshot(&self, snapshot: &IndicatorSnapshot) -> Result<(), DataError> {
        let (segment, symbol) = (snapshot.segment, snapshot.symbol.as_str());
        check_symbol(symbol)?;
        let lock = self.dir_lock(&self.symbol_dir(Table::Snapshots, segment, symbol))?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.year_path(Table::Snapshots, segment, symbol, snapshot.date.year());
        let mut merged: BTreeMap<NaiveDate, IndicatorSnapshot> = self
            .load_partition(&path, OnCorrupt::Fail, |df| dataframe_to_snapshots(df, symbol, segment))?
            .into_iter()
            .map(|s| (s.date, s))
            .collect();
        merged.insert(snapshot.date, snapshot.clone());
        let rows: Vec<&IndicatorSnapshot> = merged.values().collect();
        write_parquet(&mut snapshots_to_dataframe(&rows)?, &path)
    }

    fn snapshot(&self, symbol: &str, date: NaiveDate) -> Result<Option<IndicatorSnapshot>, DataError> {
        Ok(self.symbol_snapshots(symbol, date, date)?.into_iter().next())
    }

    fn snapshots_on(
        &self,
        segment: MarketSegment,
        date: NaiveDate,
    ) -> Result<Vec<IndicatorSnapshot>, DataError> {
        let mut all = Vec::new();
        for symbol in self.list_symbols(Table::Snapshots, segment)? {
            all.extend(self.load_symbol(
                Table::Snapshots,
                segment,
                &symbol,
                Some(date),
                Some(date),
                OnCorrupt::Quarantine,
                |df| dataframe_to_snapshots(df, &symbol, segment),
            )?);
        }
        Ok(all)
    }

    fn symbol_snapshots(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorSnapshot>, DataError> {
        let Some(segment) = self.segment_in(Table::Snapshots, symbol) else {
            return Ok(Vec::new());
        };
        self.load_symbol(
            Table::Snapshots,
            segment,
            symbol,
            Some(start),
            Some(end),
            OnCorrupt::Quarantine,
            |df| dataframe_to_snapshots(df, symbol, segment),
        )
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    // chrono's default date is 1970-01-01
    NaiveDate::default()
}

fn date_column(dates: impl Iterator<Item = NaiveDate>) -> Result<Column, DataError> {
    let days: Vec<i32> = dates.map(|d| (d - epoch()).num_days() as i32).collect();
    Column::new("date".into(), days)
        .cast(&DataType::Date)
        .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))
}

fn bars_to_dataframe(bars: &[&PriceBar]) -> Result<DataFrame, DataError> {
    let float = |f: fn(&PriceBar) -> Option<f64>| -> Vec<Option<f64>> {
        bars.iter().map(|b| f(b)).collect()
    };
    let volumes: Vec<Option<u64>> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        date_column(bars.iter().map(|b| b.date))?,
        Column::new("open".into(), float(|b| b.open)),
        Column::new("high".into(), float(|b| b.high)),
        Column::new("low".into(), float(|b| b.low)),
        Column::new("close".into(), float(|b| b.close)),
        Column::new("volume".into(), volumes),
        Column::new("turnover".into(), float(|b| b.turnover)),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn snapshots_to_dataframe(snapshots: &[&IndicatorSnapshot]) -> Result<DataFrame, DataError> {
    let mut columns = Vec::with_capacity(VALUE_COLUMNS.len() + 1);
    columns.push(date_column(snapshots.iter().map(|s| s.date))?);
    let rows: Vec<[Option<f64>; 15]> = snapshots.iter().map(|s| s.values()).collect();
    for (c, name) in VALUE_COLUMNS.iter().enumerate() {
        let values: Vec<Option<f64>> = rows.iter().map(|r| r[c]).collect();
        columns.push(Column::new((*name).into(), values));
    }
    DataFrame::new(columns).map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

/// A uniquely named temp file next to `path`; removed on drop unless persisted.
fn temp_beside(path: &Path, suffix: &str) -> Result<tempfile::NamedTempFile, DataError> {
    let parent = path
        .parent()
        .ok_or_else(|| DataError::Storage(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(parent)?;
    Ok(tempfile::Builder::new().prefix(".").suffix(suffix).tempfile_in(parent)?)
}

/// Write a DataFrame atomically: write to a unique temp file, then rename
/// into place.
fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let mut tmp = temp_beside(path, ".parquet.tmp")?;
    ParquetWriter::new(tmp.as_file_mut())
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    tmp.persist(path)
        .map_err(|e| DataError::ParquetError(format!("atomic rename failed: {}", e.error)))?;
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), DataError> {
    let mut tmp = temp_beside(path, ".tmp")?;
    tmp.write_all(contents)?;
    tmp.persist(path)
        .map_err(|e| DataError::Storage(format!("atomic rename failed: {}", e.error)))?;
    Ok(())
}

fn read_parquet(file: fs::File) -> Result<DataFrame, DataError> {
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;
    if df.height() == 0 {
        return Err(DataError::ValidationError("empty parquet file".into()));
    }
    Ok(df)
}

fn require_columns(df: &DataFrame, names: &[&str]) -> Result<(), DataError> {
    for name in names {
        if df.column(name).is_err() {
            return Err(DataError::ValidationError(format!("missing column '{name}'")));
        }
    }
    Ok(())
}

fn read_dates(df: &DataFrame) -> Result<Vec<NaiveDate>, DataError> {
    let date_ca = df
        .column("date")
        .and_then(|c| c.date())
        .map_err(|e| DataError::ParquetError(format!("date column type: {e}")))?;
    (0..df.height())
        .map(|i| {
            date_ca
                .get(i)
                .map(|days| epoch() + chrono::Duration::days(days as i64))
                .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))
        })
        .collect()
}

fn f64_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Float64Chunked, DataError> {
    df.column(name)
        .and_then(|c| c.f64())
        .map_err(|e| DataError::ParquetError(format!("{name} column type: {e}")))
}

fn dataframe_to_bars(
    df: &DataFrame,
    symbol: &str,
    segment: MarketSegment,
) -> Result<Vec<PriceBar>, DataError> {
    require_columns(df, &BAR_COLUMNS)?;
    let dates = read_dates(df)?;
    let open = f64_column(df, "open")?;
    let high = f64_column(df, "high")?;
    let low = f64_column(df, "low")?;
    let close = f64_column(df, "close")?;
    let turnover = f64_column(df, "turnover")?;
    let volume = df
        .column("volume")
        .and_then(|c| c.u64())
        .map_err(|e| DataError::ParquetError(format!("volume column type: {e}")))?;

    Ok(dates
        .into_iter()
        .enumerate()
        .map(|(i, date)| PriceBar {
            symbol: symbol.to_string(),
            segment,
            date,
            open: open.get(i),
            high: high.get(i),
            low: low.get(i),
            close: close.get(i),
            volume: volume.get(i),
            turnover: turnover.get(i),
        })
        .collect())
}

fn dataframe_to_snapshots(
    df: &DataFrame,
    symbol: &str,
    segment: MarketSegment,
) -> Result<Vec<IndicatorSnapshot>, DataError> {
    require_columns(df, &["date"])?;
    require_columns(df, &VALUE_COLUMNS)?;
    let dates = read_dates(df)?;
    let columns = VALUE_COLUMNS
        .iter()
        .map(|name| f64_column(df, name))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(dates
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            let mut values = [None; 15];
            for (c, ca) in columns.iter().enumerate() {
                values[c] = ca.get(i);
            }
            IndicatorSnapshot::from_values(symbol, segment, date, values)
        })
        .collect())
}
