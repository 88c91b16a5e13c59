//! CSV import of end-of-day bars.
//!
//! Expected header: `symbol,segment,date,open,high,low,close,volume,turnover`.
//! Empty cells are unpublished values. Rows are canonicalized before they
//! reach the sink: duplicates of a (symbol, date) keep the first row, and
//! bars failing the OHLC sanity check are rejected.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use super::provider::{BarSink, DataError};
use crate::domain::{is_storable_symbol, MarketSegment, PriceBar};

/// Outcome of one import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Rows read from the file, including rejected ones.
    pub rows_read: usize,
    /// Bars handed to the sink.
    pub inserted: usize,
    pub duplicates: usize,
    /// Rows failing the sanity check or carrying an unknown segment or an
    /// unusable symbol.
    pub rejected: usize,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    symbol: String,
    segment: String,
    date: NaiveDate,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<u64>,
    turnover: Option<f64>,
}

impl CsvRow {
    fn into_bar(self) -> Result<PriceBar, String> {
        let segment: MarketSegment = self.segment.parse().map_err(|e| format!("{e}"))?;
        let symbol = self.symbol.trim();
        if !is_storable_symbol(symbol) {
            return Err(format!("invalid symbol '{symbol}'"));
        }
        Ok(PriceBar {
            symbol: symbol.to_string(),
            segment,
            date: self.date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            turnover: self.turnover,
        })
    }
}

/// Import bars from any CSV reader into `sink`.
///
/// A malformed row (unparseable date or number) aborts the import with
/// [`DataError::Csv`] naming the line; nothing is written in that case.
pub fn import_csv<R: Read>(reader: R, sink: &dyn BarSink) -> Result<ImportReport, DataError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut report = ImportReport::default();
    let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();
    let mut bars = Vec::new();

    for (line, result) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = result.map_err(|e| DataError::Csv(format!("row {}: {e}", line + 2)))?;
        report.rows_read += 1;

        let bar = match row.into_bar() {
            Ok(bar) => bar,
            Err(reason) => {
                warn!(row = line + 2, %reason, "rejecting row");
                report.rejected += 1;
                continue;
            }
        };
        if !bar.is_sane() {
            warn!(symbol = %bar.symbol, date = %bar.date, "rejecting insane bar");
            report.rejected += 1;
            continue;
        }
        if !seen.insert((bar.symbol.clone(), bar.date)) {
            report.duplicates += 1;
            continue;
        }
        bars.push(bar);
    }

    report.inserted = sink.insert_bars(&bars)?;
    info!(
        rows = report.rows_read,
        inserted = report.inserted,
        duplicates = report.duplicates,
        rejected = report.rejected,
        "csv import finished"
    );
    Ok(report)
}

/// Import bars from a CSV file on disk.
pub fn import_csv_file(path: &Path, sink: &dyn BarSink) -> Result<ImportReport, DataError> {
    let file = std::fs::File::open(path)?;
    import_csv(file, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BarSource, MemoryStore};

    const SAMPLE: &str = "\
symbol,segment,date,open,high,low,close,volume,turnover
2330,listed,2024-01-02,100,105,98,103,50000,5150000
2330,listed,2024-01-02,1,1,1,1,1,1
6488,otc,2024-01-02,,,,,,
1101,LISTED,2024-01-02,50,49,48,50,100,5000
9999,nasdaq,2024-01-02,1,1,1,1,1,1
";

    #[test]
    fn import_applies_dedupe_and_sanity() {
        let store = MemoryStore::new();
        let report = import_csv(SAMPLE.as_bytes(), &store).unwrap();

        assert_eq!(
            report,
            ImportReport { rows_read: 5, inserted: 2, duplicates: 1, rejected: 2 }
        );

        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let bars = store.symbol_bars("2330", day, day).unwrap();
        assert_eq!(bars[0].close, Some(103.0), "first duplicate wins");

        let void = store.symbol_bars("6488", day, day).unwrap();
        assert_eq!(void.len(), 1);
        assert!(void[0].is_void());
        assert_eq!(void[0].segment, MarketSegment::Otc);
        assert_eq!(void[0].volume, None);
    }

    #[test]
    fn malformed_row_aborts() {
        let store = MemoryStore::new();
        let csv = "symbol,segment,date,open,high,low,close,volume,turnover\n\
                   2330,listed,not-a-date,1,1,1,1,1,1\n";
        let err = import_csv(csv.as_bytes(), &store).unwrap_err();
        assert!(matches!(err, DataError::Csv(ref msg) if msg.contains("row 2")));
        assert_eq!(store.bar_count().unwrap(), 0);
    }

    #[test]
    fn unusable_symbols_are_rejected() {
        let store = MemoryStore::new();
        let csv = "symbol,segment,date,open,high,low,close,volume,turnover\n\
                   BRK/B,listed,2024-01-02,10,11,9,10,100,1000\n\
                   ,listed,2024-01-02,10,11,9,10,100,1000\n\
                   a=b,otc,2024-01-02,10,11,9,10,100,1000\n\
                   2330,listed,2024-01-02,10,11,9,10,100,1000\n";
        let report = import_csv(csv.as_bytes(), &store).unwrap();
        assert_eq!(report, ImportReport { rows_read: 4, inserted: 1, duplicates: 0, rejected: 3 });

        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(store.symbols_on(MarketSegment::Listed, day).unwrap(), vec!["2330"]);
    }
}
