//! In-memory store backed by ordered maps.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::provider::{BarSink, BarSource, DataError, SnapshotStore};
use crate::domain::{IndicatorSnapshot, MarketSegment, PriceBar};

type Key = (String, NaiveDate);

/// Thread-safe store keeping bars and snapshots in `BTreeMap`s keyed by
/// (symbol, date), so per-symbol range reads are ordered lookups.
#[derive(Debug, Default)]
pub struct MemoryStore {
    bars: RwLock<BTreeMap<Key, PriceBar>>,
    snapshots: RwLock<BTreeMap<Key, IndicatorSnapshot>>,
}

fn poisoned(what: &str) -> DataError {
    DataError::Storage(format!("{what} lock poisoned"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-loaded with bars.
    pub fn with_bars(bars: impl IntoIterator<Item = PriceBar>) -> Self {
        let map = bars
            .into_iter()
            .map(|b| ((b.symbol.clone(), b.date), b))
            .collect();
        Self {
            bars: RwLock::new(map),
            snapshots: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn bar_count(&self) -> Result<usize, DataError> {
        Ok(self.bars.read().map_err(|_| poisoned("bar"))?.len())
    }

    pub fn snapshot_count(&self) -> Result<usize, DataError> {
        Ok(self.snapshots.read().map_err(|_| poisoned("snapshot"))?.len())
    }
}

impl BarSource for MemoryStore {
    fn symbol_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError> {
        if start > end {
            return Ok(Vec::new());
        }
        let bars = self.bars.read().map_err(|_| poisoned("bar"))?;
        Ok(bars
            .range((symbol.to_string(), start)..=(symbol.to_string(), end))
            .map(|(_, b)| b.clone())
            .collect())
    }

    fn segment_bars(
        &self,
        segment: MarketSegment,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError> {
        let bars = self.bars.read().map_err(|_| poisoned("bar"))?;
        Ok(bars
            .values()
            .filter(|b| b.segment == segment && b.date >= start && b.date <= end)
            .cloned()
            .collect())
    }

    fn last_date_on_or_before(
        &self,
        segment: MarketSegment,
        date: NaiveDate,
    ) -> Result<Option<NaiveDate>, DataError> {
        let bars = self.bars.read().map_err(|_| poisoned("bar"))?;
        Ok(bars
            .values()
            .filter(|b| b.segment == segment && b.date <= date)
            .map(|b| b.date)
            .max())
    }
}

impl BarSink for MemoryStore {
    fn insert_bars(&self, new_bars: &[PriceBar]) -> Result<usize, DataError> {
        let mut bars = self.bars.write().map_err(|_| poisoned("bar"))?;
        for bar in new_bars {
            bars.insert((bar.symbol.clone(), bar.date), bar.clone());
        }
        Ok(new_bars.len())
    }
}

impl SnapshotStore for MemoryStore {
    fn upsert_snapshot(&self, snapshot: &IndicatorSnapshot) -> Result<(), DataError> {
        let mut snapshots = self.snapshots.write().map_err(|_| poisoned("snapshot"))?;
        snapshots.insert((snapshot.symbol.clone(), snapshot.date), snapshot.clone());
        Ok(())
    }

    fn snapshot(&self, symbol: &str, date: NaiveDate) -> Result<Option<IndicatorSnapshot>, DataError> {
        let snapshots = self.snapshots.read().map_err(|_| poisoned("snapshot"))?;
        Ok(snapshots.get(&(symbol.to_string(), date)).cloned())
    }

    fn snapshots_on(
        &self,
        segment: MarketSegment,
        date: NaiveDate,
    ) -> Result<Vec<IndicatorSnapshot>, DataError> {
        let snapshots = self.snapshots.read().map_err(|_| poisoned("snapshot"))?;
        Ok(snapshots
            .values()
            .filter(|s| s.segment == segment && s.date == date)
            .cloned()
            .collect())
    }

    fn symbol_snapshots(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorSnapshot>, DataError> {
        if start > end {
            return Ok(Vec::new());
        }
        let snapshots = self.snapshots.read().map_err(|_| poisoned("snapshot"))?;
        Ok(snapshots
            .range((symbol.to_string(), start)..=(symbol.to_string(), end))
            .map(|(_, s)| s.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn bar(symbol: &str, segment: MarketSegment, day: u32, close: f64) -> PriceBar {
        PriceBar {
            symbol: symbol.into(),
            segment,
            date: d(day),
            open: Some(close),
            high: Some(close),
            low: Some(close),
            close: Some(close),
            volume: Some(10),
            turnover: Some(close * 10.0),
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::with_bars([
            bar("A", MarketSegment::Listed, 2, 10.0),
            bar("A", MarketSegment::Listed, 3, 11.0),
            bar("A", MarketSegment::Listed, 6, 12.0),
            bar("B", MarketSegment::Listed, 3, 20.0),
            bar("C", MarketSegment::Otc, 6, 30.0),
        ])
    }

    #[test]
    fn symbol_range_is_inclusive_and_ordered() {
        let bars = store().symbol_bars("A", d(2), d(3)).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].date < bars[1].date);
        assert!(store().symbol_bars("A", d(7), d(2)).unwrap().is_empty());
    }

    #[test]
    fn segment_queries() {
        let s = store();
        assert_eq!(s.symbols_on(MarketSegment::Listed, d(3)).unwrap(), vec!["A", "B"]);
        assert_eq!(s.symbols_on(MarketSegment::Otc, d(3)).unwrap(), Vec::<String>::new());
        assert_eq!(
            s.trading_dates(MarketSegment::Listed, d(1), d(31)).unwrap(),
            vec![d(2), d(3), d(6)]
        );
        assert_eq!(s.latest_trading_date(MarketSegment::Listed, d(5)).unwrap(), Some(d(3)));
        assert_eq!(s.latest_trading_date(MarketSegment::Otc, d(5)).unwrap(), None);
    }

    #[test]
    fn latest_date_has_no_lookback_limit() {
        let mut old = bar("A", MarketSegment::Listed, 2, 10.0);
        old.date = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let s = MemoryStore::with_bars([old]);

        let query = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(
            s.latest_trading_date(MarketSegment::Listed, query).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 2)
        );
        assert_eq!(s.latest_trading_date(MarketSegment::Listed, NaiveDate::MIN).unwrap(), None);
    }

    #[test]
    fn insert_replaces_same_key() {
        let s = store();
        s.insert_bars(&[bar("A", MarketSegment::Listed, 2, 99.0)]).unwrap();
        assert_eq!(s.bar_count().unwrap(), 5);
        assert_eq!(s.symbol_bars("A", d(2), d(2)).unwrap()[0].close, Some(99.0));
    }

    #[test]
    fn snapshot_upsert_overwrites() {
        let s = MemoryStore::new();
        let mut snap = IndicatorSnapshot::empty("A", MarketSegment::Listed, d(3));
        s.upsert_snapshot(&snap).unwrap();
        snap.rsi14 = Some(42.0);
        s.upsert_snapshot(&snap).unwrap();
        assert_eq!(s.snapshot_count().unwrap(), 1);
        assert_eq!(s.snapshot("A", d(3)).unwrap().unwrap().rsi14, Some(42.0));
        assert_eq!(s.snapshots_on(MarketSegment::Listed, d(3)).unwrap().len(), 1);
        assert!(s.snapshots_on(MarketSegment::Otc, d(3)).unwrap().is_empty());
    }
}
