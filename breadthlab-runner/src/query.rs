//! Read-side facade over the stores.
//!
//! Every query resolves its date the same way (the most recent trading date
//! at or before the requested one, today when none is given) and returns
//! plain serde records. Segment-wide results are memoized in a
//! [`ResultCache`].

use breadthlab_core::analysis::{
    aggregate_bars, breadth_history, compute_sentiment, screen_date, segment_period_change,
    AggregatedBar, BreadthPoint, Bucketing, PeriodChange, SentimentReading, Timeframe,
};
use breadthlab_core::data::{BarSource, DataError, MarketStore, SnapshotStore};
use breadthlab_core::domain::{IndicatorSnapshot, MarketSegment};
use breadthlab_core::indicators::IndicatorEngine;
use chrono::{Duration, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::cache::ResultCache;
use crate::config::Config;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("no {segment} trading date on or before {on_or_before}")]
    NoTradingDate {
        segment: MarketSegment,
        on_or_before: NaiveDate,
    },

    #[error("no bars for symbol '{0}'")]
    UnknownSymbol(String),

    #[error("invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

/// Uptrend screen hits for a resolved date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenResult {
    pub segment: MarketSegment,
    pub date: NaiveDate,
    pub hits: Vec<IndicatorSnapshot>,
}

/// Period change table for a resolved date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoversResult {
    pub segment: MarketSegment,
    pub date: NaiveDate,
    pub timeframe: Timeframe,
    pub changes: Vec<PeriodChange>,
}

pub struct QueryService {
    store: Arc<dyn MarketStore>,
    engine: IndicatorEngine,
    config: Config,
    cache: ResultCache,
}

impl QueryService {
    pub fn new(store: Arc<dyn MarketStore>, config: Config) -> Self {
        let cache = ResultCache::new(config.cache.ttl());
        Self {
            store,
            engine: IndicatorEngine::default(),
            config,
            cache,
        }
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn cached<T, F>(&self, key: String, compute: F) -> Result<T, QueryError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, QueryError>,
    {
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(key = %key, "result cache hit");
            return Ok(hit);
        }
        let value = compute()?;
        if let Err(e) = self.cache.put(&key, &value) {
            tracing::warn!(key = %key, error = %e, "failed to cache result");
        }
        Ok(value)
    }

    /// Most recent trading date of the segment at or before `requested`
    /// (today when `None`).
    pub fn resolve_date(&self, segment: MarketSegment, requested: Option<NaiveDate>) -> Result<NaiveDate, QueryError> {
        let on_or_before = requested.unwrap_or_else(|| chrono::Local::now().date_naive());
        self.store
            .latest_trading_date(segment, on_or_before)?
            .ok_or(QueryError::NoTradingDate { segment, on_or_before })
    }

    pub fn uptrend_screen(&self, segment: MarketSegment, date: Option<NaiveDate>) -> Result<ScreenResult, QueryError> {
        let date = self.resolve_date(segment, date)?;
        self.cached(format!("screen:{segment}:{date}"), || {
            Ok(ScreenResult {
                segment,
                date,
                hits: screen_date(self.store.as_ref(), segment, date, &self.config.screen)?,
            })
        })
    }

    /// `None` when the segment has no trading date to resolve to.
    pub fn sentiment(&self, segment: MarketSegment, date: Option<NaiveDate>) -> Result<Option<SentimentReading>, QueryError> {
        let date = match self.resolve_date(segment, date) {
            Ok(date) => date,
            Err(QueryError::NoTradingDate { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let window = self.config.sentiment.breadth_window_days;
        self.cached(format!("sentiment:{segment}:{date}"), || {
            Ok(compute_sentiment(self.store.as_ref(), segment, date, window)?)
        })
    }

    pub fn period_change(
        &self,
        segment: MarketSegment,
        date: Option<NaiveDate>,
        timeframe: Timeframe,
    ) -> Result<MoversResult, QueryError> {
        let date = self.resolve_date(segment, date)?;
        self.cached(format!("movers:{segment}:{date}:{timeframe}"), || {
            Ok(MoversResult {
                segment,
                date,
                timeframe,
                changes: segment_period_change(self.store.as_ref(), segment, date, timeframe)?,
            })
        })
    }

    /// Coarser bars of one symbol over `[start, end]`.
    ///
    /// Indicator values are computed from the bars themselves, with the
    /// configured lookback loaded ahead of `start`, so the result does not
    /// depend on which dates have been refreshed.
    pub fn aggregated_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        bucketing: Bucketing,
    ) -> Result<Vec<AggregatedBar>, QueryError> {
        if start > end {
            return Err(QueryError::InvalidRange { start, end });
        }
        let warmup_start = start - Duration::days(self.config.refresh.lookback_days);
        let history = self.store.symbol_bars(symbol, warmup_start, end)?;
        if history.is_empty() {
            return Err(QueryError::UnknownSymbol(symbol.to_string()));
        }
        let snapshots = self.engine.snapshots(&history);
        let in_range = history.partition_point(|b| b.date < start);
        Ok(aggregate_bars(&history[in_range..], &snapshots[in_range..], bucketing))
    }

    /// The snapshot stored for the symbol's latest trading date at or before
    /// `date`, computed from bars when that date has not been refreshed.
    pub fn latest_snapshot(&self, symbol: &str, date: Option<NaiveDate>) -> Result<IndicatorSnapshot, QueryError> {
        let on_or_before = date.unwrap_or_else(|| chrono::Local::now().date_naive());
        let start = on_or_before - Duration::days(self.config.refresh.lookback_days);
        let bars = self.store.symbol_bars(symbol, start, on_or_before)?;
        let last = bars
            .last()
            .ok_or_else(|| QueryError::UnknownSymbol(symbol.to_string()))?;

        if let Some(stored) = self.store.snapshot(symbol, last.date)? {
            return Ok(stored);
        }
        self.engine
            .latest(&bars)
            .ok_or_else(|| QueryError::UnknownSymbol(symbol.to_string()))
    }

    pub fn breadth_history(
        &self,
        segment: MarketSegment,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BreadthPoint>, QueryError> {
        if start > end {
            return Err(QueryError::InvalidRange { start, end });
        }
        let window = self.config.sentiment.breadth_window_days;
        self.cached(format!("breadth:{segment}:{start}:{end}"), || {
            Ok(breadth_history(self.store.as_ref(), segment, start, end, window)?)
        })
    }

    /// Drops cached results for a segment, e.g. after a refresh.
    pub fn invalidate(&self, segment: MarketSegment) {
        for prefix in ["screen", "sentiment", "movers", "breadth"] {
            self.cache.invalidate_prefix(&format!("{prefix}:{segment}:"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breadthlab_core::data::{BarSink, MemoryStore, SnapshotStore};
    use breadthlab_core::domain::PriceBar;

    fn bar(symbol: &str, date: NaiveDate, close: f64) -> PriceBar {
        PriceBar {
            symbol: symbol.into(),
            segment: MarketSegment::Listed,
            date,
            open: Some(close),
            high: Some(close),
            low: Some(close),
            close: Some(close),
            volume: Some(10),
            turnover: Some(close * 10.0),
        }
    }

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn service() -> (Arc<MemoryStore>, QueryService) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_bars(&[bar("2330", d(3, 14), 100.0), bar("2330", d(3, 15), 101.0)])
            .unwrap();
        (store.clone(), QueryService::new(store, Config::default()))
    }

    #[test]
    fn resolve_date_walks_back_to_trading_day() {
        let (_, q) = service();
        assert_eq!(q.resolve_date(MarketSegment::Listed, Some(d(3, 17))).unwrap(), d(3, 15));
        assert_eq!(q.resolve_date(MarketSegment::Listed, Some(d(3, 15))).unwrap(), d(3, 15));
        assert!(matches!(
            q.resolve_date(MarketSegment::Listed, Some(d(3, 1))),
            Err(QueryError::NoTradingDate { .. })
        ));
        assert!(matches!(
            q.resolve_date(MarketSegment::Otc, Some(d(3, 17))),
            Err(QueryError::NoTradingDate { .. })
        ));
    }

    #[test]
    fn sentiment_without_trading_date_is_none() {
        let (_, q) = service();
        assert!(q.sentiment(MarketSegment::Otc, Some(d(3, 15))).unwrap().is_none());
        let r = q.sentiment(MarketSegment::Listed, Some(d(3, 16))).unwrap().unwrap();
        assert_eq!(r.date, d(3, 15));
        assert_eq!(r.advancers, 1);
    }

    #[test]
    fn cached_sentiment_survives_store_changes_until_invalidated() {
        let (store, q) = service();
        let before = q.sentiment(MarketSegment::Listed, Some(d(3, 15))).unwrap().unwrap();

        store.insert_bars(&[bar("1101", d(3, 14), 50.0), bar("1101", d(3, 15), 49.0)]).unwrap();
        let cached = q.sentiment(MarketSegment::Listed, Some(d(3, 15))).unwrap().unwrap();
        assert_eq!(cached, before);

        q.invalidate(MarketSegment::Listed);
        let fresh = q.sentiment(MarketSegment::Listed, Some(d(3, 15))).unwrap().unwrap();
        assert_eq!(fresh.universe_size, 2);
        assert_eq!(fresh.breadth, 0);
    }

    #[test]
    fn latest_snapshot_prefers_stored() {
        let (store, q) = service();
        let computed = q.latest_snapshot("2330", Some(d(3, 20))).unwrap();
        assert_eq!(computed.date, d(3, 15));
        assert!(computed.sma20.is_none());

        let mut stored = IndicatorSnapshot::empty("2330", MarketSegment::Listed, d(3, 15));
        stored.rsi14 = Some(42.0);
        store.upsert_snapshot(&stored).unwrap();
        assert_eq!(q.latest_snapshot("2330", Some(d(3, 20))).unwrap(), stored);

        assert!(matches!(q.latest_snapshot("9999", Some(d(3, 20))), Err(QueryError::UnknownSymbol(_))));
    }

    #[test]
    fn aggregated_bars_clip_to_range() {
        let (_, q) = service();
        let agg = q
            .aggregated_bars("2330", d(3, 15), d(3, 15), Bucketing::Fixed(5))
            .unwrap();
        assert_eq!(agg.len(), 1);
        assert_eq!(agg[0].bar_count, 1);
        assert_eq!(agg[0].close, Some(101.0));
        assert!(matches!(
            q.aggregated_bars("2330", d(3, 16), d(3, 15), Bucketing::Fixed(5)),
            Err(QueryError::InvalidRange { .. })
        ));
    }
}
