//! End-to-end: CSV import, refresh, then every query through the facade.

use std::sync::Arc;
use std::time::Duration;

use breadthlab_core::analysis::{Bucketing, Regime, Timeframe};
use breadthlab_core::data::{
    import_csv, BarSink, BarSource, MarketStore, ParquetStore, SnapshotStore, SyntheticConfig, SyntheticUniverse,
};
use breadthlab_core::domain::{MarketSegment, PriceBar};
use breadthlab_runner::export::{export_breadth_csv, export_changes_csv, export_json, export_sentiment_csv, export_snapshots_csv};
use breadthlab_runner::{Config, QueryError, QueryService, RefreshJob, ResultCache};
use chrono::NaiveDate;

fn to_csv(bars: &[PriceBar]) -> String {
    let mut out = String::from("symbol,segment,date,open,high,low,close,volume,turnover\n");
    let cell = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}\n",
            b.symbol,
            b.segment,
            b.date,
            cell(b.open),
            cell(b.high),
            cell(b.low),
            cell(b.close),
            b.volume.map(|v| v.to_string()).unwrap_or_default(),
            cell(b.turnover),
        ));
    }
    out
}

fn setup() -> (tempfile::TempDir, Arc<dyn MarketStore>, NaiveDate) {
    let u = SyntheticUniverse::generate(&SyntheticConfig {
        listed_symbols: 12,
        otc_symbols: 4,
        trading_days: 260,
        gap_probability: 0.02,
        ..SyntheticConfig::default()
    });
    let last = u.last_date().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let parquet = Arc::new(ParquetStore::new(dir.path()));
    let report = import_csv(to_csv(u.bars()).as_bytes(), parquet.as_ref()).unwrap();
    assert_eq!(report.inserted, u.bars().len());
    assert_eq!(report.rejected, 0);
    let store: Arc<dyn MarketStore> = parquet;

    let config = Config::default();
    let job = RefreshJob::new(store.clone(), config.refresh.clone());
    for segment in MarketSegment::ALL {
        job.refresh(last, segment, None).unwrap();
    }
    (dir, store, last)
}

#[test]
fn queries_resolve_weekend_to_last_trading_day() {
    let (_dir, store, last) = setup();
    let q = QueryService::new(store, Config::default());
    let saturday = last + chrono::Duration::days(1);

    assert_eq!(q.resolve_date(MarketSegment::Listed, Some(saturday)).unwrap(), q.resolve_date(MarketSegment::Listed, Some(last)).unwrap());

    let screen = q.uptrend_screen(MarketSegment::Listed, Some(saturday)).unwrap();
    assert!(screen.date <= last);
    for hit in &screen.hits {
        let rsi = hit.rsi14.unwrap();
        assert!((60.0..=70.0).contains(&rsi));
        assert!(hit.macd_hist.unwrap() >= 0.0);
    }

    let reading = q.sentiment(MarketSegment::Listed, Some(saturday)).unwrap().unwrap();
    assert!(reading.universe_size <= 12);
    assert!(reading.score <= 6);
    assert_eq!(reading.regime, Regime::from_score(reading.score));
}

#[test]
fn movers_and_history_and_bars() {
    let (_dir, store, last) = setup();
    let q = QueryService::new(store, Config::default());

    let movers = q.period_change(MarketSegment::Otc, Some(last), Timeframe::Month).unwrap();
    let known: Vec<f64> = movers.changes.iter().filter_map(|c| c.change_pct).collect();
    assert!(known.windows(2).all(|w| w[0] >= w[1]));

    let history = q
        .breadth_history(MarketSegment::Listed, last - chrono::Duration::days(30), last)
        .unwrap();
    assert!(!history.is_empty());
    assert!(history.windows(2).all(|w| w[0].date < w[1].date));
    let csv = export_breadth_csv(&history).unwrap();
    assert_eq!(csv.lines().count(), history.len() + 1);

    let weekly = q
        .aggregated_bars("1101", last - chrono::Duration::days(90), last, Bucketing::Calendar(Timeframe::Week))
        .unwrap();
    assert!(weekly.len() >= 12);
    assert!(weekly.iter().all(|b| b.bar_count <= 5));
    assert!(weekly.last().unwrap().sma20.is_some());

    assert!(matches!(
        q.aggregated_bars("0000", last, last, Bucketing::Fixed(5)),
        Err(QueryError::UnknownSymbol(_))
    ));
}

#[test]
fn refreshed_snapshot_is_served() {
    let (_dir, store, last) = setup();
    let q = QueryService::new(store.clone(), Config::default());
    // every symbol trading on the refresh date got a snapshot
    let traded = store.symbols_on(MarketSegment::Listed, last).unwrap();
    assert!(!traded.is_empty());
    for symbol in &traded {
        let stored = store
            .snapshot(symbol, last)
            .unwrap()
            .unwrap_or_else(|| panic!("no snapshot stored for {symbol}"));
        assert_eq!(q.latest_snapshot(symbol, Some(last)).unwrap(), stored);
    }
}

#[test]
fn expired_cache_entries_are_recomputed() {
    let (_dir, store, last) = setup();
    let q = QueryService::new(store.clone(), Config::default()).with_cache(ResultCache::new(Duration::ZERO));

    let before = q.sentiment(MarketSegment::Otc, Some(last)).unwrap().unwrap();
    let extra = PriceBar {
        symbol: "6999".into(),
        segment: MarketSegment::Otc,
        date: last,
        open: Some(10.0),
        high: Some(10.0),
        low: Some(10.0),
        close: Some(10.0),
        volume: Some(1),
        turnover: Some(10.0),
    };
    store.insert_bars(&[extra]).unwrap();

    let after = q.sentiment(MarketSegment::Otc, Some(last)).unwrap().unwrap();
    assert_eq!(after.universe_size, before.universe_size + 1);
}

#[test]
fn exports_render_query_results() {
    let (_dir, store, last) = setup();
    let q = QueryService::new(store, Config::default());

    let reading = q.sentiment(MarketSegment::Listed, Some(last)).unwrap().unwrap();
    let csv = export_sentiment_csv(&[reading.clone()]).unwrap();
    assert!(csv.trim_end().ends_with(&format!(",{},{}", reading.score, reading.regime)));

    let movers = q.period_change(MarketSegment::Listed, Some(last), Timeframe::Week).unwrap();
    let csv = export_changes_csv(&movers.changes).unwrap();
    assert_eq!(csv.lines().count(), movers.changes.len() + 1);

    let screen = q.uptrend_screen(MarketSegment::Listed, Some(last)).unwrap();
    assert!(export_snapshots_csv(&screen.hits).is_ok());
    assert!(export_json(&screen).unwrap().contains("\"hits\""));
}
