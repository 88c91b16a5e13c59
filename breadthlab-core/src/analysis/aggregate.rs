//! Multi-day bar aggregation and trading-day-offset change.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::data::{BarSource, DataError};
use crate::domain::{IndicatorSnapshot, MarketSegment, PriceBar};

/// Calendar timeframe of a bucket or a change period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Day,
    Week,
    Month,
    Quarter,
}

#[derive(Debug, Error)]
#[error("unknown timeframe '{0}' (expected day, week, month or quarter)")]
pub struct TimeframeParseError(pub String);

impl Timeframe {
    /// Trading rows spanned by one period of this timeframe.
    pub fn trading_offset(&self) -> usize {
        match self {
            Timeframe::Day => 1,
            Timeframe::Week => 5,
            Timeframe::Month => 21,
            Timeframe::Quarter => 63,
        }
    }

    /// First calendar day of the bucket containing `date`.
    ///
    /// Weeks are ISO weeks starting on Monday.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Timeframe::Day => date,
            Timeframe::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            Timeframe::Month => date.with_day(1).unwrap_or(date),
            Timeframe::Quarter => {
                let month = (date.month0() / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
            }
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Quarter => "quarter",
        };
        f.write_str(s)
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "d" | "daily" => Ok(Timeframe::Day),
            "week" | "w" | "weekly" => Ok(Timeframe::Week),
            "month" | "m" | "monthly" => Ok(Timeframe::Month),
            "quarter" | "q" | "quarterly" => Ok(Timeframe::Quarter),
            other => Err(TimeframeParseError(other.to_string())),
        }
    }
}

/// How daily bars are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucketing {
    /// `n` consecutive rows per bucket, counted from the oldest bar.
    Fixed(usize),
    Calendar(Timeframe),
}

/// A synthetic multi-day bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedBar {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
    pub turnover: Option<f64>,
    pub bar_count: usize,
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
    pub ez: Option<f64>,
}

fn fold_opt<T: Copy>(values: impl Iterator<Item = Option<T>>, f: impl Fn(T, T) -> T) -> Option<T> {
    values.flatten().reduce(f)
}

fn aggregate_bucket(bars: &[&PriceBar], indicators: &HashMap<NaiveDate, &IndicatorSnapshot>) -> Option<AggregatedBar> {
    let first = bars.first()?;
    let last = bars.last()?;
    let last_snapshot = indicators.get(&last.date);

    Some(AggregatedBar {
        start_date: first.date,
        end_date: last.date,
        open: bars.iter().find_map(|b| b.open),
        high: fold_opt(bars.iter().map(|b| b.high), f64::max),
        low: fold_opt(bars.iter().map(|b| b.low), f64::min),
        close: bars.iter().rev().find_map(|b| b.close),
        volume: fold_opt(bars.iter().map(|b| b.volume), |a: u64, b: u64| a.saturating_add(b)),
        turnover: fold_opt(bars.iter().map(|b| b.turnover), |a, b| a + b),
        bar_count: bars.len(),
        sma20: last_snapshot.and_then(|s| s.sma20),
        sma50: last_snapshot.and_then(|s| s.sma50),
        sma200: last_snapshot.and_then(|s| s.sma200),
        ez: last_snapshot.and_then(|s| s.ez),
    })
}

/// Group one symbol's bars into coarser bars.
///
/// `bars` are sorted by date first. Indicator fields come from the snapshot
/// of each bucket's last bar, matched by date; a bucket whose last bar has
/// no snapshot carries no indicator values. `Fixed(0)` yields nothing.
pub fn aggregate_bars(
    bars: &[PriceBar],
    snapshots: &[IndicatorSnapshot],
    bucketing: Bucketing,
) -> Vec<AggregatedBar> {
    let mut sorted: Vec<&PriceBar> = bars.iter().collect();
    sorted.sort_by_key(|b| b.date);
    let indicators: HashMap<NaiveDate, &IndicatorSnapshot> =
        snapshots.iter().map(|s| (s.date, s)).collect();

    let buckets: Vec<Vec<&PriceBar>> = match bucketing {
        Bucketing::Fixed(0) => Vec::new(),
        Bucketing::Fixed(n) => sorted.chunks(n).map(<[&PriceBar]>::to_vec).collect(),
        Bucketing::Calendar(tf) => {
            let mut out: Vec<Vec<&PriceBar>> = Vec::new();
            let mut current: Option<NaiveDate> = None;
            for bar in sorted {
                let key = tf.bucket_start(bar.date);
                match out.last_mut() {
                    Some(bucket) if current == Some(key) => bucket.push(bar),
                    _ => {
                        out.push(vec![bar]);
                        current = Some(key);
                    }
                }
            }
            out
        }
    };

    buckets
        .iter()
        .filter_map(|bucket| aggregate_bucket(bucket, &indicators))
        .collect()
}

/// Percentage change of one symbol over a trading-day offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodChange {
    pub symbol: String,
    pub close: Option<f64>,
    pub past_date: Option<NaiveDate>,
    pub past_close: Option<f64>,
    pub change_pct: Option<f64>,
}

fn by_change_desc(a: &PeriodChange, b: &PeriodChange) -> Ordering {
    let order = match (a.change_pct, b.change_pct) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    order.then_with(|| a.symbol.cmp(&b.symbol))
}

/// Change of every symbol trading on `date` against its close `offset`
/// trading rows earlier.
///
/// Rows are the distinct dates present in `bars` at or before `date`. The
/// past date is found by position in that list, not by calendar arithmetic.
/// Results are sorted by change descending, missing changes last.
pub fn period_change(bars: &[PriceBar], date: NaiveDate, offset: usize) -> Vec<PeriodChange> {
    let dates: BTreeSet<NaiveDate> = bars.iter().map(|b| b.date).filter(|d| *d <= date).collect();
    let past_date = dates.iter().rev().nth(offset).copied();

    let closes: HashMap<(&str, NaiveDate), Option<f64>> = bars
        .iter()
        .map(|b| ((b.symbol.as_str(), b.date), b.close))
        .collect();

    let mut out: Vec<PeriodChange> = bars
        .iter()
        .filter(|b| b.date == date)
        .map(|bar| {
            let past_close = past_date
                .and_then(|d| closes.get(&(bar.symbol.as_str(), d)).copied())
                .flatten();
            let change_pct = match (bar.close, past_close) {
                (Some(close), Some(past)) if past > 0.0 => Some((close - past) / past * 100.0),
                _ => None,
            };
            PeriodChange {
                symbol: bar.symbol.clone(),
                close: bar.close,
                past_date,
                past_close,
                change_pct,
            }
        })
        .collect();
    out.sort_by(by_change_desc);
    out
}

/// [`period_change`] over a segment, reading enough history from the store.
pub fn segment_period_change<S>(
    store: &S,
    segment: MarketSegment,
    date: NaiveDate,
    timeframe: Timeframe,
) -> Result<Vec<PeriodChange>, DataError>
where
    S: BarSource + ?Sized,
{
    let offset = timeframe.trading_offset();
    // two calendar days per trading row covers weekends and holidays
    let start = date - Duration::days(offset as i64 * 2 + 14);
    let bars = store.segment_bars(segment, start, date)?;
    Ok(period_change(&bars, date, offset))
}
