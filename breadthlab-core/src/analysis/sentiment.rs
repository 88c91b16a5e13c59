//! Market breadth composite.
//!
//! Six one-point sub-scores over a segment's universe on a date, summed into
//! a 0–6 score and classified into a [`Regime`]. An empty universe has no
//! reading at all rather than a zero score.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::data::{BarSource, DataError, SnapshotStore};
use crate::domain::{MarketSegment, PriceBar};

/// Trailing calendar window of the breadth line.
pub const DEFAULT_BREADTH_WINDOW_DAYS: i64 = 90;

/// Extra calendar days read before a window so the first day of the window
/// still finds each symbol's previous close.
const PREVIOUS_CLOSE_SLACK_DAYS: i64 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Defense,
    Selective,
    Attack,
}

impl Regime {
    /// 0–2 Defense, 3–4 Selective, 5–6 Attack.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=2 => Regime::Defense,
            3..=4 => Regime::Selective,
            _ => Regime::Attack,
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Regime::Defense => "Defense",
            Regime::Selective => "Selective",
            Regime::Attack => "Attack",
        };
        f.write_str(label)
    }
}

/// Per-symbol inputs to the composite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolReading {
    pub symbol: String,
    /// Close vs the symbol's previous trading close, in percent.
    pub change_pct: Option<f64>,
    pub ez: Option<f64>,
    pub rsi14: Option<f64>,
    pub macd_hist: Option<f64>,
    pub cci20: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScores {
    pub breadth_positive: bool,
    pub breadth_line_positive: bool,
    pub ez_majority: bool,
    pub rsi_majority: bool,
    pub macd_majority: bool,
    pub cci_majority: bool,
}

impl SubScores {
    pub fn total(&self) -> u8 {
        [
            self.breadth_positive,
            self.breadth_line_positive,
            self.ez_majority,
            self.rsi_majority,
            self.macd_majority,
            self.cci_majority,
        ]
        .iter()
        .filter(|b| **b)
        .count() as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub segment: MarketSegment,
    pub date: NaiveDate,
    pub universe_size: usize,
    pub advancers: usize,
    pub decliners: usize,
    pub breadth: i64,
    pub breadth_line: i64,
    /// Share of the universe with `ez > 0`, in percent.
    pub ez_positive_pct: f64,
    pub rsi_above_50_pct: f64,
    pub macd_positive_pct: f64,
    pub cci_positive_pct: f64,
    pub sub_scores: SubScores,
    pub score: u8,
    pub regime: Regime,
}

/// One point of the advance/decline line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreadthPoint {
    pub date: NaiveDate,
    pub breadth: i64,
    pub breadth_line: i64,
}

/// Advancers minus decliners; unchanged and unknown changes count for neither.
pub fn daily_breadth<'a>(changes: impl IntoIterator<Item = &'a Option<f64>>) -> i64 {
    changes.into_iter().flatten().fold(0, |acc, c| {
        if *c > 0.0 {
            acc + 1
        } else if *c < 0.0 {
            acc - 1
        } else {
            acc
        }
    })
}

fn positive_pct(readings: &[SymbolReading], test: impl Fn(&SymbolReading) -> bool) -> (usize, f64) {
    let count = readings.iter().filter(|r| test(r)).count();
    (count, count as f64 * 100.0 / readings.len() as f64)
}

/// Score a universe already loaded in memory.
///
/// Percentages use the whole universe as denominator; a missing value counts
/// as "not above". Returns `None` for an empty universe.
pub fn score_universe(
    segment: MarketSegment,
    date: NaiveDate,
    readings: &[SymbolReading],
    breadth_line: i64,
) -> Option<SentimentReading> {
    if readings.is_empty() {
        return None;
    }
    let n = readings.len();
    let above = |v: Option<f64>, level: f64| v.is_some_and(|x| x > level);

    let advancers = readings.iter().filter(|r| above(r.change_pct, 0.0)).count();
    let decliners = readings.iter().filter(|r| r.change_pct.is_some_and(|c| c < 0.0)).count();
    let breadth = advancers as i64 - decliners as i64;

    let (ez_n, ez_pct) = positive_pct(readings, |r| above(r.ez, 0.0));
    let (rsi_n, rsi_pct) = positive_pct(readings, |r| above(r.rsi14, 50.0));
    let (macd_n, macd_pct) = positive_pct(readings, |r| above(r.macd_hist, 0.0));
    let (cci_n, cci_pct) = positive_pct(readings, |r| above(r.cci20, 0.0));
    let majority = |count: usize| count * 2 > n;

    let sub_scores = SubScores {
        breadth_positive: breadth > 0,
        breadth_line_positive: breadth_line > 0,
        ez_majority: majority(ez_n),
        rsi_majority: majority(rsi_n),
        macd_majority: majority(macd_n),
        cci_majority: majority(cci_n),
    };
    let score = sub_scores.total();

    Some(SentimentReading {
        segment,
        date,
        universe_size: n,
        advancers,
        decliners,
        breadth,
        breadth_line,
        ez_positive_pct: ez_pct,
        rsi_above_50_pct: rsi_pct,
        macd_positive_pct: macd_pct,
        cci_positive_pct: cci_pct,
        sub_scores,
        score,
        regime: Regime::from_score(score),
    })
}

/// Day-over-day change of every symbol, keyed by date.
///
/// The change on a bar is measured against the symbol's previous bar in
/// `bars`; it is `None` when either close is missing or the previous close
/// is not positive. A symbol's first bar has no entry.
pub fn daily_changes(bars: &[PriceBar]) -> BTreeMap<NaiveDate, Vec<(String, Option<f64>)>> {
    let mut by_symbol: BTreeMap<&str, Vec<&PriceBar>> = BTreeMap::new();
    for bar in bars {
        by_symbol.entry(bar.symbol.as_str()).or_default().push(bar);
    }

    let mut changes: BTreeMap<NaiveDate, Vec<(String, Option<f64>)>> = BTreeMap::new();
    for (symbol, mut series) in by_symbol {
        series.sort_by_key(|b| b.date);
        for pair in series.windows(2) {
            let change = match (pair[0].close, pair[1].close) {
                (Some(prev), Some(close)) if prev > 0.0 => Some((close - prev) / prev * 100.0),
                _ => None,
            };
            changes
                .entry(pair[1].date)
                .or_default()
                .push((symbol.to_string(), change));
        }
    }
    changes
}

/// Running breadth line for each date of `daily`, summing the breadth of
/// dates in `(date - window_days, date]`.
fn breadth_lines(daily: &BTreeMap<NaiveDate, i64>, window_days: i64) -> BTreeMap<NaiveDate, i64> {
    daily
        .keys()
        .map(|&date| {
            let from = date - Duration::days(window_days);
            let line = daily
                .range(from..=date)
                .filter(|(d, _)| **d > from)
                .map(|(_, b)| *b)
                .sum();
            (date, line)
        })
        .collect()
}

fn breadth_by_date(changes: &BTreeMap<NaiveDate, Vec<(String, Option<f64>)>>) -> BTreeMap<NaiveDate, i64> {
    changes
        .iter()
        .map(|(date, day)| (*date, daily_breadth(day.iter().map(|(_, c)| c))))
        .collect()
}

/// Sentiment of a segment on a date, read from the stores.
///
/// The universe is every symbol with a bar on `date`; symbols without a
/// stored snapshot contribute `None` indicator values.
pub fn compute_sentiment<S>(
    store: &S,
    segment: MarketSegment,
    date: NaiveDate,
    window_days: i64,
) -> Result<Option<SentimentReading>, DataError>
where
    S: BarSource + SnapshotStore + ?Sized,
{
    let start = date - Duration::days(window_days + PREVIOUS_CLOSE_SLACK_DAYS);
    let bars = store.segment_bars(segment, start, date)?;

    let universe: Vec<&str> = bars
        .iter()
        .filter(|b| b.date == date)
        .map(|b| b.symbol.as_str())
        .collect();
    if universe.is_empty() {
        return Ok(None);
    }

    let changes = daily_changes(&bars);
    let lines = breadth_lines(&breadth_by_date(&changes), window_days);
    let breadth_line = lines.get(&date).copied().unwrap_or(0);

    let today: HashMap<&str, Option<f64>> = changes
        .get(&date)
        .map(|day| day.iter().map(|(s, c)| (s.as_str(), *c)).collect())
        .unwrap_or_default();
    let snapshots: HashMap<String, _> = store
        .snapshots_on(segment, date)?
        .into_iter()
        .map(|s| (s.symbol.clone(), s))
        .collect();

    let readings: Vec<SymbolReading> = universe
        .into_iter()
        .map(|symbol| {
            let snap = snapshots.get(symbol);
            SymbolReading {
                symbol: symbol.to_string(),
                change_pct: today.get(symbol).copied().flatten(),
                ez: snap.and_then(|s| s.ez),
                rsi14: snap.and_then(|s| s.rsi14),
                macd_hist: snap.and_then(|s| s.macd_hist),
                cci20: snap.and_then(|s| s.cci20),
            }
        })
        .collect();

    Ok(score_universe(segment, date, &readings, breadth_line))
}

/// Daily breadth and breadth line for every trading date in `[start, end]`.
pub fn breadth_history<S>(
    store: &S,
    segment: MarketSegment,
    start: NaiveDate,
    end: NaiveDate,
    window_days: i64,
) -> Result<Vec<BreadthPoint>, DataError>
where
    S: BarSource + ?Sized,
{
    let from = start - Duration::days(window_days + PREVIOUS_CLOSE_SLACK_DAYS);
    let bars = store.segment_bars(segment, from, end)?;
    let daily = breadth_by_date(&daily_changes(&bars));
    let lines = breadth_lines(&daily, window_days);

    Ok(daily
        .range(start..=end)
        .map(|(date, breadth)| BreadthPoint {
            date: *date,
            breadth: *breadth,
            breadth_line: lines.get(date).copied().unwrap_or(0),
        })
        .collect())
}
