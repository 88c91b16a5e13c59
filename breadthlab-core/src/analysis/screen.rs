//! Uptrend screen over a date's snapshots.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::data::{DataError, SnapshotStore};
use crate::domain::{IndicatorSnapshot, MarketSegment};

/// Thresholds of the uptrend screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenCriteria {
    pub min_turnover10: f64,
    pub rsi_min: f64,
    pub rsi_max: f64,
    pub min_macd_hist: f64,
}

impl Default for ScreenCriteria {
    fn default() -> Self {
        Self {
            min_turnover10: 1_500_000.0,
            rsi_min: 60.0,
            rsi_max: 70.0,
            min_macd_hist: 0.0,
        }
    }
}

impl ScreenCriteria {
    /// Liquidity, momentum band, non-negative histogram and a strictly
    /// rising moving-average stack under the close. Any missing field fails.
    pub fn qualifies(&self, s: &IndicatorSnapshot) -> bool {
        let (Some(turnover), Some(rsi), Some(hist)) = (s.turnover10, s.rsi14, s.macd_hist) else {
            return false;
        };
        let (Some(close), Some(sma20), Some(sma50), Some(sma200)) = (s.close, s.sma20, s.sma50, s.sma200)
        else {
            return false;
        };
        turnover >= self.min_turnover10
            && (self.rsi_min..=self.rsi_max).contains(&rsi)
            && hist >= self.min_macd_hist
            && close > sma20
            && sma20 > sma50
            && sma50 > sma200
    }
}

/// EZ ascending (missing last), then symbol.
fn by_ez_then_symbol(a: &IndicatorSnapshot, b: &IndicatorSnapshot) -> Ordering {
    let ez = match (a.ez, b.ez) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    ez.then_with(|| a.symbol.cmp(&b.symbol))
}

/// Qualifying snapshots, ordered by EZ ascending then symbol.
pub fn uptrend_screen(snapshots: &[IndicatorSnapshot], criteria: &ScreenCriteria) -> Vec<IndicatorSnapshot> {
    let mut hits: Vec<IndicatorSnapshot> = snapshots
        .iter()
        .filter(|s| criteria.qualifies(s))
        .cloned()
        .collect();
    hits.sort_by(by_ez_then_symbol);
    hits
}

/// Run the screen over the snapshots stored for a segment and date.
///
/// A date without snapshots yields an empty screen.
pub fn screen_date<S>(
    store: &S,
    segment: MarketSegment,
    date: NaiveDate,
    criteria: &ScreenCriteria,
) -> Result<Vec<IndicatorSnapshot>, DataError>
where
    S: SnapshotStore + ?Sized,
{
    Ok(uptrend_screen(&store.snapshots_on(segment, date)?, criteria))
}
