//! IndicatorSnapshot: the canonical per-(symbol, date) indicator record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::MarketSegment;

/// Indicator values computed for one symbol as of one trading date.
///
/// Every value is independently nullable: `None` means the lookback window
/// did not hold enough contiguous history for that indicator, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub segment: MarketSegment,
    pub date: NaiveDate,
    pub close: Option<f64>,
    pub rsi14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub cci20: Option<f64>,
    pub mfi14: Option<f64>,
    pub turnover10: Option<f64>,
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
    pub stddev20: Option<f64>,
    pub upper_band20: Option<f64>,
    pub lower_band20: Option<f64>,
    pub ez: Option<f64>,
}

/// Column names of the indicator values, in storage order.
pub const VALUE_COLUMNS: [&str; 15] = [
    "close",
    "rsi14",
    "macd",
    "macd_signal",
    "macd_hist",
    "cci20",
    "mfi14",
    "turnover10",
    "sma20",
    "sma50",
    "sma200",
    "stddev20",
    "upper_band20",
    "lower_band20",
    "ez",
];

impl IndicatorSnapshot {
    /// A snapshot with every indicator absent.
    pub fn empty(symbol: impl Into<String>, segment: MarketSegment, date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            segment,
            date,
            close: None,
            rsi14: None,
            macd: None,
            macd_signal: None,
            macd_hist: None,
            cci20: None,
            mfi14: None,
            turnover10: None,
            sma20: None,
            sma50: None,
            sma200: None,
            stddev20: None,
            upper_band20: None,
            lower_band20: None,
            ez: None,
        }
    }

    /// Values in [`VALUE_COLUMNS`] order.
    pub fn values(&self) -> [Option<f64>; 15] {
        [
            self.close,
            self.rsi14,
            self.macd,
            self.macd_signal,
            self.macd_hist,
            self.cci20,
            self.mfi14,
            self.turnover10,
            self.sma20,
            self.sma50,
            self.sma200,
            self.stddev20,
            self.upper_band20,
            self.lower_band20,
            self.ez,
        ]
    }

    /// Rebuild a snapshot from values in [`VALUE_COLUMNS`] order.
    pub fn from_values(
        symbol: impl Into<String>,
        segment: MarketSegment,
        date: NaiveDate,
        v: [Option<f64>; 15],
    ) -> Self {
        Self {
            symbol: symbol.into(),
            segment,
            date,
            close: v[0],
            rsi14: v[1],
            macd: v[2],
            macd_signal: v[3],
            macd_hist: v[4],
            cci20: v[5],
            mfi14: v[6],
            turnover10: v[7],
            sma20: v[8],
            sma50: v[9],
            sma200: v[10],
            stddev20: v[11],
            upper_band20: v[12],
            lower_band20: v[13],
            ez: v[14],
        }
    }

    /// True when no indicator could be computed (close aside).
    pub fn is_all_none(&self) -> bool {
        self.values()[1..].iter().all(Option::is_none)
    }
}
