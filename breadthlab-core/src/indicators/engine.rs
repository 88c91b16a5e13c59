//! Indicator engine: composes the series primitives into one symbol's
//! full indicator set.
//!
//! The engine is a pure function of the bar window it is handed: no shared
//! state, no I/O. Computing the same window twice yields identical output,
//! which is what makes the daily refresh idempotent.

use serde::{Deserialize, Serialize};

use super::bollinger::bands;
use super::ez::distance;
use super::macd::macd_series;
use super::rsi::rsi_of_series;
use super::{closes, turnovers, Cci, Indicator, Mfi};
use crate::domain::{IndicatorSnapshot, PriceBar};
use crate::series::{rolling_mean, rolling_std_dev};

/// Periods used by the engine. Defaults are the published snapshot columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub cci_period: usize,
    pub mfi_period: usize,
    pub turnover_period: usize,
    pub sma_short: usize,
    pub sma_mid: usize,
    pub sma_long: usize,
    pub band_multiplier: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            cci_period: 20,
            mfi_period: 14,
            turnover_period: 10,
            sma_short: 20,
            sma_mid: 50,
            sma_long: 200,
            band_multiplier: 2.0,
        }
    }
}

impl IndicatorParams {
    /// Minimum number of bars before every indicator can produce a value.
    pub fn warmup_bars(&self) -> usize {
        [
            self.rsi_period + 1,
            self.macd_slow + self.macd_signal - 1,
            self.cci_period,
            self.mfi_period + 1,
            self.turnover_period,
            self.sma_long,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Full per-bar indicator output for one symbol, aligned with its bars.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSeries {
    pub close: Vec<Option<f64>>,
    pub rsi14: Vec<Option<f64>>,
    pub macd: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub macd_hist: Vec<Option<f64>>,
    pub cci20: Vec<Option<f64>>,
    pub mfi14: Vec<Option<f64>>,
    pub turnover10: Vec<Option<f64>>,
    pub sma20: Vec<Option<f64>>,
    pub sma50: Vec<Option<f64>>,
    pub sma200: Vec<Option<f64>>,
    pub stddev20: Vec<Option<f64>>,
    pub upper_band20: Vec<Option<f64>>,
    pub lower_band20: Vec<Option<f64>>,
    pub ez: Vec<Option<f64>>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Values at bar `i`, in snapshot column order.
    fn values_at(&self, i: usize) -> [Option<f64>; 15] {
        [
            self.close[i],
            self.rsi14[i],
            self.macd[i],
            self.macd_signal[i],
            self.macd_hist[i],
            self.cci20[i],
            self.mfi14[i],
            self.turnover10[i],
            self.sma20[i],
            self.sma50[i],
            self.sma200[i],
            self.stddev20[i],
            self.upper_band20[i],
            self.lower_band20[i],
            self.ez[i],
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    /// Compute every indicator for every bar of a date-ordered series.
    pub fn compute_series(&self, bars: &[PriceBar]) -> IndicatorSeries {
        let p = &self.params;
        let close = closes(bars);

        let lines = macd_series(&close, p.macd_fast, p.macd_slow, p.macd_signal);
        let sma20 = rolling_mean(&close, p.sma_short);
        let stddev20 = rolling_std_dev(&close, p.sma_short);
        let (upper_band20, lower_band20) = bands(&sma20, &stddev20, p.band_multiplier);
        let ez = distance(&close, &sma20);

        IndicatorSeries {
            rsi14: rsi_of_series(&close, p.rsi_period),
            macd: lines.macd,
            macd_signal: lines.signal,
            macd_hist: lines.hist,
            cci20: Cci::new(p.cci_period).compute(bars),
            mfi14: Mfi::new(p.mfi_period).compute(bars),
            turnover10: rolling_mean(&turnovers(bars), p.turnover_period),
            sma50: rolling_mean(&close, p.sma_mid),
            sma200: rolling_mean(&close, p.sma_long),
            sma20,
            stddev20,
            upper_band20,
            lower_band20,
            ez,
            close,
        }
    }

    /// Snapshot for bar `i` of a previously computed series.
    pub fn snapshot_at(bars: &[PriceBar], series: &IndicatorSeries, i: usize) -> Option<IndicatorSnapshot> {
        let bar = bars.get(i)?;
        if i >= series.len() {
            return None;
        }
        Some(IndicatorSnapshot::from_values(
            bar.symbol.clone(),
            bar.segment,
            bar.date,
            series.values_at(i),
        ))
    }

    /// Snapshot for the last bar of the window; `None` for an empty window.
    ///
    /// A short window still yields a snapshot, with the indicators that need
    /// more history left as `None`.
    pub fn latest(&self, bars: &[PriceBar]) -> Option<IndicatorSnapshot> {
        let last = bars.len().checked_sub(1)?;
        let series = self.compute_series(bars);
        Self::snapshot_at(bars, &series, last)
    }

    /// Snapshots for every bar of the window.
    pub fn snapshots(&self, bars: &[PriceBar]) -> Vec<IndicatorSnapshot> {
        let series = self.compute_series(bars);
        (0..bars.len())
            .filter_map(|i| Self::snapshot_at(bars, &series, i))
            .collect()
    }
}
