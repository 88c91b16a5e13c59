//! Concrete indicator implementations.
//!
//! Every indicator implements [`Indicator`]: a pure function from one symbol's
//! bar history to a nullable output series of the same length. The
//! [`IndicatorEngine`] composes them into an [`IndicatorSnapshot`].
//!
//! Multi-series indicators (Bollinger, MACD) are exposed as separate named
//! instances per line, keeping the single-series trait unchanged.
//!
//! [`IndicatorSnapshot`]: crate::domain::IndicatorSnapshot

pub mod bollinger;
pub mod cci;
pub mod engine;
pub mod ez;
pub mod macd;
pub mod mfi;
pub mod moving_average;
pub mod rsi;
pub mod turnover;

pub use bollinger::{Bollinger, BollingerBand};
pub use cci::Cci;
pub use engine::{IndicatorEngine, IndicatorParams, IndicatorSeries};
pub use ez::EzDistance;
pub use macd::{Macd, MacdLine};
pub use mfi::Mfi;
pub use moving_average::{Ema, Sma, StdDev};
pub use rsi::Rsi;
pub use turnover::TurnoverAverage;

use crate::domain::PriceBar;

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No output value at bar t may depend on data from bar t+1 or later.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "rsi_14").
    fn name(&self) -> &str;

    /// Number of bars that precede the first possible value.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    ///
    /// Returns a vector of the same length as `bars`; `None` where history
    /// is insufficient.
    fn compute(&self, bars: &[PriceBar]) -> Vec<Option<f64>>;
}

pub(crate) fn closes(bars: &[PriceBar]) -> Vec<Option<f64>> {
    bars.iter().map(|b| b.close).collect()
}

pub(crate) fn typical_prices(bars: &[PriceBar]) -> Vec<Option<f64>> {
    bars.iter().map(PriceBar::typical_price).collect()
}

pub(crate) fn turnovers(bars: &[PriceBar]) -> Vec<Option<f64>> {
    bars.iter().map(|b| b.turnover).collect()
}

/// Create synthetic bars from close prices for testing.
///
/// open = prev_close (or close for the first bar), high = max(open,close) + 1,
/// low = min(open,close) - 1, volume = 1000, turnover = close * volume.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
    use crate::domain::MarketSegment;
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                symbol: "TEST".to_string(),
                segment: MarketSegment::Listed,
                date: base_date + chrono::Duration::days(i as i64),
                open: Some(open),
                high: Some(open.max(close) + 1.0),
                low: Some(open.min(close) - 1.0),
                close: Some(close),
                volume: Some(1000),
                turnover: Some(close * 1000.0),
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
