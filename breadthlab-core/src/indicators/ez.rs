//! EZ distance: percentage distance of close from its SMA.
//!
//! EZ = 100 * (close - SMA(close, period)) / SMA(close, period)
//! Lookback: period - 1.
//! Edge case: SMA == 0 → None.

use super::{closes, Indicator};
use crate::domain::PriceBar;
use crate::series::rolling_mean;

#[derive(Debug, Clone)]
pub struct EzDistance {
    period: usize,
    name: String,
}

impl EzDistance {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EZ period must be >= 1");
        Self {
            period,
            name: format!("ez_{period}"),
        }
    }
}

impl Indicator for EzDistance {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<Option<f64>> {
        let close = closes(bars);
        let sma = rolling_mean(&close, self.period);
        distance(&close, &sma)
    }
}

/// Percentage distance of each value from its reference.
pub fn distance(values: &[Option<f64>], reference: &[Option<f64>]) -> Vec<Option<f64>> {
    values
        .iter()
        .zip(reference)
        .map(|(v, r)| {
            let (v, r) = ((*v)?, (*r)?);
            if r == 0.0 {
                return None;
            }
            Some(100.0 * (v - r) / r)
        })
        .collect()
}
