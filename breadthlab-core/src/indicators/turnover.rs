//! Average daily turnover (traded value) over a rolling window.
//!
//! Lookback: period - 1. A day without published turnover restarts the window.

use super::{turnovers, Indicator};
use crate::domain::PriceBar;
use crate::series::rolling_mean;

#[derive(Debug, Clone)]
pub struct TurnoverAverage {
    period: usize,
    name: String,
}

impl TurnoverAverage {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "turnover period must be >= 1");
        Self {
            period,
            name: format!("turnover_{period}"),
        }
    }
}

impl Indicator for TurnoverAverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<Option<f64>> {
        rolling_mean(&turnovers(bars), self.period)
    }
}
