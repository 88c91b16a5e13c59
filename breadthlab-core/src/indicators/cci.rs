//! Commodity Channel Index (CCI) on typical price.
//!
//! CCI = (tp - SMA(tp, period)) / (0.015 * MAD(tp, period))
//! Lookback: period - 1.
//! Edge case: zero mean absolute deviation → None (never ±infinity).

use super::{typical_prices, Indicator};
use crate::domain::PriceBar;
use crate::series::{rolling_mean, rolling_mean_abs_deviation};

/// Lambert's scaling constant.
pub const CCI_CONSTANT: f64 = 0.015;

#[derive(Debug, Clone)]
pub struct Cci {
    period: usize,
    name: String,
}

impl Cci {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "CCI period must be >= 1");
        Self {
            period,
            name: format!("cci_{period}"),
        }
    }
}

impl Indicator for Cci {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<Option<f64>> {
        let tp = typical_prices(bars);
        let mean = rolling_mean(&tp, self.period);
        let mad = rolling_mean_abs_deviation(&tp, self.period);

        tp.iter()
            .zip(mean.iter().zip(&mad))
            .map(|(tp, (mean, mad))| {
                let (tp, mean, mad) = ((*tp)?, (*mean)?, (*mad)?);
                if mad == 0.0 {
                    return None;
                }
                Some((tp - mean) / (CCI_CONSTANT * mad))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars};

    #[test]
    fn flat_typical_price_is_none() {
        let bars = make_bars(&[100.0; 25]);
        let result = Cci::new(20).compute(&bars);
        assert!(result.iter().all(Option::is_none));
    }

    #[test]
    fn known_value() {
        let mut bars = make_bars(&[1.0, 2.0, 3.0]);
        // Force typical price == close
        for b in &mut bars {
            b.high = b.close;
            b.low = b.close;
        }
        let result = Cci::new(3).compute(&bars);
        // tp = 1,2,3 → mean 2, mad 2/3 → (3-2)/(0.015*2/3) = 100
        assert_approx(result[2].unwrap(), 100.0, 1e-9);
    }

    #[test]
    fn rising_prices_give_positive_cci() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let result = Cci::new(20).compute(&make_bars(&closes));
        assert!(result[29].unwrap() > 0.0);
    }

    #[test]
    fn missing_high_breaks_window() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + (i % 3) as f64).collect();
        let mut bars = make_bars(&closes);
        bars[10].high = None;
        let result = Cci::new(20).compute(&bars);
        assert!(result[24].is_none());
    }
}
