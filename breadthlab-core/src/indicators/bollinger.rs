//! Bollinger Bands around the 20-bar SMA of close.
//!
//! `upper_band20` and `lower_band20` sit `multiplier` population standard
//! deviations above and below the mean. A band is `None` wherever either the
//! mean or the deviation is; a flat window gives zero width.

use super::{closes, Indicator};
use crate::domain::PriceBar;
use crate::series::{rolling_mean, rolling_std_dev};

/// Selects the line a [`Bollinger`] instance emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    Upper,
    Middle,
    Lower,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    band: BollingerBand,
    name: String,
}

impl Bollinger {
    pub fn new(period: usize, multiplier: f64, band: BollingerBand) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        let label = match band {
            BollingerBand::Upper => "upper",
            BollingerBand::Middle => "middle",
            BollingerBand::Lower => "lower",
        };
        Self {
            period,
            multiplier,
            band,
            name: format!("bollinger_{label}_{period}_{multiplier}"),
        }
    }

    pub fn upper(period: usize, multiplier: f64) -> Self {
        Self::new(period, multiplier, BollingerBand::Upper)
    }

    pub fn middle(period: usize, multiplier: f64) -> Self {
        Self::new(period, multiplier, BollingerBand::Middle)
    }

    pub fn lower(period: usize, multiplier: f64) -> Self {
        Self::new(period, multiplier, BollingerBand::Lower)
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<Option<f64>> {
        let close = closes(bars);
        let middle = rolling_mean(&close, self.period);
        if self.band == BollingerBand::Middle {
            return middle;
        }
        let stddev = rolling_std_dev(&close, self.period);
        let (upper, lower) = bands(&middle, &stddev, self.multiplier);
        match self.band {
            BollingerBand::Upper => upper,
            _ => lower,
        }
    }
}

/// Upper and lower envelopes from precomputed middle and stddev series.
///
/// A band is `None` whenever either input is `None`.
pub fn bands(
    middle: &[Option<f64>],
    stddev: &[Option<f64>],
    multiplier: f64,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    middle
        .iter()
        .zip(stddev)
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => (Some(m + multiplier * s), Some(m - multiplier * s)),
            _ => (None, None),
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};
    use crate::series::rolling_std_dev;

    #[test]
    fn bollinger_middle_is_sma() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let result = Bollinger::middle(3, 2.0).compute(&bars);
        assert!(result[1].is_none());
        assert_approx(result[2].unwrap(), 11.0, DEFAULT_EPSILON);
        assert_approx(result[3].unwrap(), 12.0, DEFAULT_EPSILON);
    }

    #[test]
    fn band_width_is_four_stddev() {
        let bars = make_bars(&[10.0, 12.0, 11.0, 15.0, 14.0, 13.0, 16.0]);
        let upper = Bollinger::upper(3, 2.0).compute(&bars);
        let lower = Bollinger::lower(3, 2.0).compute(&bars);
        let sd = rolling_std_dev(&closes(&bars), 3);
        for i in 2..bars.len() {
            assert_approx(upper[i].unwrap() - lower[i].unwrap(), 4.0 * sd[i].unwrap(), 1e-9);
        }
    }

    #[test]
    fn bollinger_constant_price_zero_width() {
        let bars = make_bars(&[100.0, 100.0, 100.0, 100.0]);
        let upper = Bollinger::upper(3, 2.0).compute(&bars);
        let lower = Bollinger::lower(3, 2.0).compute(&bars);
        assert_approx(upper[2].unwrap(), 100.0, DEFAULT_EPSILON);
        assert_approx(lower[2].unwrap(), 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_missing_close() {
        let mut bars = make_bars(&[10.0, 11.0, 12.0, 13.0]);
        bars[2].close = None;
        let result = Bollinger::upper(3, 2.0).compute(&bars);
        assert!(result[2].is_none());
        assert!(result[3].is_none());
    }

    #[test]
    fn bollinger_lookback() {
        assert_eq!(Bollinger::upper(20, 2.0).lookback(), 19);
        assert_eq!(Bollinger::lower(20, 2.0).name(), "bollinger_lower_20_2");
    }
}
