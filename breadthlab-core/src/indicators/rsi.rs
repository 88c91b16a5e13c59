//! Relative Strength Index (RSI), Wilder smoothing.
//!
//! Seed: simple mean of gains and losses over the first `period` price changes.
//! Then avg = (avg_prev * (period - 1) + current) / period.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Lookback: period.
//! Edge cases: avg_loss == 0 → RSI = 100, flat series included.
//! A missing close breaks the change chain and forces a fresh seed.

use super::{closes, Indicator};
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<Option<f64>> {
        rsi_of_series(&closes(bars), self.period)
    }
}

/// Wilder RSI over an arbitrary null-aware price series.
pub fn rsi_of_series(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut result = vec![None; n];
    if period == 0 {
        return result;
    }

    let p = period as f64;
    let mut averages: Option<(f64, f64)> = None;
    let mut seed_gain = 0.0;
    let mut seed_loss = 0.0;
    let mut seed_count = 0usize;

    for i in 1..n {
        let change = match (finite(values[i]), finite(values[i - 1])) {
            (Some(curr), Some(prev)) => curr - prev,
            _ => {
                averages = None;
                seed_gain = 0.0;
                seed_loss = 0.0;
                seed_count = 0;
                continue;
            }
        };
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        let (avg_gain, avg_loss) = match averages {
            Some((g, l)) => ((g * (p - 1.0) + gain) / p, (l * (p - 1.0) + loss) / p),
            None => {
                seed_gain += gain;
                seed_loss += loss;
                seed_count += 1;
                if seed_count < period {
                    continue;
                }
                (seed_gain / p, seed_loss / p)
            }
        };

        averages = Some((avg_gain, avg_loss));
        result[i] = Some(compute_rsi(avg_gain, avg_loss));
    }

    result
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
