//! Money Flow Index (MFI), a volume-weighted RSI analogue.
//!
//! raw flow = typical price * volume, positive when tp rises versus the
//! previous day, negative when it falls, neither when unchanged.
//! MFI = 100 - 100 / (1 + positive_sum / negative_sum) over `period` days.
//! Lookback: period.
//! Edge case: negative_sum == 0 → MFI = 100.

use super::{typical_prices, Indicator};
use crate::domain::PriceBar;
use crate::series::rolling_sum;

#[derive(Debug, Clone)]
pub struct Mfi {
    period: usize,
    name: String,
}

impl Mfi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "MFI period must be >= 1");
        Self {
            period,
            name: format!("mfi_{period}"),
        }
    }
}

impl Indicator for Mfi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<Option<f64>> {
        let n = bars.len();
        let tp = typical_prices(bars);

        // Day 0 has no prior typical price, so its flow is undefined.
        let mut positive = vec![None; n];
        let mut negative = vec![None; n];
        for i in 1..n {
            let (Some(curr), Some(prev), Some(volume)) = (tp[i], tp[i - 1], bars[i].volume) else {
                continue;
            };
            let raw = curr * volume as f64;
            positive[i] = Some(if curr > prev { raw } else { 0.0 });
            negative[i] = Some(if curr < prev { raw } else { 0.0 });
        }

        let pos_sum = rolling_sum(&positive, self.period);
        let neg_sum = rolling_sum(&negative, self.period);

        pos_sum
            .iter()
            .zip(&neg_sum)
            .map(|(pos, neg)| {
                let (pos, neg) = ((*pos)?, (*neg)?);
                if neg == 0.0 {
                    Some(100.0)
                } else {
                    Some(100.0 - 100.0 / (1.0 + pos / neg))
                }
            })
            .collect()
    }
}
