//! Exponential moving average over a null-aware series.
//!
//! Recursive: EMA[t] = k * v[t] + (1 - k) * EMA[t-1], k = 2 / (period + 1).
//! Seed: simple mean of the first unbroken run of `period` valid values.
//! A gap discards the running EMA; it is re-seeded from the next full run.

use super::valid;

pub fn exponential_mean(series: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; series.len()];
    if period == 0 {
        return result;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut prev: Option<f64> = None;
    let mut seed_sum = 0.0;
    let mut seed_count = 0usize;

    for (i, v) in series.iter().enumerate() {
        let Some(x) = valid(*v) else {
            prev = None;
            seed_sum = 0.0;
            seed_count = 0;
            continue;
        };

        match prev {
            Some(p) => {
                let ema = x * k + p * (1.0 - k);
                prev = Some(ema);
                result[i] = Some(ema);
            }
            None => {
                seed_sum += x;
                seed_count += 1;
                if seed_count == period {
                    let seed = seed_sum / period as f64;
                    prev = Some(seed);
                    result[i] = Some(seed);
                }
            }
        }
    }

    result
}
