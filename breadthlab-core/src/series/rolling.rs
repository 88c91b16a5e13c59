//! Rolling sum, mean, population standard deviation and mean absolute deviation.
//!
//! Lookback: period - 1 (first value at index period-1 of an unbroken run).

use super::{run_lengths, valid};

/// Rolling sum over the trailing `period` elements.
///
/// Amortized: the running sum is updated by adding the entering element and
/// subtracting the leaving one. The sum and count reset to zero on a gap.
pub fn rolling_sum(series: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; series.len()];
    if period == 0 {
        return result;
    }

    let mut sum = 0.0;
    let mut count = 0usize;
    for (i, v) in series.iter().enumerate() {
        match valid(*v) {
            None => {
                sum = 0.0;
                count = 0;
            }
            Some(x) => {
                sum += x;
                count += 1;
                if count > period {
                    // count > period guarantees the leaving element is inside the run
                    if let Some(leaving) = valid(series[i - period]) {
                        sum -= leaving;
                    }
                    count = period;
                }
                if count == period {
                    result[i] = Some(sum);
                }
            }
        }
    }

    result
}

/// Simple moving average over the trailing `period` elements.
pub fn rolling_mean(series: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    rolling_sum(series, period)
        .into_iter()
        .map(|s| s.map(|s| s / period as f64))
        .collect()
}

/// Population standard deviation (divide by `period`) of the trailing window.
pub fn rolling_std_dev(series: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    window_stat(series, period, |window, mean| {
        let variance = window.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>()
            / window.len() as f64;
        variance.max(0.0).sqrt()
    })
}

/// Mean absolute deviation of the trailing window around its own mean.
pub fn rolling_mean_abs_deviation(series: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    window_stat(series, period, |window, mean| {
        window.iter().map(|x| (x - mean).abs()).sum::<f64>() / window.len() as f64
    })
}

/// Evaluate `stat(window, mean)` for every full, gap-free trailing window.
fn window_stat<F>(series: &[Option<f64>], period: usize, stat: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64], f64) -> f64,
{
    let n = series.len();
    let mut result = vec![None; n];
    if period == 0 {
        return result;
    }

    let runs = run_lengths(series);
    let mut window = Vec::with_capacity(period);
    for i in 0..n {
        if runs[i] < period {
            continue;
        }
        window.clear();
        window.extend(series[(i + 1 - period)..=i].iter().filter_map(|v| valid(*v)));
        let mean = window.iter().sum::<f64>() / period as f64;
        result[i] = Some(stat(&window, mean));
    }

    result
}
