//! Null-aware windowed primitives over `&[Option<f64>]`.
//!
//! Every primitive returns a series of the same length as its input. A `None`
//! or non-finite element is a gap: rolling state resets at the gap and output
//! resumes only once `period` consecutive valid elements have accumulated
//! again. Gaps are never bridged, zero-filled or interpolated.

pub mod ema;
pub mod rolling;

pub use ema::exponential_mean;
pub use rolling::{rolling_mean, rolling_mean_abs_deviation, rolling_std_dev, rolling_sum};

/// Treat non-finite numbers the same as missing ones.
#[inline]
pub(crate) fn valid(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

/// Length of the unbroken run of valid elements ending at each index.
pub(crate) fn run_lengths(series: &[Option<f64>]) -> Vec<usize> {
    let mut run = 0usize;
    series
        .iter()
        .map(|v| {
            if valid(*v).is_some() {
                run += 1;
            } else {
                run = 0;
            }
            run
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_lengths_reset_on_gaps_and_nan() {
        let s = [Some(1.0), Some(2.0), None, Some(3.0), Some(f64::NAN), Some(4.0), Some(5.0)];
        assert_eq!(run_lengths(&s), vec![1, 2, 0, 1, 0, 1, 2]);
    }
}
