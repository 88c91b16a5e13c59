//! PriceBar: the fundamental end-of-day market data unit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::MarketSegment;

/// End-of-day OHLCV record for a single symbol on a single trading day.
///
/// Price fields are `None` when the exchange did not publish them for that
/// day. At most one bar exists per (symbol, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: String,
    pub segment: MarketSegment,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
    pub turnover: Option<f64>,
}

/// A symbol code usable as a store key and a single path component:
/// non-empty, no path separators, no `=`, not `.` or `..`.
pub fn is_storable_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol != "."
        && symbol != ".."
        && !symbol.chars().any(|c| matches!(c, '/' | '\\' | '=') || c.is_control())
}

impl PriceBar {
    /// Typical price `(high + low + close) / 3`, if all three are published.
    pub fn typical_price(&self) -> Option<f64> {
        match (self.high, self.low, self.close) {
            (Some(h), Some(l), Some(c)) => Some((h + l + c) / 3.0),
            _ => None,
        }
    }

    /// Returns true if no price field was published (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_none() && self.high.is_none() && self.low.is_none() && self.close.is_none()
    }

    /// Basic OHLC sanity check: high >= low, high >= open/close, low <= open/close.
    ///
    /// Bars with missing fields only check what is present.
    pub fn is_sane(&self) -> bool {
        let positive = [self.open, self.high, self.low, self.close]
            .iter()
            .flatten()
            .all(|p| p.is_finite() && *p > 0.0);
        if !positive {
            return false;
        }
        let (Some(high), Some(low)) = (self.high, self.low) else {
            return true;
        };
        high >= low
            && [self.open, self.close]
                .iter()
                .flatten()
                .all(|p| *p <= high && *p >= low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> PriceBar {
        PriceBar {
            symbol: "2330".into(),
            segment: MarketSegment::Listed,
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: Some(100.0),
            high: Some(105.0),
            low: Some(98.0),
            close: Some(103.0),
            volume: Some(50_000),
            turnover: Some(5_150_000.0),
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = Some(97.0); // below low
        assert!(!bar.is_sane());
    }

    #[test]
    fn partial_bar_checks_present_fields() {
        let mut bar = sample_bar();
        bar.open = None;
        bar.low = None;
        assert!(bar.is_sane());
        assert!(!bar.is_void());
    }

    #[test]
    fn typical_price_needs_hlc() {
        let bar = sample_bar();
        assert!((bar.typical_price().unwrap() - (105.0 + 98.0 + 103.0) / 3.0).abs() < 1e-12);

        let mut missing = sample_bar();
        missing.low = None;
        assert_eq!(missing.typical_price(), None);
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let bar = sample_bar();
        let json = serde_json::to_string(&bar).unwrap();
        let deser: PriceBar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, deser);
    }

    #[test]
    fn storable_symbols_are_single_path_components() {
        assert!(is_storable_symbol("2330"));
        assert!(is_storable_symbol("BRK.B"));
        for bad in ["", ".", "..", "BRK/B", "A\\B", "segment=x", "A\tB"] {
            assert!(!is_storable_symbol(bad), "{bad:?} should be rejected");
        }
    }
}
