//! Property tests for the numerical invariants.
//!
//! Uses proptest to verify:
//! 1. Rolling mean equals the window mean and resets on gaps
//! 2. EMA converges to a constant input
//! 3. Engine outputs: RSI range, MACD histogram identity, band width, EZ sign
//! 4. Bucketing preserves volume and the high/low envelope
//! 5. The screen never admits out-of-band RSI or a negative histogram
//! 6. Sentiment score stays in 0..=6 and maps to its regime

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use breadthlab_core::analysis::{
    aggregate_bars, score_universe, uptrend_screen, Bucketing, Regime, ScreenCriteria,
    SymbolReading, Timeframe,
};
use breadthlab_core::domain::{IndicatorSnapshot, MarketSegment, PriceBar};
use breadthlab_core::indicators::IndicatorEngine;
use breadthlab_core::series::{exponential_mean, rolling_mean};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_nullable_series() -> impl Strategy<Value = Vec<Option<f64>>> {
    prop::collection::vec(prop::option::weighted(0.9, 1.0..1000.0_f64), 1..200)
}

fn arb_returns(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.05..0.05_f64, len)
}

fn bars_from_returns(returns: &[f64]) -> Vec<PriceBar> {
    let base = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let mut close = 100.0;
    returns
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let open = close;
            close *= 1.0 + r;
            PriceBar {
                symbol: "PROP".into(),
                segment: MarketSegment::Listed,
                date: base + Duration::days(i as i64),
                open: Some(open),
                high: Some(open.max(close) * 1.01),
                low: Some(open.min(close) * 0.99),
                close: Some(close),
                volume: Some(10_000 + i as u64),
                turnover: Some(close * 10_000.0),
            }
        })
        .collect()
}

fn arb_snapshot() -> impl Strategy<Value = IndicatorSnapshot> {
    (
        "[0-9]{4}",
        0.0..100.0_f64,
        -2.0..2.0_f64,
        1_000_000.0..3_000_000.0_f64,
        prop::collection::vec(50.0..150.0_f64, 4),
    )
        .prop_map(|(symbol, rsi, hist, turnover, prices)| {
            let mut s = IndicatorSnapshot::empty(
                symbol,
                MarketSegment::Listed,
                NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            );
            s.rsi14 = Some(rsi);
            s.macd_hist = Some(hist);
            s.turnover10 = Some(turnover);
            s.close = Some(prices[0]);
            s.sma20 = Some(prices[1]);
            s.sma50 = Some(prices[2]);
            s.sma200 = Some(prices[3]);
            s.ez = Some((prices[0] - prices[1]) / prices[1] * 100.0);
            s
        })
}

fn arb_reading() -> impl Strategy<Value = SymbolReading> {
    let v = || prop::option::of(-100.0..100.0_f64);
    (v(), v(), prop::option::of(0.0..100.0_f64), v(), v()).prop_map(
        |(change_pct, ez, rsi14, macd_hist, cci20)| SymbolReading {
            symbol: String::new(),
            change_pct,
            ez,
            rsi14,
            macd_hist,
            cci20,
        },
    )
}

// ── 1. Rolling mean ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn rolling_mean_matches_window(series in arb_nullable_series(), period in 1usize..30) {
        let out = rolling_mean(&series, period);
        prop_assert_eq!(out.len(), series.len());

        for i in 0..series.len() {
            let complete = i + 1 >= period
                && series[i + 1 - period..=i].iter().all(Option::is_some);
            match out[i] {
                Some(v) => {
                    prop_assert!(complete, "value at {} without a full window", i);
                    let window: f64 = series[i + 1 - period..=i].iter().flatten().sum();
                    prop_assert!((v - window / period as f64).abs() < 1e-6);
                }
                None => prop_assert!(!complete, "missing value at {} with a full window", i),
            }
        }
    }
}

// ── 2. EMA convergence ───────────────────────────────────────────────

proptest! {
    #[test]
    fn ema_converges_to_constant(
        prefix in prop::collection::vec(1.0..1000.0_f64, 0..50),
        level in 1.0..1000.0_f64,
        period in 1usize..30,
    ) {
        let mut series: Vec<Option<f64>> = prefix.into_iter().map(Some).collect();
        series.extend(std::iter::repeat(Some(level)).take(600));
        let out = exponential_mean(&series, period);
        let last = out.last().copied().flatten().unwrap();
        prop_assert!((last - level).abs() < 1e-6 * level.max(1.0));
    }
}

// ── 3. Engine outputs ────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn engine_invariants(returns in arb_returns(30..260)) {
        let bars = bars_from_returns(&returns);
        let series = IndicatorEngine::default().compute_series(&bars);

        for i in 0..bars.len() {
            if let Some(rsi) = series.rsi14[i] {
                prop_assert!((0.0..=100.0).contains(&rsi));
            }
            if let (Some(m), Some(s), Some(h)) = (series.macd[i], series.macd_signal[i], series.macd_hist[i]) {
                prop_assert!((h - (m - s)).abs() < 1e-9);
            }
            if let (Some(u), Some(l), Some(sd)) = (series.upper_band20[i], series.lower_band20[i], series.stddev20[i]) {
                prop_assert!((u - l - 4.0 * sd).abs() < 1e-9 * u.abs().max(1.0));
            }
            if let (Some(ez), Some(close), Some(sma)) = (series.ez[i], series.close[i], series.sma20[i]) {
                let diff = close - sma;
                if diff.abs() > 1e-9 {
                    prop_assert_eq!(ez > 0.0, diff > 0.0);
                }
            }
        }
    }
}

// ── 4. Bucketing ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn fixed_buckets_preserve_volume_and_envelope(returns in arb_returns(1..120), n in 1usize..15) {
        let bars = bars_from_returns(&returns);
        let agg = aggregate_bars(&bars, &[], Bucketing::Fixed(n));

        prop_assert_eq!(agg.len(), bars.len().div_ceil(n));
        let total: u64 = agg.iter().filter_map(|b| b.volume).sum();
        prop_assert_eq!(total, bars.iter().filter_map(|b| b.volume).sum::<u64>());

        for (bucket, chunk) in agg.iter().zip(bars.chunks(n)) {
            prop_assert_eq!(bucket.bar_count, chunk.len());
            for bar in chunk {
                prop_assert!(bucket.high.unwrap() >= bar.high.unwrap());
                prop_assert!(bucket.low.unwrap() <= bar.low.unwrap());
            }
        }
    }

    #[test]
    fn calendar_buckets_cover_every_bar(returns in arb_returns(1..200)) {
        let bars = bars_from_returns(&returns);
        for tf in [Timeframe::Day, Timeframe::Week, Timeframe::Month, Timeframe::Quarter] {
            let agg = aggregate_bars(&bars, &[], Bucketing::Calendar(tf));
            prop_assert_eq!(agg.iter().map(|b| b.bar_count).sum::<usize>(), bars.len());
            for b in &agg {
                prop_assert_eq!(tf.bucket_start(b.start_date), tf.bucket_start(b.end_date));
            }
        }
    }
}

// ── 5. Screen ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn screen_respects_thresholds(snaps in prop::collection::vec(arb_snapshot(), 0..60)) {
        let hits = uptrend_screen(&snaps, &ScreenCriteria::default());
        for s in &hits {
            let rsi = s.rsi14.unwrap();
            prop_assert!((60.0..=70.0).contains(&rsi));
            prop_assert!(s.macd_hist.unwrap() >= 0.0);
            prop_assert!(s.close.unwrap() > s.sma20.unwrap());
        }
        for pair in hits.windows(2) {
            prop_assert!(pair[0].ez.unwrap() <= pair[1].ez.unwrap());
        }
    }
}

// ── 6. Sentiment ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn score_maps_to_regime(readings in prop::collection::vec(arb_reading(), 1..40), line in -500i64..500) {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let r = score_universe(MarketSegment::Otc, date, &readings, line).unwrap();
        prop_assert!(r.score <= 6);
        prop_assert_eq!(r.score, r.sub_scores.total());
        let expected = match r.score {
            0..=2 => Regime::Defense,
            3..=4 => Regime::Selective,
            _ => Regime::Attack,
        };
        prop_assert_eq!(r.regime, expected);
        prop_assert_eq!(r.breadth, r.advancers as i64 - r.decliners as i64);
    }
}
