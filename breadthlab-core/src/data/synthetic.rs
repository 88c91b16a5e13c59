//! Deterministic synthetic market data for demos and tests.
//!
//! Each symbol gets its own `StdRng` derived from the master seed and the
//! symbol code via BLAKE3, so the generated series of a symbol does not
//! depend on how many other symbols are generated or in which order.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::{MarketSegment, PriceBar};

/// Parameters of the random walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub listed_symbols: usize,
    pub otc_symbols: usize,
    /// First calendar day; weekends are skipped.
    pub start: NaiveDate,
    /// Number of trading days per symbol.
    pub trading_days: usize,
    /// Mean daily log return.
    pub drift: f64,
    /// Daily log-return standard deviation.
    pub volatility: f64,
    /// Probability that a symbol has no bar on a trading day.
    pub gap_probability: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            listed_symbols: 20,
            otc_symbols: 10,
            start: NaiveDate::from_ymd_opt(2023, 1, 2).unwrap_or_default(),
            trading_days: 320,
            drift: 0.0004,
            volatility: 0.02,
            gap_probability: 0.0,
        }
    }
}

/// A generated universe: every bar, ordered by (segment, symbol, date).
#[derive(Debug, Clone)]
pub struct SyntheticUniverse {
    bars: Vec<PriceBar>,
    dates: Vec<NaiveDate>,
}

impl SyntheticUniverse {
    pub fn generate(config: &SyntheticConfig) -> Self {
        let dates = weekdays(config.start, config.trading_days);
        let mut bars = Vec::new();

        let codes = (0..config.listed_symbols)
            .map(|i| (MarketSegment::Listed, format!("{}", 1101 + i)))
            .chain((0..config.otc_symbols).map(|i| (MarketSegment::Otc, format!("{}", 6101 + i))));

        for (segment, symbol) in codes {
            let mut rng = StdRng::seed_from_u64(sub_seed(config.seed, &symbol));
            bars.extend(random_walk(config, &mut rng, &symbol, segment, &dates));
        }

        Self { bars, dates }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<PriceBar> {
        self.bars
    }

    /// The weekday calendar the walk ran over.
    pub fn trading_dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

fn sub_seed(master: u64, symbol: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&master.to_le_bytes());
    hasher.update(symbol.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

fn weekdays(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut day = start;
    while dates.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(day);
        }
        day += Duration::days(1);
    }
    dates
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn random_walk(
    config: &SyntheticConfig,
    rng: &mut StdRng,
    symbol: &str,
    segment: MarketSegment,
    dates: &[NaiveDate],
) -> Vec<PriceBar> {
    // uniform on [-sqrt(3), sqrt(3)] has unit variance
    let unit = 3f64.sqrt();
    let mut close: f64 = rng.gen_range(20.0..400.0);
    let base_volume: u64 = rng.gen_range(200_000..3_000_000);
    let mut bars = Vec::with_capacity(dates.len());

    for &date in dates {
        let shock = rng.gen_range(-unit..unit);
        let skip = rng.gen_bool(config.gap_probability.clamp(0.0, 1.0));
        let prev = close;
        close = (prev * (config.drift + config.volatility * shock).exp()).max(0.5);
        if skip {
            continue;
        }

        let open = prev * (1.0 + rng.gen_range(-0.005..0.005));
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = (base_volume as f64 * rng.gen_range(0.5..1.8)) as u64;
        let (open, high, low, close_r) = (round2(open), round2(high), round2(low), round2(close));
        let typical = (high + low + close_r) / 3.0;

        bars.push(PriceBar {
            symbol: symbol.to_string(),
            segment,
            date,
            open: Some(open),
            high: Some(high.max(open).max(close_r)),
            low: Some(low.min(open).min(close_r)),
            close: Some(close_r),
            volume: Some(volume),
            turnover: Some((typical * volume as f64).round()),
        });
    }
    bars
}
