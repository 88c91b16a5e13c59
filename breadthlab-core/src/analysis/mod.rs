//! Cross-symbol analysis: breadth sentiment, the uptrend screen and bar
//! aggregation.

pub mod aggregate;
pub mod screen;
pub mod sentiment;

pub use aggregate::{
    aggregate_bars, period_change, segment_period_change, AggregatedBar, Bucketing, PeriodChange,
    Timeframe, TimeframeParseError,
};
pub use screen::{screen_date, uptrend_screen, ScreenCriteria};
pub use sentiment::{
    breadth_history, compute_sentiment, daily_breadth, daily_changes, score_universe, BreadthPoint,
    Regime, SentimentReading, SubScores, SymbolReading, DEFAULT_BREADTH_WINDOW_DAYS,
};
