//! JSON and CSV export of query results.
//!
//! Flat records (snapshots, aggregated bars, period changes, breadth points)
//! are written through serde; sentiment readings are flattened by hand
//! because their sub-scores are nested.

use std::path::Path;

use anyhow::{Context, Result};
use breadthlab_core::analysis::{AggregatedBar, BreadthPoint, PeriodChange, SentimentReading};
use breadthlab_core::domain::IndicatorSnapshot;
use serde::Serialize;

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize any result record to pretty JSON.
pub fn export_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize result to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

fn rows_to_csv<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for row in rows {
        wtr.serialize(row).context("failed to write CSV row")?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per snapshot, every indicator column included.
pub fn export_snapshots_csv(snapshots: &[IndicatorSnapshot]) -> Result<String> {
    rows_to_csv(snapshots)
}

pub fn export_aggregated_csv(bars: &[AggregatedBar]) -> Result<String> {
    rows_to_csv(bars)
}

pub fn export_changes_csv(changes: &[PeriodChange]) -> Result<String> {
    rows_to_csv(changes)
}

pub fn export_breadth_csv(points: &[BreadthPoint]) -> Result<String> {
    rows_to_csv(points)
}

/// Export sentiment readings with one column per sub-score.
///
/// Columns: segment, date, universe_size, advancers, decliners, breadth,
/// breadth_line, ez_positive_pct, rsi_above_50_pct, macd_positive_pct,
/// cci_positive_pct, breadth_positive, breadth_line_positive, ez_majority,
/// rsi_majority, macd_majority, cci_majority, score, regime
pub fn export_sentiment_csv(readings: &[SentimentReading]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "segment",
        "date",
        "universe_size",
        "advancers",
        "decliners",
        "breadth",
        "breadth_line",
        "ez_positive_pct",
        "rsi_above_50_pct",
        "macd_positive_pct",
        "cci_positive_pct",
        "breadth_positive",
        "breadth_line_positive",
        "ez_majority",
        "rsi_majority",
        "macd_majority",
        "cci_majority",
        "score",
        "regime",
    ])?;

    for r in readings {
        let s = &r.sub_scores;
        wtr.write_record([
            r.segment.as_str(),
            &r.date.to_string(),
            &r.universe_size.to_string(),
            &r.advancers.to_string(),
            &r.decliners.to_string(),
            &r.breadth.to_string(),
            &r.breadth_line.to_string(),
            &format!("{:.2}", r.ez_positive_pct),
            &format!("{:.2}", r.rsi_above_50_pct),
            &format!("{:.2}", r.macd_positive_pct),
            &format!("{:.2}", r.cci_positive_pct),
            &s.breadth_positive.to_string(),
            &s.breadth_line_positive.to_string(),
            &s.ez_majority.to_string(),
            &s.rsi_majority.to_string(),
            &s.macd_majority.to_string(),
            &s.cci_majority.to_string(),
            &r.score.to_string(),
            &r.regime.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write an export to disk, creating parent directories.
pub fn write_export(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create export dir: {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}
