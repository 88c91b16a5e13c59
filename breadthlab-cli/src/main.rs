//! BreadthLab CLI: import, refresh, and query commands.
//!
//! Commands:
//! - `import`: load daily bars from CSV files into the Parquet store
//! - `refresh`: recompute indicator snapshots for a segment and date (or range)
//! - `sentiment`: the six-point breadth score and regime
//! - `breadth`: daily breadth and breadth line over a date range
//! - `screen`: the uptrend screen
//! - `bars`: weekly/monthly/quarterly or fixed-size aggregated bars
//! - `movers`: period change table for a segment
//! - `snapshot`: the indicator snapshot of one symbol
//! - `demo`: seed the store with a synthetic universe and refresh it

use anyhow::{bail, Context, Result};
use breadthlab_core::analysis::{BreadthPoint, Bucketing, SentimentReading, Timeframe};
use breadthlab_core::data::{
    import_csv_file, BarSink, BarSource, MarketStore, ParquetStore, SyntheticConfig,
    SyntheticUniverse,
};
use breadthlab_core::domain::snapshot::VALUE_COLUMNS;
use breadthlab_core::domain::{IndicatorSnapshot, MarketSegment};
use breadthlab_runner::config::DEFAULT_CONFIG_FILE;
use breadthlab_runner::export::{
    export_aggregated_csv, export_breadth_csv, export_changes_csv, export_json,
    export_sentiment_csv, export_snapshots_csv, write_export,
};
use breadthlab_runner::{
    Config, QueryService, RefreshJob, RefreshProgress, RefreshSummary, StdoutProgress,
    TracingProgress,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "breadthlab",
    about = "BreadthLab CLI: market breadth, sentiment and indicator screening"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Store directory; overrides `storage.data_dir`.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Import daily bars from CSV files.
    Import {
        /// CSV files with columns symbol,segment,date,open,high,low,close,volume,turnover.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Recompute indicator snapshots.
    Refresh {
        /// Trading date (YYYY-MM-DD). Defaults to the latest trading date.
        #[arg(long, conflicts_with_all = ["start", "end"])]
        date: Option<NaiveDate>,

        /// First date of a range refresh.
        #[arg(long, requires = "end")]
        start: Option<NaiveDate>,

        /// Last date of a range refresh.
        #[arg(long, requires = "start")]
        end: Option<NaiveDate>,

        /// Segment to refresh (listed, otc). Defaults to both.
        #[arg(long)]
        segment: Option<MarketSegment>,

        /// Refresh symbols one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
    /// Breadth score and regime for a segment.
    Sentiment {
        #[arg(long, default_value = "listed")]
        segment: MarketSegment,

        /// Defaults to the latest trading date.
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,

        /// Write the result to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Daily breadth and cumulative breadth line over a date range.
    Breadth {
        #[arg(long, default_value = "listed")]
        segment: MarketSegment,

        /// Defaults to 60 days before --end.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,

        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Symbols passing the uptrend screen.
    Screen {
        #[arg(long, default_value = "listed")]
        segment: MarketSegment,

        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,

        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Aggregated bars of one symbol.
    Bars {
        symbol: String,

        /// Calendar bucket: week, month, quarter.
        #[arg(long, default_value = "week", conflicts_with = "every")]
        timeframe: Timeframe,

        /// Fixed bucket of N trading days instead of a calendar bucket.
        #[arg(long)]
        every: Option<usize>,

        /// Defaults to 180 days before --end.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,

        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Period change table for a segment.
    Movers {
        #[arg(long, default_value = "listed")]
        segment: MarketSegment,

        #[arg(long)]
        date: Option<NaiveDate>,

        /// day, week, month, quarter.
        #[arg(long, default_value = "week")]
        timeframe: Timeframe,

        /// Show only the first N rows.
        #[arg(long)]
        top: Option<usize>,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,

        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Indicator snapshot of one symbol.
    Snapshot {
        symbol: String,

        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Seed the store with synthetic bars and refresh the last date.
    Demo {
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 20)]
        listed: usize,

        #[arg(long, default_value_t = 10)]
        otc: usize,

        /// Trading days to generate.
        #[arg(long, default_value_t = 320)]
        days: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let progress = refresh_progress(cli.verbose);

    let mut config = Config::from_file(&cli.config)?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    match cli.command {
        Commands::Import { files } => run_import(&config, &files),
        Commands::Refresh {
            date,
            start,
            end,
            segment,
            sequential,
        } => {
            if sequential {
                config.refresh.parallel = false;
            }
            run_refresh(&config, date, start.zip(end), segment, progress)
        }
        Commands::Sentiment {
            segment,
            date,
            format,
            output,
        } => run_sentiment(&config, segment, date, format, output.as_deref()),
        Commands::Breadth {
            segment,
            start,
            end,
            format,
            output,
        } => run_breadth(&config, segment, start, end, format, output.as_deref()),
        Commands::Screen {
            segment,
            date,
            format,
            output,
        } => run_screen(&config, segment, date, format, output.as_deref()),
        Commands::Bars {
            symbol,
            timeframe,
            every,
            start,
            end,
            format,
            output,
        } => {
            let bucketing = match every {
                Some(0) => bail!("--every must be at least 1"),
                Some(n) => Bucketing::Fixed(n),
                None => Bucketing::Calendar(timeframe),
            };
            run_bars(&config, &symbol, bucketing, start, end, format, output.as_deref())
        }
        Commands::Movers {
            segment,
            date,
            timeframe,
            top,
            format,
            output,
        } => run_movers(&config, segment, date, timeframe, top, format, output.as_deref()),
        Commands::Snapshot {
            symbol,
            date,
            format,
        } => run_snapshot(&config, &symbol, date, format),
        Commands::Demo {
            seed,
            listed,
            otc,
            days,
        } => run_demo(
            &config,
            SyntheticConfig {
                seed,
                listed_symbols: listed,
                otc_symbols: otc,
                trading_days: days,
                ..SyntheticConfig::default()
            },
            progress,
        ),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

/// Refresh progress: tracing events when verbose, plain lines otherwise.
fn refresh_progress(verbose: u8) -> &'static dyn RefreshProgress {
    if verbose > 0 {
        &TracingProgress
    } else {
        &StdoutProgress
    }
}

fn open_store(config: &Config) -> Arc<dyn MarketStore> {
    Arc::new(ParquetStore::new(&config.storage.data_dir))
}

fn query_service(config: &Config) -> QueryService {
    QueryService::new(open_store(config), config.clone())
}

/// Print to stdout, or write to `output` when given.
fn emit(rendered: String, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            write_export(path, &rendered)?;
            println!("Wrote {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn with_newline(mut s: String) -> String {
    if !s.ends_with('\n') {
        s.push('\n');
    }
    s
}

fn run_import(config: &Config, files: &[PathBuf]) -> Result<()> {
    let store = ParquetStore::new(&config.storage.data_dir);
    for file in files {
        let report = import_csv_file(file, &store)
            .with_context(|| format!("failed to import {}", file.display()))?;
        println!(
            "{}: {} rows, {} inserted, {} duplicates, {} rejected",
            file.display(),
            report.rows_read,
            report.inserted,
            report.duplicates,
            report.rejected
        );
    }
    Ok(())
}

fn run_refresh(
    config: &Config,
    date: Option<NaiveDate>,
    range: Option<(NaiveDate, NaiveDate)>,
    segment: Option<MarketSegment>,
    progress: &dyn RefreshProgress,
) -> Result<()> {
    let store = open_store(config);
    let job = RefreshJob::new(store.clone(), config.refresh.clone());
    let segments: Vec<MarketSegment> = segment.map_or_else(|| MarketSegment::ALL.to_vec(), |s| vec![s]);
    let today = chrono::Local::now().date_naive();

    let mut summaries: Vec<RefreshSummary> = Vec::new();
    for segment in segments {
        if let Some((start, end)) = range {
            summaries.extend(job.refresh_range(start, end, segment, Some(progress))?);
            continue;
        }
        let Some(date) = store.latest_trading_date(segment, date.unwrap_or(today))? else {
            println!("No {segment} bars on or before {}; nothing to refresh.", date.unwrap_or(today));
            continue;
        };
        summaries.push(job.refresh(date, segment, Some(progress))?);
    }

    let failed: usize = summaries.iter().map(|s| s.failed.len()).sum();
    if failed > 0 {
        for summary in &summaries {
            for f in &summary.failed {
                eprintln!("Error for {} on {}: {}", f.symbol, summary.date, f.error);
            }
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_sentiment(
    config: &Config,
    segment: MarketSegment,
    date: Option<NaiveDate>,
    format: Format,
    output: Option<&Path>,
) -> Result<()> {
    let Some(reading) = query_service(config).sentiment(segment, date)? else {
        println!("No {segment} trading data on or before the requested date.");
        return Ok(());
    };
    let rendered = match format {
        Format::Json => with_newline(export_json(&reading)?),
        Format::Csv => export_sentiment_csv(std::slice::from_ref(&reading))?,
        Format::Table => sentiment_table(&reading),
    };
    emit(rendered, output)
}

fn sentiment_table(r: &SentimentReading) -> String {
    let mark = |b: bool| if b { "+1" } else { " 0" };
    let s = &r.sub_scores;
    let mut out = String::new();
    out.push_str(&format!("=== {} sentiment {} ===\n", r.segment, r.date));
    out.push_str(&format!("Universe:        {} symbols\n", r.universe_size));
    out.push_str(&format!(
        "Breadth:         {:+} ({} up / {} down)  {}\n",
        r.breadth,
        r.advancers,
        r.decliners,
        mark(s.breadth_positive)
    ));
    out.push_str(&format!(
        "Breadth line:    {:+}  {}\n",
        r.breadth_line,
        mark(s.breadth_line_positive)
    ));
    out.push_str(&format!("EZ > 0:          {:>5.1}%  {}\n", r.ez_positive_pct, mark(s.ez_majority)));
    out.push_str(&format!("RSI > 50:        {:>5.1}%  {}\n", r.rsi_above_50_pct, mark(s.rsi_majority)));
    out.push_str(&format!("MACD hist > 0:   {:>5.1}%  {}\n", r.macd_positive_pct, mark(s.macd_majority)));
    out.push_str(&format!("CCI > 0:         {:>5.1}%  {}\n", r.cci_positive_pct, mark(s.cci_majority)));
    out.push_str(&format!("Score:           {}/6  {}\n", r.score, r.regime));
    out
}

fn run_breadth(
    config: &Config,
    segment: MarketSegment,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    format: Format,
    output: Option<&Path>,
) -> Result<()> {
    let end = end.unwrap_or_else(|| chrono::Local::now().date_naive());
    let start = start.unwrap_or(end - chrono::Duration::days(60));
    let points = query_service(config).breadth_history(segment, start, end)?;
    let rendered = match format {
        Format::Json => with_newline(export_json(&points)?),
        Format::Csv => export_breadth_csv(&points)?,
        Format::Table => breadth_table(segment, &points),
    };
    emit(rendered, output)
}

fn breadth_table(segment: MarketSegment, points: &[BreadthPoint]) -> String {
    let mut out = format!("{segment} breadth: {} trading days\n", points.len());
    out.push_str(&format!("{:<10} {:>8} {:>13}\n", "Date", "Breadth", "Breadth line"));
    out.push_str(&format!("{}\n", "-".repeat(33)));
    for p in points {
        out.push_str(&format!("{:<10} {:>+8} {:>+13}\n", p.date, p.breadth, p.breadth_line));
    }
    out
}

fn run_screen(
    config: &Config,
    segment: MarketSegment,
    date: Option<NaiveDate>,
    format: Format,
    output: Option<&Path>,
) -> Result<()> {
    let result = query_service(config).uptrend_screen(segment, date)?;
    let rendered = match format {
        Format::Json => with_newline(export_json(&result)?),
        Format::Csv => export_snapshots_csv(&result.hits)?,
        Format::Table => {
            let mut out = format!("{} uptrend screen {}: {} hits\n", result.segment, result.date, result.hits.len());
            out.push_str(&format!(
                "{:<8} {:>10} {:>8} {:>10} {:>8} {:>14}\n",
                "Symbol", "Close", "RSI14", "MACD hist", "EZ %", "Turnover10"
            ));
            out.push_str(&format!("{}\n", "-".repeat(63)));
            for s in &result.hits {
                out.push_str(&format!(
                    "{:<8} {:>10} {:>8} {:>10} {:>8} {:>14}\n",
                    s.symbol,
                    cell(s.close, 2),
                    cell(s.rsi14, 1),
                    cell(s.macd_hist, 3),
                    cell(s.ez, 2),
                    cell(s.turnover10, 0),
                ));
            }
            out
        }
    };
    emit(rendered, output)
}

fn run_bars(
    config: &Config,
    symbol: &str,
    bucketing: Bucketing,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    format: Format,
    output: Option<&Path>,
) -> Result<()> {
    let end = end.unwrap_or_else(|| chrono::Local::now().date_naive());
    let start = start.unwrap_or(end - chrono::Duration::days(180));
    let bars = query_service(config).aggregated_bars(symbol, start, end, bucketing)?;
    let rendered = match format {
        Format::Json => with_newline(export_json(&bars)?),
        Format::Csv => export_aggregated_csv(&bars)?,
        Format::Table => {
            let mut out = format!(
                "{:<10} {:<10} {:>9} {:>9} {:>9} {:>9} {:>12} {:>9} {:>7}\n",
                "Start", "End", "Open", "High", "Low", "Close", "Volume", "SMA20", "EZ %"
            );
            out.push_str(&format!("{}\n", "-".repeat(94)));
            for b in &bars {
                out.push_str(&format!(
                    "{:<10} {:<10} {:>9} {:>9} {:>9} {:>9} {:>12} {:>9} {:>7}\n",
                    b.start_date,
                    b.end_date,
                    cell(b.open, 2),
                    cell(b.high, 2),
                    cell(b.low, 2),
                    cell(b.close, 2),
                    b.volume.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
                    cell(b.sma20, 2),
                    cell(b.ez, 2),
                ));
            }
            out
        }
    };
    emit(rendered, output)
}

#[allow(clippy::too_many_arguments)]
fn run_movers(
    config: &Config,
    segment: MarketSegment,
    date: Option<NaiveDate>,
    timeframe: Timeframe,
    top: Option<usize>,
    format: Format,
    output: Option<&Path>,
) -> Result<()> {
    let mut result = query_service(config).period_change(segment, date, timeframe)?;
    if let Some(n) = top {
        result.changes.truncate(n);
    }
    let rendered = match format {
        Format::Json => with_newline(export_json(&result)?),
        Format::Csv => export_changes_csv(&result.changes)?,
        Format::Table => {
            let mut out = format!("{} {} change as of {}\n", result.segment, result.timeframe, result.date);
            out.push_str(&format!("{:<8} {:>10} {:<10} {:>10} {:>9}\n", "Symbol", "Close", "Since", "Then", "Change %"));
            out.push_str(&format!("{}\n", "-".repeat(51)));
            for c in &result.changes {
                out.push_str(&format!(
                    "{:<8} {:>10} {:<10} {:>10} {:>9}\n",
                    c.symbol,
                    cell(c.close, 2),
                    c.past_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                    cell(c.past_close, 2),
                    cell(c.change_pct, 2),
                ));
            }
            out
        }
    };
    emit(rendered, output)
}

fn run_snapshot(config: &Config, symbol: &str, date: Option<NaiveDate>, format: Format) -> Result<()> {
    let snapshot = query_service(config).latest_snapshot(symbol, date)?;
    let rendered = match format {
        Format::Json => with_newline(export_json(&snapshot)?),
        Format::Csv => export_snapshots_csv(std::slice::from_ref(&snapshot))?,
        Format::Table => snapshot_table(&snapshot),
    };
    emit(rendered, None)
}

fn snapshot_table(s: &IndicatorSnapshot) -> String {
    let mut out = format!("=== {} ({}) {} ===\n", s.symbol, s.segment, s.date);
    for (name, value) in VALUE_COLUMNS.iter().zip(s.values()) {
        out.push_str(&format!("{name:<14} {}\n", cell(value, 4)));
    }
    out
}

fn run_demo(config: &Config, synthetic: SyntheticConfig, progress: &dyn RefreshProgress) -> Result<()> {
    let universe = SyntheticUniverse::generate(&synthetic);
    let Some(last) = universe.last_date() else {
        bail!("--days must be at least 1");
    };

    let parquet = Arc::new(ParquetStore::new(&config.storage.data_dir));
    let inserted = parquet.insert_bars(universe.bars())?;
    println!(
        "Generated {} bars for {} listed and {} otc symbols ({} trading days); {} written to {}",
        universe.bars().len(),
        synthetic.listed_symbols,
        synthetic.otc_symbols,
        universe.trading_dates().len(),
        inserted,
        config.storage.data_dir.display()
    );

    let store: Arc<dyn MarketStore> = parquet;
    let job = RefreshJob::new(store.clone(), config.refresh.clone());
    for segment in MarketSegment::ALL {
        job.refresh(last, segment, Some(progress))?;
    }

    let service = QueryService::new(store, config.clone());
    for segment in MarketSegment::ALL {
        if let Some(reading) = service.sentiment(segment, Some(last))? {
            print!("{}", sentiment_table(&reading));
        }
    }
    Ok(())
}

fn cell(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.decimals$}"))
}
