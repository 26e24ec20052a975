//! slotdb CLI
//!
//! Command-line interface for operating on a storage root directly:
//! - Record samples and import CSV files
//! - Run point, range, and reduction queries
//! - Inspect series and reclaim old slots

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use slotdb::config::{generate_default_config, parse_duration_ms, Config};
use slotdb::storage::{
    InterpolationMode, Quality, RangeData, Recorder, ReductionKind, Sample,
};

#[derive(Parser)]
#[command(name = "slotdb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Slotted time-series recording engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage root (overrides config)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output format (table, csv, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a series with an explicit interpolation mode
    Create {
        /// Series id
        series: String,
        /// Interpolation mode: none, steps, linear
        #[arg(short, long, default_value = "none")]
        mode: InterpolationMode,
    },

    /// Record one sample
    Record {
        /// Series id
        series: String,
        /// Value
        value: f64,
        /// Timestamp (default: now). Supports "now", ISO 8601, Unix millis
        #[arg(short, long)]
        time: Option<String>,
        /// Mark the sample as bad quality (placeholder)
        #[arg(long)]
        bad: bool,
    },

    /// Import samples from a CSV file (timestamp,value[,quality] columns)
    Import {
        /// Series id
        series: String,
        /// Path to CSV file
        path: PathBuf,
        /// Timestamp column (0-indexed)
        #[arg(long, default_value = "0")]
        timestamp_col: usize,
        /// Value column (0-indexed)
        #[arg(long, default_value = "1")]
        value_col: usize,
        /// Optional quality column holding "good" or "bad"
        #[arg(long)]
        quality_col: Option<usize>,
    },

    /// Query a time range
    Query {
        /// Series id
        series: String,
        /// Time range ending now (e.g. 15m, 6h, 7d)
        #[arg(short, long, default_value = "1d")]
        last: String,
        /// Range start (overrides --last)
        #[arg(long)]
        from: Option<String>,
        /// Range end (default: now)
        #[arg(long)]
        to: Option<String>,
    },

    /// Interpolated value at a point in time
    At {
        /// Series id
        series: String,
        /// Timestamp ("now", ISO 8601, Unix millis)
        time: String,
        /// Override the series' interpolation mode
        #[arg(short, long)]
        mode: Option<InterpolationMode>,
    },

    /// Reduce a series into fixed windows
    Reduce {
        /// Source series id
        source: String,
        /// Target series id
        target: String,
        /// Window width (e.g. 15m, 1h, 1d)
        #[arg(short, long, default_value = "1h")]
        window: String,
        /// Strategy: average, min, max, count, integral
        #[arg(short, long, default_value = "average")]
        strategy: ReductionKind,
        /// Time range ending now
        #[arg(short, long, default_value = "1d")]
        last: String,
        /// Range start (overrides --last)
        #[arg(long)]
        from: Option<String>,
        /// Range end (default: now)
        #[arg(long)]
        to: Option<String>,
    },

    /// List known series
    Series,

    /// Show storage statistics
    Stats,

    /// Reclaim slots fully older than a cutoff
    DeleteBefore {
        /// Series id
        series: String,
        /// Cutoff timestamp ("now", ISO 8601, Unix millis)
        cutoff: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_default(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.to_string_lossy().to_string();
    }

    init_logging(&config);

    // The config subcommand needs no storage root
    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, &content)?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let mut recorder = Recorder::open(config.storage.recorder_config()?)
        .context("failed to open storage root")?;

    match cli.command {
        Commands::Create { series, mode } => {
            recorder.create_series(&series, mode)?;
            println!("Created {} ({})", series, mode);
        }

        Commands::Record {
            series,
            value,
            time,
            bad,
        } => {
            let timestamp = parse_time(time.as_deref().unwrap_or("now"))?;
            let quality = if bad { Quality::Bad } else { Quality::Good };
            recorder.record(&series, Sample::with_quality(timestamp, value, quality))?;
            recorder.flush()?;
            println!("Recorded {}: {} at {}", series, value, format_time(timestamp));
        }

        Commands::Import {
            series,
            path,
            timestamp_col,
            value_col,
            quality_col,
        } => {
            let mut reader = csv::Reader::from_path(&path)
                .with_context(|| format!("cannot open {:?}", path))?;

            let mut imported = 0usize;
            let mut failed = 0usize;
            for (row, record) in reader.records().enumerate() {
                let record = record?;
                match parse_csv_row(&record, timestamp_col, value_col, quality_col) {
                    Ok(sample) => {
                        recorder.record(&series, sample)?;
                        imported += 1;
                    }
                    Err(e) => {
                        failed += 1;
                        if failed <= 10 {
                            eprintln!("row {}: {}", row + 2, e);
                        }
                    }
                }
            }
            recorder.flush()?;

            println!("Imported {} samples into {}", imported, series);
            if failed > 0 {
                println!("Skipped {} malformed rows", failed);
            }
        }

        Commands::Query {
            series,
            last,
            from,
            to,
        } => {
            let (start, end) = resolve_range(&last, from.as_deref(), to.as_deref())?;
            let data = recorder.query(&series, start, end)?;
            print_samples(&data, &cli.format);
        }

        Commands::At { series, time, mode } => {
            let timestamp = parse_time(&time)?;
            let result = match mode {
                Some(mode) => recorder.value_at_with_mode(&series, timestamp, mode)?,
                None => recorder.value_at(&series, timestamp)?,
            };
            match result {
                Some(sample) => println!(
                    "{} {} ({})",
                    format_time(sample.timestamp),
                    sample.value,
                    sample.quality
                ),
                None => println!("no value"),
            }
        }

        Commands::Reduce {
            source,
            target,
            window,
            strategy,
            last,
            from,
            to,
        } => {
            let (start, end) = resolve_range(&last, from.as_deref(), to.as_deref())?;
            let width = parse_duration_ms(&window)?;
            let windows = recorder.reduce(&source, start, end, width, strategy, &target)?;
            recorder.flush()?;
            println!(
                "Reduced {} -> {} ({} windows of {})",
                source, target, windows, window
            );
        }

        Commands::Series => {
            let series = recorder.series();
            if series.is_empty() {
                println!("No series yet. Record one with: slotdb record <series> <value>");
            } else {
                println!("{:<40} {}", "Series", "Mode");
                println!("{}", "-".repeat(50));
                for id in series {
                    let mode = recorder.mode(&id)?;
                    println!("{:<40} {}", id, mode);
                }
            }
        }

        Commands::Stats => {
            let stats = recorder.stats()?;
            println!("slotdb v{}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("{}", stats);
        }

        Commands::DeleteBefore { series, cutoff } => {
            let cutoff = parse_time(&cutoff)?;
            let removed = recorder.delete_before(&series, cutoff)?;
            println!("Reclaimed {} slots from {}", removed, series);
        }

        Commands::Config { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn parse_time(s: &str) -> anyhow::Result<i64> {
    match s {
        "now" => Ok(Utc::now().timestamp_millis()),
        other => {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(other) {
                Ok(dt.timestamp_millis())
            } else if let Ok(ts) = other.parse::<i64>() {
                Ok(ts)
            } else {
                bail!("invalid timestamp: {:?} (use \"now\", ISO 8601, or Unix millis)", other)
            }
        }
    }
}

fn resolve_range(
    last: &str,
    from: Option<&str>,
    to: Option<&str>,
) -> anyhow::Result<(i64, i64)> {
    let end = match to {
        Some(t) => parse_time(t)?,
        None => Utc::now().timestamp_millis(),
    };
    let start = match from {
        Some(f) => parse_time(f)?,
        None => end - parse_duration_ms(last)?,
    };
    Ok((start, end))
}

fn format_time(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn parse_csv_row(
    record: &csv::StringRecord,
    timestamp_col: usize,
    value_col: usize,
    quality_col: Option<usize>,
) -> anyhow::Result<Sample> {
    let raw_ts = record
        .get(timestamp_col)
        .with_context(|| format!("missing timestamp column {}", timestamp_col))?;
    let timestamp = parse_time(raw_ts.trim())?;

    let raw_value = record
        .get(value_col)
        .with_context(|| format!("missing value column {}", value_col))?;
    let value: f64 = raw_value
        .trim()
        .parse()
        .with_context(|| format!("invalid value: {:?}", raw_value))?;

    let quality = match quality_col {
        Some(col) => {
            let raw = record
                .get(col)
                .with_context(|| format!("missing quality column {}", col))?;
            match raw.trim().to_ascii_lowercase().as_str() {
                "good" | "" => Quality::Good,
                "bad" => Quality::Bad,
                other => bail!("invalid quality: {:?}", other),
            }
        }
        None => Quality::Good,
    };

    Ok(Sample::with_quality(timestamp, value, quality))
}

fn print_samples(data: &RangeData, format: &str) {
    match format {
        "json" => {
            match serde_json::to_string_pretty(&data.samples) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("serialization failed: {}", e),
            }
        }
        "csv" => {
            println!("timestamp,value,quality");
            for sample in &data.samples {
                println!("{},{},{}", sample.timestamp, sample.value, sample.quality);
            }
        }
        _ => {
            if data.samples.is_empty() {
                println!("No data for the selected time range");
            } else {
                println!("{:<26} {:>14}  {}", "Time", "Value", "Quality");
                println!("{}", "-".repeat(50));
                for sample in &data.samples {
                    println!(
                        "{:<26} {:>14.4}  {}",
                        format_time(sample.timestamp),
                        sample.value,
                        sample.quality
                    );
                }
            }
        }
    }

    if let Some(error) = &data.error {
        eprintln!();
        eprintln!("warning: history truncated by corruption: {}", error);
    }
}
