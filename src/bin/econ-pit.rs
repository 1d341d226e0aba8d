//! econ-pit CLI - batch driver for the point-in-time analytics
//!
//! ## Example Usage
//!
//! ```bash
//! # Monthly/quarterly aggregates and forward returns over full history
//! econ-pit aggregate observations.csv --out-dir out/
//!
//! # Month-start snapshots persisted to SQLite
//! econ-pit snapshot observations.csv --start 2020-01-01 --end 2024-12-31 --db snapshots.db
//!
//! # Correlation analysis as of a date
//! econ-pit correlate observations.csv --as-of 2024-06-30 --top 10
//!
//! # Realized 1/3/6-month returns after a backtest date, against SPY
//! econ-pit backtest observations.csv --date 2023-06-01 --symbols XLK,XLE
//! ```

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use econ_pit::prelude::*;
use econ_pit::frame;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process;

/// econ-pit: point-in-time forward-return and correlation analytics
#[derive(Parser)]
#[command(name = "econ-pit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Point-in-time forward-return and correlation analytics", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Process entities and anchors on one thread
    #[arg(long, global = true)]
    sequential: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum AnchorKind {
    MonthStart,
    QuarterEnd,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate, gap-fill and compute forward returns over full history
    Aggregate {
        /// Input CSV (entity_id,date,value,category[,volume])
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Directory for output tables
        #[arg(short = 'o', long, default_value = "out")]
        out_dir: PathBuf,

        #[arg(short = 'f', long, value_enum, default_value = "csv")]
        format: OutputFormat,
    },

    /// Compute point-in-time snapshots over a range of anchor dates
    Snapshot {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// First anchor date (YYYY-MM-DD)
        #[arg(short = 's', long)]
        start: String,

        /// Last anchor date (YYYY-MM-DD)
        #[arg(short = 'e', long)]
        end: String,

        #[arg(long, value_enum, default_value = "month-start")]
        anchors: AnchorKind,

        /// SQLite database for snapshot partitions
        #[arg(long)]
        db: Option<PathBuf>,

        /// Also write the snapshot rows as a table
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Audit forward returns of each snapshot
        #[arg(long)]
        audit: bool,
    },

    /// Correlate indicator changes with forward returns
    Correlate {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Analysis date; defaults to the last date in the input
        #[arg(long)]
        as_of: Option<String>,

        /// Print the N strongest (entity, series) pairs
        #[arg(long, default_value = "10")]
        top: usize,

        /// Directory for correlation, quintile and spread tables
        #[arg(short = 'o', long)]
        out_dir: Option<PathBuf>,

        #[arg(short = 'f', long, value_enum, default_value = "csv")]
        format: OutputFormat,
    },

    /// Score symbols by realized returns after a backtest date
    Backtest {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Backtest date (YYYY-MM-DD); returns start at its month
        #[arg(short = 'd', long)]
        date: String,

        /// Comma-separated symbols to score
        #[arg(long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,

        /// Write the returns table to this file (.csv or .parquet)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref(), cli.sequential).and_then(|config| {
        if cli.verbose {
            println!("{} v{}", "econ-pit".cyan().bold(), env!("CARGO_PKG_VERSION"));
        }
        match cli.command {
            Commands::Aggregate {
                input,
                out_dir,
                format,
            } => run_aggregate(config, &input, &out_dir, format),
            Commands::Snapshot {
                input,
                start,
                end,
                anchors,
                db,
                output,
                audit,
            } => run_snapshot(SnapshotArgs {
                config,
                input,
                start,
                end,
                anchors,
                db,
                output,
                audit,
            }),
            Commands::Correlate {
                input,
                as_of,
                top,
                out_dir,
                format,
            } => run_correlate(config, &input, as_of.as_deref(), top, out_dir.as_deref(), format),
            Commands::Backtest {
                input,
                date,
                symbols,
                output,
            } => run_backtest(config, &input, &date, &symbols, output.as_deref()),
        }
    });

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>, sequential: bool) -> Result<AnalyticsConfig> {
    let mut config = match path {
        Some(path) => AnalyticsConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalyticsConfig::default(),
    };
    if sequential {
        config.parallel = false;
    }
    Ok(config)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Invalid date '{}'", s))
}

fn load_dataset(input: &Path) -> Result<Dataset> {
    let dataset = Dataset::from_csv_path(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    println!(
        "  {} {} entities, {} points",
        "Loaded:".bold(),
        dataset.len(),
        dataset.point_count()
    );
    Ok(dataset)
}

fn write_frame(df: &mut polars::prelude::DataFrame, dir: &Path, name: &str, format: OutputFormat) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.{}", name, format.extension()));
    match format {
        OutputFormat::Csv => frame::write_csv(df, &path)?,
        OutputFormat::Parquet => frame::write_parquet(df, &path)?,
    }
    println!("  {} {} ({} rows)", "✓".green().bold(), path.display(), df.height());
    Ok(())
}

fn run_aggregate(config: AnalyticsConfig, input: &Path, out_dir: &Path, format: OutputFormat) -> Result<()> {
    println!("{}", "Running pipeline...".cyan().bold());
    let dataset = load_dataset(input)?;
    let output = PipelineEngine::new(config)?.run(&dataset);

    for excluded in &output.excluded {
        println!("  {} {} ({})", "Excluded:".yellow(), excluded.entity_id, excluded.grain);
    }

    write_frame(&mut frame::aggregates_frame(&output.aggregates())?, out_dir, "period_aggregates", format)?;
    write_frame(
        &mut frame::forward_returns_frame(&output.forward_return_records())?,
        out_dir,
        "forward_returns",
        format,
    )?;
    write_frame(
        &mut frame::economic_changes_frame(&output.economic_changes())?,
        out_dir,
        "economic_changes",
        format,
    )?;
    Ok(())
}

struct SnapshotArgs {
    config: AnalyticsConfig,
    input: PathBuf,
    start: String,
    end: String,
    anchors: AnchorKind,
    db: Option<PathBuf>,
    output: Option<PathBuf>,
    audit: bool,
}

fn run_snapshot(args: SnapshotArgs) -> Result<()> {
    let start = parse_date(&args.start)?;
    let end = parse_date(&args.end)?;
    if start > end {
        bail!("start {} is after end {}", start, end);
    }

    println!("{}", "Computing snapshots...".cyan().bold());
    let dataset = load_dataset(&args.input)?;
    let anchors = match args.anchors {
        AnchorKind::MonthStart => month_start_anchors(start, end),
        AnchorKind::QuarterEnd => quarter_end_anchors(start, end),
    };
    let audit = ForwardReturnAudit::new(&args.config);
    let engine = SnapshotEngine::new(args.config)?;

    let pb = ProgressBar::new(anchors.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    let progress = |anchor: NaiveDate, _idx: usize, _total: usize| {
        pb.set_message(anchor.to_string());
        pb.inc(1);
    };

    let (summary, rows) = match &args.db {
        Some(db) => {
            let mut store = SqlitePartitionStore::new(db)
                .with_context(|| format!("Failed to open {}", db.display()))?;
            let summary = engine.run_with_progress(&dataset, &anchors, &mut store, progress)?;
            (summary, stored_rows(&store)?)
        }
        None => {
            let mut store = InMemoryPartitionStore::new();
            let summary = engine.run_with_progress(&dataset, &anchors, &mut store, progress)?;
            (summary, stored_rows(&store)?)
        }
    };
    pb.finish_with_message("done");

    println!(
        "  {} {} anchors, {} partitions, {} rows",
        "Snapshots:".bold(),
        summary.anchors,
        summary.partitions,
        summary.rows
    );

    if args.audit {
        let reports = audit.audit_records(&rows);
        let errors = reports.iter().filter(|r| r.severity == Severity::Error).count();
        let status = if errors == 0 { "✓".green().bold() } else { "✗".red().bold() };
        println!(
            "  {} audit: {} errors, {} warnings",
            status,
            errors,
            reports.len() - errors
        );
        for report in reports.iter().filter(|r| r.severity == Severity::Error) {
            println!("    {} {:?}", report.entity_id, report.anomaly_type);
        }
    }

    if let Some(output) = &args.output {
        let mut df = frame::snapshot_frame(&rows)?;
        match output.extension().and_then(|e| e.to_str()) {
            Some("parquet") => frame::write_parquet(&mut df, output)?,
            _ => frame::write_csv(&mut df, output)?,
        }
        println!("  {} {} ({} rows)", "✓".green().bold(), output.display(), df.height());
    }
    Ok(())
}

fn stored_rows<S: PartitionStore>(store: &S) -> Result<Vec<SnapshotRecord>> {
    let mut rows = Vec::new();
    for date in store.snapshot_dates()? {
        rows.extend(store.snapshot_rows(date)?);
    }
    Ok(rows)
}

fn run_correlate(
    config: AnalyticsConfig,
    input: &Path,
    as_of: Option<&str>,
    top: usize,
    out_dir: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    println!("{}", "Running correlation analysis...".cyan().bold());
    let dataset = load_dataset(input)?;
    let as_of = match as_of {
        Some(s) => parse_date(s)?,
        None => match dataset.last_date() {
            Some(date) => date,
            None => bail!("input has no observations"),
        },
    };

    let snapshot = SnapshotEngine::new(config)?.correlation_snapshot(&dataset, as_of);
    let report = &snapshot.report;
    println!(
        "  {} as of {}: {} correlations, {} quintile rows, {} spreads",
        "Report:".bold(),
        as_of,
        report.correlations.len(),
        report.quintiles.len(),
        report.spreads.len()
    );

    if !report.correlations.is_empty() {
        println!("{}", "Strongest correlations".green().bold());
        for row in report.top_correlations(top) {
            println!(
                "  {:<12} {:<16} {} {:>7.3} (n={})",
                row.entity_id, row.series_id, row.horizon, row.correlation_coefficient, row.observation_count
            );
        }
    }

    if let Some(dir) = out_dir {
        let (mut correlations, mut quintiles, mut spreads) = frame::report_frames(report)?;
        write_frame(&mut correlations, dir, "correlations", format)?;
        write_frame(&mut quintiles, dir, "quintiles", format)?;
        write_frame(&mut spreads, dir, "spreads", format)?;
    }
    Ok(())
}

fn run_backtest(
    config: AnalyticsConfig,
    input: &Path,
    date: &str,
    symbols: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let backtest_date = parse_date(date)?;
    println!("{}", "Scoring backtest...".cyan().bold());
    let dataset = load_dataset(input)?;

    let symbols: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
    let scored = SnapshotEngine::new(config)?.backtest_returns(&dataset, backtest_date, &symbols);

    let fmt = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v));
    for row in &scored {
        println!("  {} vs {}", row.entity_id.bold(), row.benchmark_id);
        for r in &row.returns {
            let outperformance = match r.outperformance {
                Some(v) if v >= 0.0 => format!("{:+.2}", v).green(),
                Some(v) => format!("{:+.2}", v).red(),
                None => "-".normal(),
            };
            println!(
                "    {:>2}m  actual {:>8}  benchmark {:>8}  outperformance {:>8}",
                r.months,
                fmt(r.actual_return),
                fmt(r.benchmark_return),
                outperformance
            );
        }
    }

    if let Some(output) = output {
        let mut df = frame::backtest_returns_frame(&scored)?;
        match output.extension().and_then(|e| e.to_str()) {
            Some("parquet") => frame::write_parquet(&mut df, output)?,
            _ => frame::write_csv(&mut df, output)?,
        }
        println!("  {} {} ({} rows)", "✓".green().bold(), output.display(), df.height());
    }
    Ok(())
}
