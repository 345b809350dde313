//! Waves CLI - Command-line interface for the Healthwaves engine
//!
//! Commands:
//! - insight: Build the insight payload for one metric over a window
//! - sleep: Segment a week of sleep intervals into a timeline
//! - validate: Check input records for values the pipelines would drop
//! - schema: Print output schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use healthwaves_engine::input::{
    parse_datetime, validate_intervals, validate_samples, SampleInput, SleepInput,
    ValidationIssue,
};
use healthwaves_engine::types::{Aggregation, Metric, Sample, SleepInterval};
use healthwaves_engine::window::{aggregate_daily, local_at_hour, Window};
use healthwaves_engine::{EngineError, InsightEngine, ENGINE_VERSION};

/// Waves - Health analytics and sleep segmentation
#[derive(Parser)]
#[command(name = "waves")]
#[command(author = "Healthwaves")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Summarize health metrics and segment sleep", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Input format
    #[arg(long, global = true, default_value = "json")]
    input_format: InputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the insight payload for one metric
    Insight {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Metric id (steps, heartRate, activeEnergy, exerciseMinutes) or a free label
        #[arg(short, long)]
        metric: String,

        /// Unit label (required for metrics outside the catalogue)
        #[arg(long)]
        unit: Option<String>,

        /// Window start (YYYY-MM-DD or RFC 3339)
        #[arg(long, requires = "end", conflicts_with = "days")]
        start: Option<String>,

        /// Window end, exclusive (YYYY-MM-DD or RFC 3339)
        #[arg(long, requires = "start")]
        end: Option<String>,

        /// Look back this many days from now instead of --start/--end
        #[arg(long)]
        days: Option<u32>,

        /// UTC offset calendar days are taken in (e.g. "+02:00")
        #[arg(long, default_value = "+00:00")]
        utc_offset: String,

        /// Collapse raw readings per day before summarizing
        #[arg(long)]
        aggregate: Option<AggregateMode>,

        /// Add a zero-valued sample for each day without data
        #[arg(long)]
        fill_missing: bool,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Segment a week of sleep intervals
    Sleep {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// First day of the week (YYYY-MM-DD)
        #[arg(long, conflicts_with = "weeks_back")]
        week_start: Option<String>,

        /// Weeks before the current one (0 is this week)
        #[arg(long, default_value = "0")]
        weeks_back: u32,

        /// UTC offset nights are taken in (e.g. "-08:00")
        #[arg(long, default_value = "+00:00")]
        utc_offset: String,

        /// Include per-night totals
        #[arg(long)]
        nights: bool,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Validate input records
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Record kind
        #[arg(long, default_value = "samples")]
        kind: RecordKind,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print output schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Compact JSON on one line
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum AggregateMode {
    /// Sum readings per day
    Sum,
    /// Average readings per day
    Average,
    /// Input is already one sample per day
    None,
}

#[derive(Clone, Copy, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
enum RecordKind {
    /// `{timestamp, value}` metric samples
    Samples,
    /// `{start, end, stage}` sleep intervals
    Sleep,
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaType {
    /// Insight payload
    Insight,
    /// Sleep timeline
    Sleep,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), WavesCliError> {
    let engine = match &cli.config {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            log::debug!("loaded configuration from {}", path.display());
            InsightEngine::from_config_json(&json)?
        }
        None => InsightEngine::new(),
    };

    match cli.command {
        Commands::Insight {
            input,
            metric,
            unit,
            start,
            end,
            days,
            utc_offset,
            aggregate,
            fill_missing,
            output_format,
        } => {
            let tz = parse_utc_offset(&utc_offset)?;
            let window = match (start, end, days) {
                (Some(start), Some(end), _) => {
                    Window::new(parse_bound(&start, &tz)?, parse_bound(&end, &tz)?)?
                }
                (_, _, Some(days)) => Window::lookback(Utc::now().with_timezone(&tz), days)?,
                _ => return Err(WavesCliError::MissingWindow),
            };
            cmd_insight(
                &engine,
                &input,
                cli.input_format,
                &metric,
                unit.as_deref(),
                &window,
                aggregate,
                fill_missing,
                output_format,
            )
        }

        Commands::Sleep {
            input,
            week_start,
            weeks_back,
            utc_offset,
            nights,
            output_format,
        } => {
            let tz = parse_utc_offset(&utc_offset)?;
            let week = match week_start {
                Some(day) => Window::week_from(&tz, parse_day(&day, &tz)?),
                None => engine.weeks_back(&Utc::now().with_timezone(&tz), weeks_back)?,
            };
            cmd_sleep(&engine, &input, cli.input_format, &week, nights, output_format)
        }

        Commands::Validate { input, kind, json } => {
            cmd_validate(&input, cli.input_format, kind, json)
        }

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_insight(
    engine: &InsightEngine,
    input: &Path,
    input_format: InputFormat,
    metric: &str,
    unit: Option<&str>,
    window: &Window<FixedOffset>,
    aggregate: Option<AggregateMode>,
    fill_missing: bool,
    output_format: OutputFormat,
) -> Result<(), WavesCliError> {
    let known: Option<Metric> = metric.parse().ok();
    let (label, unit) = match (known, unit) {
        (_, Some(unit)) => (known.map_or(metric, |m| m.label()), unit),
        (Some(m), None) => (m.label(), m.unit()),
        (None, None) => return Err(EngineError::UnknownMetric(metric.to_string()).into()),
    };

    let samples = read_samples(input, input_format)?;
    log::info!("read {} samples for {}", samples.len(), label);

    let aggregation = match aggregate {
        Some(AggregateMode::Sum) => Some(Aggregation::Sum),
        Some(AggregateMode::Average) => Some(Aggregation::Average),
        Some(AggregateMode::None) => None,
        None => known.map(|m| m.aggregation()),
    };

    let samples = match aggregation {
        Some(aggregation) => aggregate_daily(&samples, &window.start.timezone(), aggregation),
        None => samples,
    };

    let payload = engine.insight(label, unit, window, &samples, fill_missing);
    println!("{}", format_output(&payload, output_format)?);

    Ok(())
}

fn cmd_sleep(
    engine: &InsightEngine,
    input: &Path,
    input_format: InputFormat,
    week: &Window<FixedOffset>,
    nights: bool,
    output_format: OutputFormat,
) -> Result<(), WavesCliError> {
    let intervals = read_intervals(input, input_format)?;
    log::info!(
        "read {} sleep intervals for week starting {}",
        intervals.len(),
        week.start.date_naive()
    );

    let output = if nights {
        format_output(&engine.sleep_report(&intervals, week), output_format)?
    } else {
        format_output(&engine.sleep_timeline(&intervals, week), output_format)?
    };
    println!("{}", output);

    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    kind: RecordKind,
    json: bool,
) -> Result<(), WavesCliError> {
    let (total, issues) = match kind {
        RecordKind::Samples => {
            let samples = read_samples(input, input_format)?;
            (samples.len(), validate_samples(&samples))
        }
        RecordKind::Sleep => {
            let intervals = read_intervals(input, input_format)?;
            (intervals.len(), validate_intervals(&intervals))
        }
    };

    let invalid = issues.iter().map(|i| i.index).collect::<BTreeSet<_>>().len();
    let report = ValidationReport {
        kind,
        total_records: total,
        valid_records: total - invalid,
        invalid_records: invalid,
        issues,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.issues.is_empty() {
            println!("\nIssues:");
            for issue in &report.issues {
                println!("  - Record {}: {}", issue.index, issue.message);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(WavesCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), WavesCliError> {
    match schema_type {
        SchemaType::Insight => {
            if json_schema {
                println!("{}", insight_json_schema());
            } else {
                println!("Insight Payload");
                println!();
                println!("- metric, unit: Labels for the series");
                println!("- startISO, endISO: Window bounds (UTC, RFC 3339)");
                println!("- daily: [{{ dateISO (YYYY-MM-DD), value }}] in chronological order");
                println!("- summary:");
                println!("  - mean, stdDev (population), min, max");
                println!("  - last7Avg, prev7Avg, weekOverWeekPct (null when unavailable)");
                println!("  - outliers: [{{ dateISO, value, z }}] with |z| >= threshold");
                println!("  - missingDays: number of zero-valued days");
            }
        }
        SchemaType::Sleep => {
            if json_schema {
                println!("{}", sleep_json_schema());
            } else {
                println!("Sleep Timeline");
                println!();
                println!("- domainStart, domainEnd: Clamped time axis (UTC)");
                println!("- segments: [{{ night, start, end, stage }}] ordered by night, then start");
                println!("  - night: Calendar day the interval ends on (YYYY-MM-DD)");
                println!("  - stage: awake, rem, core, deep, unspecified, inBed, unknown");
                println!("- totalAsleepSeconds: Sum over every stage except awake and unknown");
                println!();
                println!("With --nights, also:");
                println!("- nights: [{{ night, asleepSeconds, segmentCount, stages }}]");
                println!("- averageNightlyHours: Asleep hours spread over the week's days");
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, WavesCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_samples(input: &Path, format: InputFormat) -> Result<Vec<Sample>, WavesCliError> {
    let data = read_input(input)?;
    let samples = match format {
        InputFormat::Ndjson => SampleInput::parse_ndjson(&data)?,
        InputFormat::Json => SampleInput::parse_array(&data)?,
    };
    if samples.is_empty() {
        log::warn!("input contains no samples");
    }
    Ok(samples)
}

fn read_intervals(input: &Path, format: InputFormat) -> Result<Vec<SleepInterval>, WavesCliError> {
    let data = read_input(input)?;
    let intervals = match format {
        InputFormat::Ndjson => SleepInput::parse_ndjson(&data)?,
        InputFormat::Json => SleepInput::parse_array(&data)?,
    };
    if intervals.is_empty() {
        log::warn!("input contains no sleep intervals");
    }
    Ok(intervals)
}

fn format_output<T: Serialize>(value: &T, format: OutputFormat) -> Result<String, WavesCliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(value)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(value)?),
    }
}

/// Accepts "Z", "UTC", "+02:00" or "-0800"
fn parse_utc_offset(s: &str) -> Result<FixedOffset, WavesCliError> {
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| WavesCliError::InvalidOffset(s.to_string()));
    }
    DateTime::parse_from_str(&format!("2000-01-01T00:00:00{s}"), "%Y-%m-%dT%H:%M:%S%z")
        .map(|dt| *dt.offset())
        .map_err(|_| WavesCliError::InvalidOffset(s.to_string()))
}

/// A date alone is local midnight; a full timestamp keeps its instant
fn parse_bound(s: &str, tz: &FixedOffset) -> Result<DateTime<FixedOffset>, WavesCliError> {
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(local_at_hour(tz, day, 0).with_timezone(tz));
    }
    Ok(parse_datetime(s)?.with_timezone(tz))
}

fn parse_day(s: &str, tz: &FixedOffset) -> Result<NaiveDate, WavesCliError> {
    Ok(parse_bound(s, tz)?.date_naive())
}

fn insight_json_schema() -> String {
    let outlier = serde_json::json!({
        "type": "object",
        "required": ["dateISO", "value", "z"],
        "properties": {
            "dateISO": { "type": "string", "format": "date" },
            "value": { "type": "number" },
            "z": { "type": "number" }
        }
    });

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "InsightPayload",
        "type": "object",
        "required": ["metric", "unit", "startISO", "endISO", "daily", "summary"],
        "properties": {
            "metric": { "type": "string" },
            "unit": { "type": "string" },
            "startISO": { "type": "string", "format": "date-time" },
            "endISO": { "type": "string", "format": "date-time" },
            "daily": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["dateISO", "value"],
                    "properties": {
                        "dateISO": { "type": "string", "format": "date" },
                        "value": { "type": "number" }
                    }
                }
            },
            "summary": {
                "type": "object",
                "required": [
                    "mean", "stdDev", "min", "max", "last7Avg", "prev7Avg",
                    "weekOverWeekPct", "outliers", "missingDays"
                ],
                "properties": {
                    "mean": { "type": "number" },
                    "stdDev": { "type": "number" },
                    "min": { "type": "number" },
                    "max": { "type": "number" },
                    "last7Avg": { "type": ["number", "null"] },
                    "prev7Avg": { "type": ["number", "null"] },
                    "weekOverWeekPct": { "type": ["number", "null"] },
                    "outliers": { "type": "array", "items": outlier },
                    "missingDays": { "type": "integer", "minimum": 0 }
                }
            }
        }
    })
    .to_string()
}

fn sleep_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "SleepTimeline",
        "type": "object",
        "required": ["domainStart", "domainEnd", "segments", "totalAsleepSeconds"],
        "properties": {
            "domainStart": { "type": "string", "format": "date-time" },
            "domainEnd": { "type": "string", "format": "date-time" },
            "segments": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["night", "start", "end", "stage"],
                    "properties": {
                        "night": { "type": "string", "format": "date" },
                        "start": { "type": "string", "format": "date-time" },
                        "end": { "type": "string", "format": "date-time" },
                        "stage": {
                            "type": "string",
                            "enum": ["awake", "rem", "core", "deep", "unspecified", "inBed", "unknown"]
                        }
                    }
                }
            },
            "totalAsleepSeconds": { "type": "number", "minimum": 0 }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum WavesCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    MissingWindow,
    InvalidOffset(String),
    ValidationFailed(usize),
}

impl From<io::Error> for WavesCliError {
    fn from(e: io::Error) -> Self {
        WavesCliError::Io(e)
    }
}

impl From<EngineError> for WavesCliError {
    fn from(e: EngineError) -> Self {
        WavesCliError::Engine(e)
    }
}

impl From<serde_json::Error> for WavesCliError {
    fn from(e: serde_json::Error) -> Self {
        WavesCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<WavesCliError> for CliError {
    fn from(e: WavesCliError) -> Self {
        match e {
            WavesCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            WavesCliError::Engine(e) => {
                let (code, hint) = match &e {
                    EngineError::ParseError(_) | EngineError::JsonError(_) => {
                        ("PARSE_ERROR", "Check --input-format and record fields")
                    }
                    EngineError::DateParseError(_) => {
                        ("DATE_ERROR", "Use YYYY-MM-DD or RFC 3339 timestamps")
                    }
                    EngineError::InvalidWindow(_) => (
                        "WINDOW_ERROR",
                        "Use an end after the start, or a smaller --days or --weeks-back",
                    ),
                    EngineError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", "Fix the configuration file and retry")
                    }
                    EngineError::UnknownMetric(_) => (
                        "METRIC_ERROR",
                        "Use steps, heartRate, activeEnergy or exerciseMinutes, or pass --unit",
                    ),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            WavesCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            WavesCliError::MissingWindow => CliError {
                code: "MISSING_WINDOW".to_string(),
                message: "No analysis window given".to_string(),
                hint: Some("Pass --start and --end, or --days".to_string()),
            },
            WavesCliError::InvalidOffset(offset) => CliError {
                code: "OFFSET_ERROR".to_string(),
                message: format!("Invalid UTC offset '{}'", offset),
                hint: Some("Use a form like +02:00, -0800 or Z".to_string()),
            },
            WavesCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation issues and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ValidationReport {
    kind: RecordKind,
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    issues: Vec<ValidationIssue>,
}
