//! Core types for the Healthwaves engine
//!
//! This module defines the values that flow through both pipelines: raw samples and
//! sleep intervals coming in, daily points, summaries, insight payloads and sleep
//! segments going out. Field names on the wire match what the remote analysis
//! service and the presentation layer expect.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// A raw timestamped reading for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the reading was taken (UTC)
    pub timestamp: DateTime<Utc>,
    /// Reading value in the metric's unit
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One sample projected onto its calendar day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    #[serde(rename = "dateISO")]
    pub date: NaiveDate,
    pub value: f64,
}

/// A sample whose z-score magnitude reached the outlier threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outlier {
    #[serde(rename = "dateISO")]
    pub date: NaiveDate,
    pub value: f64,
    pub z: f64,
}

/// Descriptive statistics, trend and outliers over a daily series
///
/// Optional fields always serialize, as `null` when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Mean of the most recent week of values
    pub last7_avg: Option<f64>,
    /// Mean of the week before the most recent one
    pub prev7_avg: Option<f64>,
    pub week_over_week_pct: Option<f64>,
    pub outliers: Vec<Outlier>,
    /// Number of zero-valued samples
    pub missing_days: u32,
}

/// Complete statistics output for one metric over one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightPayload {
    pub metric: String,
    pub unit: String,
    #[serde(rename = "startISO")]
    pub start_iso: String,
    #[serde(rename = "endISO")]
    pub end_iso: String,
    pub daily: Vec<DailyPoint>,
    pub summary: Summary,
}

/// How raw samples collapse into one value per day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Cumulative quantities (steps, energy, minutes)
    Sum,
    /// Discrete quantities (heart rate)
    Average,
}

/// Metrics the engine knows a label and unit for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Steps,
    HeartRate,
    ActiveEnergy,
    ExerciseMinutes,
}

impl Metric {
    /// Human-readable label sent as `metric` in the payload
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Steps => "Steps",
            Metric::HeartRate => "Heart Rate",
            Metric::ActiveEnergy => "Active Energy",
            Metric::ExerciseMinutes => "Exercise Minutes",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Steps => "count",
            Metric::HeartRate => "bpm",
            Metric::ActiveEnergy => "kcal",
            Metric::ExerciseMinutes => "min",
        }
    }

    pub fn aggregation(&self) -> Aggregation {
        match self {
            Metric::HeartRate => Aggregation::Average,
            Metric::Steps | Metric::ActiveEnergy | Metric::ExerciseMinutes => Aggregation::Sum,
        }
    }
}

impl FromStr for Metric {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "steps" | "stepcount" => Ok(Metric::Steps),
            "heartrate" | "hr" => Ok(Metric::HeartRate),
            "activeenergy" | "activeenergyburned" | "energy" => Ok(Metric::ActiveEnergy),
            "exerciseminutes" | "exercise" | "appleexercisetime" => Ok(Metric::ExerciseMinutes),
            _ => Err(EngineError::UnknownMetric(s.to_string())),
        }
    }
}

/// Sleep stage classification
///
/// Decoding never fails: unrecognized codes and labels become [`SleepStage::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StageRepr")]
pub enum SleepStage {
    Awake,
    Rem,
    Core,
    Deep,
    Unspecified,
    InBed,
    Unknown,
}

impl SleepStage {
    pub const ALL: [SleepStage; 7] = [
        SleepStage::Awake,
        SleepStage::Rem,
        SleepStage::Core,
        SleepStage::Deep,
        SleepStage::Unspecified,
        SleepStage::InBed,
        SleepStage::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SleepStage::Awake => "awake",
            SleepStage::Rem => "rem",
            SleepStage::Core => "core",
            SleepStage::Deep => "deep",
            SleepStage::Unspecified => "unspecified",
            SleepStage::InBed => "inBed",
            SleepStage::Unknown => "unknown",
        }
    }

    /// Whether time in this stage counts toward total asleep.
    ///
    /// `InBed` counts as asleep.
    pub fn is_asleep(&self) -> bool {
        !matches!(self, SleepStage::Awake | SleepStage::Unknown)
    }

    /// Map a HealthKit `HKCategoryValueSleepAnalysis` raw value
    pub fn from_raw_value(code: i64) -> Self {
        match code {
            0 => SleepStage::InBed,
            1 => SleepStage::Unspecified,
            2 => SleepStage::Awake,
            3 => SleepStage::Core,
            4 => SleepStage::Deep,
            5 => SleepStage::Rem,
            _ => SleepStage::Unknown,
        }
    }

    /// Map a textual stage name from any supported data source
    pub fn from_label(label: &str) -> Self {
        let key: String = label
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "awake" | "wake" => SleepStage::Awake,
            "rem" | "asleeprem" => SleepStage::Rem,
            "core" | "light" | "asleepcore" => SleepStage::Core,
            "deep" | "asleepdeep" => SleepStage::Deep,
            "unspecified" | "asleep" | "asleepunspecified" => SleepStage::Unspecified,
            "inbed" => SleepStage::InBed,
            _ => SleepStage::Unknown,
        }
    }
}

impl fmt::Display for SleepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire representations a stage may arrive in
#[derive(Deserialize)]
#[serde(untagged)]
enum StageRepr {
    Code(i64),
    Label(String),
    Other(serde_json::Value),
}

impl From<StageRepr> for SleepStage {
    fn from(repr: StageRepr) -> Self {
        match repr {
            StageRepr::Code(code) => SleepStage::from_raw_value(code),
            StageRepr::Label(label) => SleepStage::from_label(&label),
            StageRepr::Other(_) => SleepStage::Unknown,
        }
    }
}

/// A raw stage-tagged sleep interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SleepInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub stage: SleepStage,
}

/// A sleep interval clamped to the visualization domain and bucketed to its night
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SleepSegment {
    /// Calendar day of the interval's end (the "wake day")
    pub night: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub stage: SleepStage,
}

impl SleepSegment {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 1000.0
    }
}

/// Render-ready sleep segments for one week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepTimeline {
    /// Lower bound of the clamped time axis
    pub domain_start: DateTime<Utc>,
    /// Upper bound of the clamped time axis
    pub domain_end: DateTime<Utc>,
    /// Segments ordered by night, then start
    pub segments: Vec<SleepSegment>,
    pub total_asleep_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_from_raw_value() {
        assert_eq!(SleepStage::from_raw_value(0), SleepStage::InBed);
        assert_eq!(SleepStage::from_raw_value(3), SleepStage::Core);
        assert_eq!(SleepStage::from_raw_value(5), SleepStage::Rem);
        assert_eq!(SleepStage::from_raw_value(42), SleepStage::Unknown);
        assert_eq!(SleepStage::from_raw_value(-1), SleepStage::Unknown);
    }

    #[test]
    fn test_stage_from_label() {
        assert_eq!(SleepStage::from_label("asleepREM"), SleepStage::Rem);
        assert_eq!(SleepStage::from_label("in_bed"), SleepStage::InBed);
        assert_eq!(SleepStage::from_label("Deep"), SleepStage::Deep);
        assert_eq!(SleepStage::from_label("napping"), SleepStage::Unknown);
    }

    #[test]
    fn test_stage_decoding_never_fails() {
        let stages: Vec<SleepStage> =
            serde_json::from_str(r#"[4, "core", "inBed", 3.5, null, true, "???"]"#).unwrap();
        assert_eq!(
            stages,
            vec![
                SleepStage::Deep,
                SleepStage::Core,
                SleepStage::InBed,
                SleepStage::Unknown,
                SleepStage::Unknown,
                SleepStage::Unknown,
                SleepStage::Unknown,
            ]
        );
    }

    #[test]
    fn test_stage_serializes_camel_case() {
        let json = serde_json::to_string(&SleepStage::InBed).unwrap();
        assert_eq!(json, "\"inBed\"");
    }

    #[test]
    fn test_is_asleep_policy() {
        let asleep: Vec<SleepStage> = SleepStage::ALL
            .into_iter()
            .filter(SleepStage::is_asleep)
            .collect();
        assert_eq!(
            asleep,
            vec![
                SleepStage::Rem,
                SleepStage::Core,
                SleepStage::Deep,
                SleepStage::Unspecified,
                SleepStage::InBed,
            ]
        );
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("heartRate".parse::<Metric>().unwrap(), Metric::HeartRate);
        assert_eq!("active_energy".parse::<Metric>().unwrap(), Metric::ActiveEnergy);
        assert_eq!("Steps".parse::<Metric>().unwrap(), Metric::Steps);
        assert!(matches!(
            "weight".parse::<Metric>(),
            Err(EngineError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_metric_descriptors() {
        assert_eq!(Metric::ActiveEnergy.label(), "Active Energy");
        assert_eq!(Metric::ActiveEnergy.unit(), "kcal");
        assert_eq!(Metric::HeartRate.aggregation(), Aggregation::Average);
        assert_eq!(Metric::Steps.aggregation(), Aggregation::Sum);
    }
}
