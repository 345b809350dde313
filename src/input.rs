//! Input decoding
//!
//! Decodes the records the data-access layer exports into pipeline inputs. Both a
//! JSON array and NDJSON (one record per line) are accepted. Field names follow the
//! HealthKit export (`startDate`, `endDate`, `value`) as well as the short forms.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EngineError;
use crate::types::{Sample, SleepInterval, SleepStage};

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` (UTC) or `YYYY-MM-DD` (UTC midnight)
fn deserialize_flexible_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_datetime(&s).map_err(serde::de::Error::custom)
}

/// Parse a timestamp in any of the accepted formats
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, EngineError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&dt));
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }

    Err(EngineError::DateParseError(format!(
        "'{s}'. Expected 'YYYY-MM-DD' or 'YYYY-MM-DDTHH:MM:SSZ'"
    )))
}

/// Parse a window bound, keeping its UTC offset so calendar days follow the caller.
///
/// Inputs without an offset are read as UTC.
pub fn parse_window_bound(s: &str) -> Result<DateTime<FixedOffset>, EngineError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt);
    }
    Ok(parse_datetime(s)?.with_timezone(&Utc.fix()))
}

#[derive(Debug, Deserialize)]
struct SampleRecord {
    #[serde(
        deserialize_with = "deserialize_flexible_datetime",
        alias = "date",
        alias = "startDate"
    )]
    timestamp: DateTime<Utc>,
    value: f64,
}

impl From<SampleRecord> for Sample {
    fn from(record: SampleRecord) -> Self {
        Sample::new(record.timestamp, record.value)
    }
}

#[derive(Debug, Deserialize)]
struct SleepRecord {
    #[serde(deserialize_with = "deserialize_flexible_datetime", alias = "startDate")]
    start: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_flexible_datetime", alias = "endDate")]
    end: DateTime<Utc>,
    #[serde(alias = "value", default = "unknown_stage")]
    stage: SleepStage,
}

fn unknown_stage() -> SleepStage {
    SleepStage::Unknown
}

impl From<SleepRecord> for SleepInterval {
    fn from(record: SleepRecord) -> Self {
        SleepInterval {
            start: record.start,
            end: record.end,
            stage: record.stage,
        }
    }
}

/// Decoder for metric samples
pub struct SampleInput;

impl SampleInput {
    /// Parse a JSON array of `{timestamp, value}` records
    pub fn parse_array(json: &str) -> Result<Vec<Sample>, EngineError> {
        let records: Vec<SampleRecord> = serde_json::from_str(json)?;
        Ok(records.into_iter().map(Sample::from).collect())
    }

    /// Parse NDJSON `{timestamp, value}` records
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<Sample>, EngineError> {
        let records: Vec<SampleRecord> = parse_ndjson_records(ndjson)?;
        Ok(records.into_iter().map(Sample::from).collect())
    }
}

/// Decoder for sleep intervals
pub struct SleepInput;

impl SleepInput {
    /// Parse a JSON array of `{start, end, stage}` records
    pub fn parse_array(json: &str) -> Result<Vec<SleepInterval>, EngineError> {
        let records: Vec<SleepRecord> = serde_json::from_str(json)?;
        Ok(records.into_iter().map(SleepInterval::from).collect())
    }

    /// Parse NDJSON `{start, end, stage}` records
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<SleepInterval>, EngineError> {
        let records: Vec<SleepRecord> = parse_ndjson_records(ndjson)?;
        Ok(records.into_iter().map(SleepInterval::from).collect())
    }
}

fn parse_ndjson_records<T: DeserializeOwned>(ndjson: &str) -> Result<Vec<T>, EngineError> {
    let mut records = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                return Err(EngineError::ParseError(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(records)
}

/// A record the pipelines will drop or misread
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub index: usize,
    pub message: String,
}

/// Report samples whose value is NaN or infinite
pub fn validate_samples(samples: &[Sample]) -> Vec<ValidationIssue> {
    samples
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.value.is_finite())
        .map(|(index, s)| ValidationIssue {
            index,
            message: format!("non-finite value {} at {}", s.value, s.timestamp),
        })
        .collect()
}

/// Report intervals that end before they start or carry an unrecognized stage
pub fn validate_intervals(intervals: &[SleepInterval]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (index, interval) in intervals.iter().enumerate() {
        if interval.end <= interval.start {
            issues.push(ValidationIssue {
                index,
                message: format!(
                    "interval ends ({}) at or before it starts ({})",
                    interval.end, interval.start
                ),
            });
        }
        if interval.stage == SleepStage::Unknown {
            issues.push(ValidationIssue {
                index,
                message: "unrecognized sleep stage".to_string(),
            });
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_array() {
        let json = r#"[
            {"timestamp": "2024-01-15T08:00:00Z", "value": 5200},
            {"date": "2024-01-16", "value": 6100.5},
            {"startDate": "2024-01-17T09:30:00", "value": 0}
        ]"#;
        let samples = SampleInput::parse_array(json).unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].value, 5200.0);
        assert_eq!(
            samples[1].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap()
        );
        assert_eq!(
            samples[2].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 17, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_sample_ndjson() {
        let ndjson = "{\"timestamp\": \"2024-01-15T08:00:00+02:00\", \"value\": 1}\n\n{\"timestamp\": \"2024-01-16T08:00:00Z\", \"value\": 2}\n";
        let samples = SampleInput::parse_ndjson(ndjson).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(
            samples[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_ndjson_reports_line_number() {
        let ndjson = "{\"timestamp\": \"2024-01-15T08:00:00Z\", \"value\": 1}\nnot json\n";
        let err = SampleInput::parse_ndjson(ndjson).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let json = r#"[{"timestamp": "yesterday", "value": 1}]"#;
        assert!(SampleInput::parse_array(json).is_err());
    }

    #[test]
    fn test_window_bound_keeps_offset() {
        let bound = parse_window_bound("2024-01-08T00:00:00+09:00").unwrap();
        assert_eq!(bound.offset().local_minus_utc(), 9 * 3600);
        assert_eq!(bound.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());

        let plain = parse_window_bound("2024-01-08").unwrap();
        assert_eq!(plain.offset().local_minus_utc(), 0);
        assert_eq!(
            plain.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_sleep_records() {
        let json = r#"[
            {"startDate": "2024-01-08T23:00:00Z", "endDate": "2024-01-09T01:00:00Z", "value": 3},
            {"start": "2024-01-09T01:00:00Z", "end": "2024-01-09T02:00:00Z", "stage": "asleepREM"},
            {"start": "2024-01-09T02:00:00Z", "end": "2024-01-09T02:10:00Z", "stage": "snoozing"},
            {"start": "2024-01-09T02:10:00Z", "end": "2024-01-09T03:00:00Z"}
        ]"#;
        let intervals = SleepInput::parse_array(json).unwrap();

        let stages: Vec<SleepStage> = intervals.iter().map(|i| i.stage).collect();
        assert_eq!(
            stages,
            vec![
                SleepStage::Core,
                SleepStage::Rem,
                SleepStage::Unknown,
                SleepStage::Unknown
            ]
        );
    }

    #[test]
    fn test_validate_samples() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let samples = vec![
            Sample::new(t, 1.0),
            Sample::new(t, f64::NAN),
            Sample::new(t, f64::INFINITY),
        ];
        let issues = validate_samples(&samples);
        let indices: Vec<usize> = issues.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn test_validate_intervals() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let intervals = vec![
            SleepInterval {
                start: t,
                end: t + chrono::Duration::hours(1),
                stage: SleepStage::Deep,
            },
            SleepInterval {
                start: t,
                end: t,
                stage: SleepStage::Unknown,
            },
        ];
        let issues = validate_intervals(&intervals);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.index == 1));
    }
}
