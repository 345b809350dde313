//! Insight payload assembly
//!
//! Composes the sorted daily series, its summary and the window bounds into the JSON
//! document handed to the remote analysis service. No numeric logic lives here; the
//! series and the statistics share one chronological sort.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::error::EngineError;
use crate::stats::{sort_chronologically, to_daily_points, SummaryCalculator};
use crate::types::{InsightPayload, Sample};

/// Builder for insight payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadBuilder {
    calculator: SummaryCalculator,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with a specific summary calculator
    pub fn with_calculator(calculator: SummaryCalculator) -> Self {
        Self { calculator }
    }

    /// Assemble the payload for `samples` over `[start, end)`.
    ///
    /// Daily dates are calendar days in `start`'s timezone; the window bounds are
    /// stamped as UTC RFC 3339 strings.
    pub fn build<Tz: TimeZone>(
        &self,
        metric: &str,
        unit: &str,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
        samples: &[Sample],
    ) -> InsightPayload {
        let tz = start.timezone();
        let sorted = sort_chronologically(samples);
        let daily = to_daily_points(&sorted, &tz);
        let summary = self.calculator.summarize_daily(&daily);

        InsightPayload {
            metric: metric.to_string(),
            unit: unit.to_string(),
            start_iso: iso_string(start),
            end_iso: iso_string(end),
            daily,
            summary,
        }
    }

    /// Assemble and encode to pretty JSON
    pub fn build_json<Tz: TimeZone>(
        &self,
        metric: &str,
        unit: &str,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
        samples: &[Sample],
    ) -> Result<String, EngineError> {
        let payload = self.build(metric, unit, start, end, samples);
        serde_json::to_string_pretty(&payload).map_err(EngineError::JsonError)
    }
}

/// Assemble a payload with the default summary settings
pub fn build_payload<Tz: TimeZone>(
    metric: &str,
    unit: &str,
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
    samples: &[Sample],
) -> InsightPayload {
    PayloadBuilder::new().build(metric, unit, start, end, samples)
}

fn iso_string<Tz: TimeZone>(instant: &DateTime<Tz>) -> String {
    instant
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}
