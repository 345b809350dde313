//! Pipeline orchestration
//!
//! This module provides the public API for the Healthwaves engine. It wires the
//! window utilities, statistics, payload assembly and sleep segmentation together.

use chrono::{DateTime, TimeZone};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::payload::PayloadBuilder;
use crate::sleep::{NightSummary, SleepSegmenter};
use crate::stats::SummaryCalculator;
use crate::types::{InsightPayload, Metric, Sample, SleepInterval, SleepTimeline};
use crate::window::{aggregate_daily, fill_missing_days, Window};

/// Build the insight payload JSON for one metric over `[start, end)`.
///
/// # Arguments
/// * `metric` - Metric label (e.g., "Active Energy")
/// * `unit` - Unit label (e.g., "kcal")
/// * `start` / `end` - Window bounds; calendar days use `start`'s timezone
/// * `samples` - Daily samples, already gap-filled by the caller
///
/// # Example
/// ```ignore
/// let json = build_insight_json("Steps", "count", &start, &end, &samples)?;
/// ```
pub fn build_insight_json<Tz: TimeZone>(
    metric: &str,
    unit: &str,
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
    samples: &[Sample],
) -> Result<String, EngineError> {
    PayloadBuilder::new().build_json(metric, unit, start, end, samples)
}

/// Segment sleep intervals for `[week_start, week_end)` and encode the timeline JSON.
pub fn sleep_timeline_json<Tz: TimeZone>(
    intervals: &[SleepInterval],
    week_start: &DateTime<Tz>,
    week_end: &DateTime<Tz>,
) -> Result<String, EngineError> {
    let timeline = SleepSegmenter::default().segment(intervals, week_start, week_end);
    serde_json::to_string_pretty(&timeline).map_err(EngineError::JsonError)
}

/// Sleep timeline with per-night totals
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepReport {
    #[serde(flatten)]
    pub timeline: SleepTimeline,
    pub nights: Vec<NightSummary>,
    pub average_nightly_hours: f64,
}

/// Engine carrying a configuration for repeated use.
///
/// Holds no state between calls; every method is a pure function of its inputs and
/// the configuration.
#[derive(Debug, Clone, Default)]
pub struct InsightEngine {
    config: EngineConfig,
}

impl InsightEngine {
    /// Create an engine with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with a validated configuration
    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Load configuration from JSON
    pub fn from_config_json(json: &str) -> Result<Self, EngineError> {
        Ok(Self {
            config: EngineConfig::from_json(json)?,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The configured week containing `instant`
    pub fn week_containing<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> Window<Tz> {
        Window::week_containing(instant, self.config.week_starts_on)
    }

    /// The configured week `weeks_back` weeks before the one containing `now`
    pub fn weeks_back<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        weeks_back: u32,
    ) -> Result<Window<Tz>, EngineError> {
        Window::weeks_back(now, weeks_back, self.config.week_starts_on)
    }

    /// Assemble an insight payload, optionally gap-filling the window first
    pub fn insight<Tz: TimeZone>(
        &self,
        metric: &str,
        unit: &str,
        window: &Window<Tz>,
        samples: &[Sample],
        fill_missing: bool,
    ) -> InsightPayload {
        let builder = PayloadBuilder::with_calculator(SummaryCalculator::from_config(&self.config));

        if fill_missing {
            let filled = fill_missing_days(samples, window);
            builder.build(metric, unit, &window.start, &window.end, &filled)
        } else {
            builder.build(metric, unit, &window.start, &window.end, samples)
        }
    }

    /// Aggregate raw readings per day with the metric's rule, gap-fill and assemble
    pub fn insight_for_metric<Tz: TimeZone>(
        &self,
        metric: Metric,
        window: &Window<Tz>,
        raw_samples: &[Sample],
    ) -> InsightPayload {
        let tz = window.start.timezone();
        let daily = aggregate_daily(raw_samples, &tz, metric.aggregation());
        self.insight(metric.label(), metric.unit(), window, &daily, true)
    }

    pub fn insight_json<Tz: TimeZone>(
        &self,
        metric: &str,
        unit: &str,
        window: &Window<Tz>,
        samples: &[Sample],
        fill_missing: bool,
    ) -> Result<String, EngineError> {
        let payload = self.insight(metric, unit, window, samples, fill_missing);
        serde_json::to_string_pretty(&payload).map_err(EngineError::JsonError)
    }

    /// Segment sleep intervals for a week
    pub fn sleep_timeline<Tz: TimeZone>(
        &self,
        intervals: &[SleepInterval],
        week: &Window<Tz>,
    ) -> SleepTimeline {
        SleepSegmenter::from_config(&self.config).segment(intervals, &week.start, &week.end)
    }

    pub fn sleep_timeline_json<Tz: TimeZone>(
        &self,
        intervals: &[SleepInterval],
        week: &Window<Tz>,
    ) -> Result<String, EngineError> {
        let timeline = self.sleep_timeline(intervals, week);
        serde_json::to_string_pretty(&timeline).map_err(EngineError::JsonError)
    }

    /// Segment sleep intervals and add per-night totals
    pub fn sleep_report<Tz: TimeZone>(
        &self,
        intervals: &[SleepInterval],
        week: &Window<Tz>,
    ) -> SleepReport {
        let timeline = self.sleep_timeline(intervals, week);
        let days = week.calendar_days().len() as u32;
        SleepReport {
            nights: timeline.nights(),
            average_nightly_hours: timeline.average_nightly_hours(days),
            timeline,
        }
    }
}
