//! Sleep segmentation
//!
//! Turns raw stage-tagged intervals into render-ready segments for one week:
//! 1. Bucket each interval to the night it ends on
//! 2. Keep nights inside the week
//! 3. Clamp to the evening-to-noon visualization domain
//! 4. Order by night, then start
//!
//! Malformed intervals are dropped silently; segmentation always returns a timeline.

use chrono::{DateTime, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, DEFAULT_DOMAIN_END_HOUR, DEFAULT_DOMAIN_START_HOUR};
use crate::types::{SleepInterval, SleepSegment, SleepStage, SleepTimeline};
use crate::window::{Domain, Window};

/// Segmenter with configurable domain hours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepSegmenter {
    domain_start_hour: u32,
    domain_end_hour: u32,
}

impl Default for SleepSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAIN_START_HOUR, DEFAULT_DOMAIN_END_HOUR)
    }
}

impl SleepSegmenter {
    pub fn new(domain_start_hour: u32, domain_end_hour: u32) -> Self {
        Self {
            domain_start_hour,
            domain_end_hour,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.domain_start_hour, config.domain_end_hour)
    }

    /// Segment intervals for the week `[week_start, week_end)`.
    ///
    /// Calendar days (nights and domain bounds) are taken in `week_start`'s timezone.
    pub fn segment<Tz: TimeZone>(
        &self,
        intervals: &[SleepInterval],
        week_start: &DateTime<Tz>,
        week_end: &DateTime<Tz>,
    ) -> SleepTimeline {
        let tz = week_start.timezone();
        let week = Window {
            start: week_start.clone(),
            end: week_end.with_timezone(&tz),
        };
        let domain = week.sleep_domain(self.domain_start_hour, self.domain_end_hour);
        let first_night = week.start.date_naive();
        let end_night = week.end.date_naive();

        let mut segments: Vec<SleepSegment> = intervals
            .iter()
            .filter_map(|interval| clip_interval(interval, &tz, first_night, end_night, &domain))
            .collect();

        segments.sort_by(|a, b| a.night.cmp(&b.night).then(a.start.cmp(&b.start)));

        let total_asleep_seconds = total_asleep_seconds(&segments);

        log::debug!(
            "segmented {} intervals into {} segments ({:.0}s asleep)",
            intervals.len(),
            segments.len(),
            total_asleep_seconds
        );

        SleepTimeline {
            domain_start: domain.start,
            domain_end: domain.end,
            segments,
            total_asleep_seconds,
        }
    }
}

/// Segment intervals with the default 18:00 to 12:00 domain
pub fn segment_sleep<Tz: TimeZone>(
    intervals: &[SleepInterval],
    week_start: &DateTime<Tz>,
    week_end: &DateTime<Tz>,
) -> SleepTimeline {
    SleepSegmenter::default().segment(intervals, week_start, week_end)
}

/// Bucket, filter and clamp one interval
fn clip_interval<Tz: TimeZone>(
    interval: &SleepInterval,
    tz: &Tz,
    first_night: NaiveDate,
    end_night: NaiveDate,
    domain: &Domain,
) -> Option<SleepSegment> {
    if interval.end <= interval.start {
        log::trace!(
            "dropping malformed {} interval {} -> {}",
            interval.stage,
            interval.start,
            interval.end
        );
        return None;
    }

    // The night is the day the interval ends on
    let night = interval.end.with_timezone(tz).date_naive();
    if night < first_night || night >= end_night {
        log::trace!("dropping {} interval for night {} outside week", interval.stage, night);
        return None;
    }

    let start = domain.clamp(interval.start);
    let end = domain.clamp(interval.end);
    if end <= start {
        log::trace!(
            "dropping {} interval {} -> {} outside domain",
            interval.stage,
            interval.start,
            interval.end
        );
        return None;
    }

    Some(SleepSegment {
        night,
        start,
        end,
        stage: interval.stage,
    })
}

fn total_asleep_seconds(segments: &[SleepSegment]) -> f64 {
    segments
        .iter()
        .filter(|s| s.stage.is_asleep())
        .map(SleepSegment::duration_seconds)
        .sum()
}

/// Seconds spent in each stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageBreakdown {
    pub awake: f64,
    pub rem: f64,
    pub core: f64,
    pub deep: f64,
    pub unspecified: f64,
    pub in_bed: f64,
    pub unknown: f64,
}

impl StageBreakdown {
    pub fn add(&mut self, stage: SleepStage, seconds: f64) {
        let slot = match stage {
            SleepStage::Awake => &mut self.awake,
            SleepStage::Rem => &mut self.rem,
            SleepStage::Core => &mut self.core,
            SleepStage::Deep => &mut self.deep,
            SleepStage::Unspecified => &mut self.unspecified,
            SleepStage::InBed => &mut self.in_bed,
            SleepStage::Unknown => &mut self.unknown,
        };
        *slot += seconds;
    }

    pub fn get(&self, stage: SleepStage) -> f64 {
        match stage {
            SleepStage::Awake => self.awake,
            SleepStage::Rem => self.rem,
            SleepStage::Core => self.core,
            SleepStage::Deep => self.deep,
            SleepStage::Unspecified => self.unspecified,
            SleepStage::InBed => self.in_bed,
            SleepStage::Unknown => self.unknown,
        }
    }
}

/// Totals for one night row of the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NightSummary {
    pub night: NaiveDate,
    pub asleep_seconds: f64,
    pub segment_count: usize,
    pub stages: StageBreakdown,
}

impl SleepTimeline {
    /// Per-night totals in night order. Nights without segments are omitted.
    pub fn nights(&self) -> Vec<NightSummary> {
        let mut nights: Vec<NightSummary> = Vec::new();

        for segment in &self.segments {
            let secs = segment.duration_seconds();
            let needs_new = nights.last().map_or(true, |n| n.night != segment.night);
            if needs_new {
                nights.push(NightSummary {
                    night: segment.night,
                    asleep_seconds: 0.0,
                    segment_count: 0,
                    stages: StageBreakdown::default(),
                });
            }
            if let Some(current) = nights.last_mut() {
                current.segment_count += 1;
                current.stages.add(segment.stage, secs);
                if segment.stage.is_asleep() {
                    current.asleep_seconds += secs;
                }
            }
        }

        nights
    }

    pub fn total_asleep_hours(&self) -> f64 {
        self.total_asleep_seconds / 3600.0
    }

    /// Total asleep hours spread over `days` days; 0 for an empty timeline
    pub fn average_nightly_hours(&self, days: u32) -> f64 {
        if self.segments.is_empty() {
            return 0.0;
        }
        self.total_asleep_hours() / f64::from(days.max(1))
    }
}
