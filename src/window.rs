//! Date and window utilities
//!
//! Half-open `[start, end)` windows expressed in the caller's timezone, the sleep
//! visualization domain derived from a week window, and the two series preparation
//! steps callers run before payload assembly: daily aggregation and gap filling.

use chrono::{
    DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc, Weekday,
};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::EngineError;
use crate::types::{Aggregation, Sample};

/// A half-open `[start, end)` time window in a specific timezone
#[derive(Debug, Clone, PartialEq)]
pub struct Window<Tz: TimeZone> {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl<Tz: TimeZone> Window<Tz> {
    /// Create a window, rejecting empty or inverted bounds
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Result<Self, EngineError> {
        if end <= start {
            return Err(EngineError::InvalidWindow(format!(
                "end ({}) must be after start ({})",
                end.naive_utc(),
                start.naive_utc()
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending at `end`
    pub fn lookback(end: DateTime<Tz>, days: u32) -> Result<Self, EngineError> {
        let start = TimeDelta::try_days(i64::from(days.max(1)))
            .and_then(|span| end.clone().checked_sub_signed(span))
            .ok_or_else(|| {
                EngineError::InvalidWindow(format!(
                    "{} days before {} is out of range",
                    days,
                    end.naive_utc()
                ))
            })?;
        Ok(Self { start, end })
    }

    /// The seven-day week containing `instant`, from local midnight on `week_starts_on`
    pub fn week_containing(instant: &DateTime<Tz>, week_starts_on: Weekday) -> Self {
        let tz = instant.timezone();
        let date = instant.date_naive();
        let offset = (7 + date.weekday().num_days_from_monday()
            - week_starts_on.num_days_from_monday())
            % 7;
        let first_day = date - Days::new(u64::from(offset));
        Self::week_from(&tz, first_day)
    }

    /// The week `weeks_back` weeks before the one containing `now` (0 is this week)
    pub fn weeks_back(
        now: &DateTime<Tz>,
        weeks_back: u32,
        week_starts_on: Weekday,
    ) -> Result<Self, EngineError> {
        let current = Self::week_containing(now, week_starts_on);
        let tz = now.timezone();
        let first_day = current
            .start
            .date_naive()
            .checked_sub_days(Days::new(7 * u64::from(weeks_back)))
            .ok_or_else(|| {
                EngineError::InvalidWindow(format!("{} weeks back is out of range", weeks_back))
            })?;
        Ok(Self::week_from(&tz, first_day))
    }

    /// The seven-day week starting at local midnight of `first_day`
    pub fn week_from(tz: &Tz, first_day: NaiveDate) -> Self {
        let last = first_day + Days::new(7);
        Self {
            start: local_at_hour(tz, first_day, 0).with_timezone(tz),
            end: local_at_hour(tz, last, 0).with_timezone(tz),
        }
    }

    /// Every calendar day overlapping the window, in order
    pub fn calendar_days(&self) -> Vec<NaiveDate> {
        let first = self.start.date_naive();
        let last = (self.end.clone() - TimeDelta::nanoseconds(1)).date_naive();
        first.iter_days().take_while(|d| *d <= last).collect()
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        *instant >= self.start && *instant < self.end
    }

    /// Sleep visualization domain for this window: `start_hour` on the first calendar
    /// day through `end_hour` on the calendar day of the exclusive end.
    pub fn sleep_domain(&self, start_hour: u32, end_hour: u32) -> Domain {
        let tz = self.start.timezone();
        Domain {
            start: local_at_hour(&tz, self.start.date_naive(), start_hour),
            end: local_at_hour(&tz, self.end.date_naive(), end_hour),
        }
    }
}

/// Closed time range that segments are clamped into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Domain {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Domain {
    /// Pull `instant` to the nearest bound when it falls outside
    pub fn clamp(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        instant.max(self.start).min(self.end)
    }
}

/// Resolve `hour:00` local time on `date` to UTC.
///
/// Ambiguous local times take the earlier instant. Times skipped by a DST jump fall
/// back to reading the wall clock as UTC.
pub fn local_at_hour<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Collapse samples into one per calendar day, stamped at local midnight.
pub fn aggregate_daily<Tz: TimeZone>(
    samples: &[Sample],
    tz: &Tz,
    aggregation: Aggregation,
) -> Vec<Sample> {
    let mut by_day: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();

    for sample in samples {
        let day = sample.timestamp.with_timezone(tz).date_naive();
        let entry = by_day.entry(day).or_insert((0.0, 0));
        entry.0 += sample.value;
        entry.1 += 1;
    }

    by_day
        .into_iter()
        .map(|(day, (sum, count))| {
            let value = match aggregation {
                Aggregation::Sum => sum,
                Aggregation::Average => sum / count as f64,
            };
            Sample::new(local_at_hour(tz, day, 0), value)
        })
        .collect()
}

/// Drop samples outside the window and add a zero-valued sample for every calendar
/// day in it that has none.
///
/// Synthetic samples sit at local midnight, or at the window start for a first day
/// that begins mid-day. The result is in chronological order.
pub fn fill_missing_days<Tz: TimeZone>(samples: &[Sample], window: &Window<Tz>) -> Vec<Sample> {
    let tz = window.start.timezone();
    let start_utc = window.start.with_timezone(&Utc);

    let mut filled: Vec<Sample> = samples
        .iter()
        .filter(|s| window.contains(&s.timestamp))
        .copied()
        .collect();

    let observed: BTreeSet<NaiveDate> = filled
        .iter()
        .map(|s| s.timestamp.with_timezone(&tz).date_naive())
        .collect();

    let mut synthesized = 0usize;
    for day in window.calendar_days() {
        if observed.contains(&day) {
            continue;
        }
        let stamp = local_at_hour(&tz, day, 0).max(start_utc);
        filled.push(Sample::new(stamp, 0.0));
        synthesized += 1;
    }

    log::debug!(
        "gap filling added {} zero-valued days to {} observed samples",
        synthesized,
        filled.len() - synthesized
    );

    filled.sort_by_key(|s| s.timestamp);
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_new_rejects_inverted_window() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(Window::new(t, t).is_err());
        assert!(Window::new(t, t - TimeDelta::hours(1)).is_err());
        assert!(Window::new(t, t + TimeDelta::hours(1)).is_ok());
    }

    #[test]
    fn test_week_containing_monday_start() {
        // 2024-01-10 is a Wednesday
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 15, 30, 0).unwrap();
        let week = Window::week_containing(&now, Weekday::Mon);

        assert_eq!(week.start, Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap());
        assert_eq!(week.end, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_week_containing_sunday_start() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 15, 30, 0).unwrap();
        let week = Window::week_containing(&now, Weekday::Sun);
        assert_eq!(week.start.date_naive(), date(2024, 1, 7));
    }

    #[test]
    fn test_weeks_back() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 15, 30, 0).unwrap();
        let week = Window::weeks_back(&now, 2, Weekday::Mon).unwrap();
        assert_eq!(week.start.date_naive(), date(2023, 12, 25));
        assert_eq!(week.end.date_naive(), date(2024, 1, 1));
    }

    #[test]
    fn test_out_of_range_lookback_is_an_error() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 15, 30, 0).unwrap();

        let err = Window::lookback(now, u32::MAX).unwrap_err();
        assert!(matches!(err, EngineError::InvalidWindow(_)));

        let err = Window::weeks_back(&now, u32::MAX, Weekday::Mon).unwrap_err();
        assert!(matches!(err, EngineError::InvalidWindow(_)));

        assert!(Window::lookback(now, 36500).is_ok());
    }

    #[test]
    fn test_calendar_days_exclusive_end() {
        let week = Window::week_from(&Utc, date(2024, 1, 8));
        let days = week.calendar_days();
        assert_eq!(days.len(), 7);
        assert_eq!(days[0], date(2024, 1, 8));
        assert_eq!(days[6], date(2024, 1, 14));
    }

    #[test]
    fn test_calendar_days_partial_days() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap();
        let window = Window::lookback(start + TimeDelta::days(3), 3).unwrap();
        assert_eq!(
            window.calendar_days(),
            vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3), date(2024, 1, 4)]
        );
    }

    #[test]
    fn test_sleep_domain_in_offset_timezone() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let week = Window::week_from(&tz, date(2024, 1, 8));
        let domain = week.sleep_domain(18, 12);

        assert_eq!(domain.start, Utc.with_ymd_and_hms(2024, 1, 8, 16, 0, 0).unwrap());
        assert_eq!(domain.end, Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_domain_clamp() {
        let domain = Domain {
            start: Utc.with_ymd_and_hms(2024, 1, 8, 18, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        };
        let early = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 16, 9, 0, 0).unwrap();
        let inside = Utc.with_ymd_and_hms(2024, 1, 10, 2, 0, 0).unwrap();

        assert_eq!(domain.clamp(early), domain.start);
        assert_eq!(domain.clamp(late), domain.end);
        assert_eq!(domain.clamp(inside), inside);
    }

    #[test]
    fn test_aggregate_daily_sum_and_average() {
        let samples = vec![
            Sample::new(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(), 100.0),
            Sample::new(Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap(), 300.0),
            Sample::new(Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(), 50.0),
        ];

        let sums = aggregate_daily(&samples, &Utc, Aggregation::Sum);
        let avgs = aggregate_daily(&samples, &Utc, Aggregation::Average);

        assert_eq!(
            sums,
            vec![
                Sample::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), 400.0),
                Sample::new(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(), 50.0),
            ]
        );
        assert_eq!(avgs[0].value, 200.0);
        assert_eq!(avgs[1].value, 50.0);
    }

    #[test]
    fn test_fill_missing_days() {
        let window = Window::week_from(&Utc, date(2024, 1, 8));
        let samples = vec![
            Sample::new(Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap(), 500.0),
            Sample::new(Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap(), 700.0),
            // Outside the window
            Sample::new(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(), 900.0),
        ];

        let filled = fill_missing_days(&samples, &window);
        let values: Vec<f64> = filled.iter().map(|s| s.value).collect();

        assert_eq!(values, vec![0.0, 500.0, 0.0, 0.0, 700.0, 0.0, 0.0]);
        assert_eq!(
            filled[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_fill_missing_days_mid_day_start() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap();
        let window = Window::new(start, start + TimeDelta::days(1)).unwrap();
        let filled = fill_missing_days(&[], &window);

        assert_eq!(filled.len(), 2);
        assert_eq!(filled[0].timestamp, start);
        assert_eq!(
            filled[1].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
    }
}
