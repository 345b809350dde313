//! Descriptive statistics
//!
//! Computes the summary sent alongside a daily series:
//! - Mean, population standard deviation and extrema
//! - Trailing week averages and week-over-week change
//! - Z-score outliers
//! - Zero-valued ("missing") day count
//!
//! Every degenerate input (empty series, constant series, short series) degrades to
//! zeros or `None`; nothing here returns an error.

use chrono::TimeZone;

use crate::config::{EngineConfig, DEFAULT_OUTLIER_Z_THRESHOLD, DEFAULT_TREND_WINDOW_DAYS};
use crate::types::{DailyPoint, Outlier, Sample, Summary};

/// Summary calculator with configurable outlier threshold and trend window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryCalculator {
    outlier_z_threshold: f64,
    trend_window: usize,
}

impl Default for SummaryCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_OUTLIER_Z_THRESHOLD, DEFAULT_TREND_WINDOW_DAYS)
    }
}

impl SummaryCalculator {
    pub fn new(outlier_z_threshold: f64, trend_window: usize) -> Self {
        Self {
            outlier_z_threshold,
            trend_window: trend_window.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.outlier_z_threshold, config.trend_window_days)
    }

    /// Sort samples, project them onto calendar days in `tz`, and summarize.
    pub fn summarize<Tz: TimeZone>(&self, samples: &[Sample], tz: &Tz) -> Summary {
        let daily = to_daily_points(&sort_chronologically(samples), tz);
        self.summarize_daily(&daily)
    }

    /// Summarize a series that is already in chronological order
    pub fn summarize_daily(&self, daily: &[DailyPoint]) -> Summary {
        let values: Vec<f64> = daily.iter().map(|p| p.value).collect();

        let mean = mean(&values).unwrap_or(0.0);
        let std_dev = population_std_dev(&values, mean);
        let (min, max) = extrema(&values).unwrap_or((0.0, 0.0));

        let last7_avg = trailing_window_avg(&values, self.trend_window, 0);
        let prev7_avg = trailing_window_avg(&values, self.trend_window, 1);
        let week_over_week_pct = percent_change(last7_avg, prev7_avg);

        let outliers = find_outliers(daily, mean, std_dev, self.outlier_z_threshold);
        let missing_days = count_zero_days(&values);

        log::debug!(
            "summarized {} points: mean={:.3} std_dev={:.3} outliers={} missing_days={}",
            values.len(),
            mean,
            std_dev,
            outliers.len(),
            missing_days
        );

        Summary {
            mean,
            std_dev,
            min,
            max,
            last7_avg,
            prev7_avg,
            week_over_week_pct,
            outliers,
            missing_days,
        }
    }
}

/// Summarize samples with the default threshold and trend window
pub fn summarize<Tz: TimeZone>(samples: &[Sample], tz: &Tz) -> Summary {
    SummaryCalculator::default().summarize(samples, tz)
}

/// Stable sort by timestamp; equal timestamps keep their input order
pub fn sort_chronologically(samples: &[Sample]) -> Vec<Sample> {
    let mut sorted = samples.to_vec();
    sorted.sort_by_key(|s| s.timestamp);
    sorted
}

/// Project samples onto the calendar day they fall on in `tz`, preserving order
pub fn to_daily_points<Tz: TimeZone>(samples: &[Sample], tz: &Tz) -> Vec<DailyPoint> {
    samples
        .iter()
        .map(|s| DailyPoint {
            date: s.timestamp.with_timezone(tz).date_naive(),
            value: s.value,
        })
        .collect()
}

/// Arithmetic mean, `None` for an empty slice
fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(sum / values.len() as f64)
}

/// Population standard deviation (divides by N)
fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / values.len() as f64).sqrt()
}

fn extrema(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(
        values
            .iter()
            .skip(1)
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

/// Mean of the `window` values ending `windows_back` windows before the newest value.
///
/// `windows_back = 0` is the most recent window. `None` unless the series is long
/// enough to fill every window up to and including the requested one.
fn trailing_window_avg(values: &[f64], window: usize, windows_back: usize) -> Option<f64> {
    let needed = window * (windows_back + 1);
    if values.len() < needed {
        return None;
    }
    let end = values.len() - window * windows_back;
    mean(&values[end - window..end])
}

/// Percentage change from `previous` to `current`
fn percent_change(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (current, previous) {
        (Some(curr), Some(prev)) if prev != 0.0 => Some((curr - prev) / prev * 100.0),
        _ => None,
    }
}

fn find_outliers(daily: &[DailyPoint], mean: f64, std_dev: f64, threshold: f64) -> Vec<Outlier> {
    // A constant series has no outliers
    if std_dev <= 0.0 {
        return Vec::new();
    }

    daily
        .iter()
        .filter_map(|p| {
            let z = (p.value - mean) / std_dev;
            (z.abs() >= threshold).then_some(Outlier {
                date: p.date,
                value: p.value,
                z,
            })
        })
        .collect()
}

fn count_zero_days(values: &[f64]) -> u32 {
    values.iter().filter(|&&v| v == 0.0).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, Utc};

    fn daily_samples(values: &[f64]) -> Vec<Sample> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(base + Duration::days(i as i64), v))
            .collect()
    }

    #[test]
    fn test_constant_week() {
        let summary = summarize(&daily_samples(&[10.0; 7]), &Utc);

        assert_eq!(summary.mean, 10.0);
        assert_eq!(summary.std_dev, 0.0);
        assert!(summary.outliers.is_empty());
        assert_eq!(summary.last7_avg, Some(10.0));
        assert_eq!(summary.prev7_avg, None);
        assert_eq!(summary.week_over_week_pct, None);
    }

    #[test]
    fn test_week_over_week_doubling() {
        let mut values = vec![5.0; 7];
        values.extend([10.0; 7]);
        let summary = summarize(&daily_samples(&values), &Utc);

        assert_eq!(summary.last7_avg, Some(10.0));
        assert_eq!(summary.prev7_avg, Some(5.0));
        assert!((summary.week_over_week_pct.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_spike_is_outlier() {
        let mut values = vec![1.0; 9];
        values.push(100.0);
        let summary = summarize(&daily_samples(&values), &Utc);

        assert!((summary.mean - 10.9).abs() < 1e-9);
        assert!((summary.std_dev - 29.7).abs() < 1e-9);
        assert_eq!(summary.outliers.len(), 1);

        let outlier = summary.outliers[0];
        assert_eq!(outlier.value, 100.0);
        assert_eq!(outlier.date, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert!((outlier.z - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_series() {
        let summary = summarize(&[], &Utc);

        assert_eq!(summary, Summary::default());
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let mut samples = daily_samples(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        samples.reverse();
        let summary = summarize(&samples, &Utc);

        // Most recent seven are 2..=8
        assert!((summary.last7_avg.unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 8.0);
    }

    #[test]
    fn test_stable_sort_on_equal_timestamps() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let samples = vec![Sample::new(t, 3.0), Sample::new(t, 1.0), Sample::new(t, 2.0)];
        let sorted = sort_chronologically(&samples);
        let values: Vec<f64> = sorted.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_zero_previous_week_has_no_change() {
        let mut values = vec![0.0; 7];
        values.extend([4.0; 7]);
        let summary = summarize(&daily_samples(&values), &Utc);

        assert_eq!(summary.prev7_avg, Some(0.0));
        assert_eq!(summary.week_over_week_pct, None);
        assert_eq!(summary.missing_days, 7);
    }

    #[test]
    fn test_negative_outliers_are_flagged() {
        let mut values = vec![50.0; 9];
        values.push(-400.0);
        let summary = summarize(&daily_samples(&values), &Utc);

        assert_eq!(summary.outliers.len(), 1);
        assert!(summary.outliers[0].z < -2.0);
    }

    #[test]
    fn test_custom_threshold() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let strict = SummaryCalculator::new(1.5, 7).summarize(&daily_samples(&values), &Utc);
        let default = summarize(&daily_samples(&values), &Utc);

        // std_dev is ~2.87, so 1 and 10 sit at |z| ~1.57
        assert_eq!(strict.outliers.len(), 2);
        assert!(default.outliers.is_empty());
    }

    #[test]
    fn test_outliers_in_chronological_order() {
        let mut values = vec![50.0; 20];
        values[3] = -400.0;
        values[15] = 500.0;
        let mut samples = daily_samples(&values);
        samples.reverse();
        samples.rotate_left(7);

        let summary = summarize(&samples, &Utc);

        assert_eq!(summary.outliers.len(), 2);
        assert!(summary.outliers[0].date < summary.outliers[1].date);
        assert_eq!(summary.outliers[0].value, -400.0);
        assert_eq!(summary.outliers[0].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(summary.outliers[1].value, 500.0);
        assert_eq!(summary.outliers[1].date, NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
    }

    #[test]
    fn test_daily_points_follow_timezone() {
        let offset = chrono::FixedOffset::west_opt(5 * 3600).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();
        let daily = to_daily_points(&[Sample::new(t, 1.0)], &offset);
        assert_eq!(daily[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;

    fn daily_samples(values: &[f64]) -> Vec<Sample> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(base + Duration::days(i as i64), v))
            .collect()
    }

    proptest! {
        /// Property: the mean lies between the extrema and the deviation is non-negative
        #[test]
        fn mean_within_extrema(values in prop::collection::vec(-1.0e6f64..1.0e6, 1..60)) {
            let summary = summarize(&daily_samples(&values), &Utc);
            let tol = 1e-9 * summary.max.abs().max(summary.min.abs()).max(1.0);
            prop_assert!(summary.min <= summary.mean + tol);
            prop_assert!(summary.mean <= summary.max + tol);
            prop_assert!(summary.std_dev >= 0.0);
        }

        /// Property: a constant series never has outliers
        #[test]
        fn constant_series_has_no_outliers(value in -1.0e3f64..1.0e3, len in 0usize..40) {
            let summary = summarize(&daily_samples(&vec![value; len]), &Utc);
            prop_assert!(summary.outliers.is_empty());
        }

        /// Property: trend fields are present exactly when the series is long enough
        #[test]
        fn trend_presence_follows_length(values in prop::collection::vec(-100.0f64..100.0, 0..30)) {
            let summary = summarize(&daily_samples(&values), &Utc);
            prop_assert_eq!(summary.last7_avg.is_some(), values.len() >= 7);
            prop_assert_eq!(summary.prev7_avg.is_some(), values.len() >= 14);
            let expect_pct = matches!(summary.prev7_avg, Some(p) if p != 0.0);
            prop_assert_eq!(summary.week_over_week_pct.is_some(), expect_pct);
        }

        /// Property: every outlier meets the threshold
        #[test]
        fn outliers_meet_threshold(values in prop::collection::vec(0.0f64..500.0, 0..40)) {
            let summary = summarize(&daily_samples(&values), &Utc);
            for outlier in &summary.outliers {
                prop_assert!(outlier.z.abs() >= DEFAULT_OUTLIER_Z_THRESHOLD);
            }
        }

        /// Property: outliers come back in date order whatever the input order
        #[test]
        fn outliers_are_chronological(
            values in prop::collection::vec(0.0f64..500.0, 0..40),
            shift in 0usize..40,
        ) {
            let mut samples = daily_samples(&values);
            samples.reverse();
            if !samples.is_empty() {
                let mid = shift % samples.len();
                samples.rotate_left(mid);
            }
            let summary = summarize(&samples, &Utc);
            for pair in summary.outliers.windows(2) {
                prop_assert!(pair[0].date < pair[1].date);
            }
        }
    }
}
