//! Engine configuration
//!
//! Tunables for the statistics and segmentation pipelines. Every default matches the
//! behavior the free functions in [`crate::stats`] and [`crate::sleep`] implement.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Default |z| at or above which a sample is an outlier
pub const DEFAULT_OUTLIER_Z_THRESHOLD: f64 = 2.0;

/// Default number of values in one trend window
pub const DEFAULT_TREND_WINDOW_DAYS: usize = 7;

/// Default hour (local) the sleep visualization domain opens on the first night
pub const DEFAULT_DOMAIN_START_HOUR: u32 = 18;

/// Default hour (local) the sleep visualization domain closes after the last night
pub const DEFAULT_DOMAIN_END_HOUR: u32 = 12;

/// Configuration shared by both pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub outlier_z_threshold: f64,
    pub trend_window_days: usize,
    pub domain_start_hour: u32,
    pub domain_end_hour: u32,
    pub week_starts_on: Weekday,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            outlier_z_threshold: DEFAULT_OUTLIER_Z_THRESHOLD,
            trend_window_days: DEFAULT_TREND_WINDOW_DAYS,
            domain_start_hour: DEFAULT_DOMAIN_START_HOUR,
            domain_end_hour: DEFAULT_DOMAIN_END_HOUR,
            week_starts_on: Weekday::Mon,
        }
    }
}

impl EngineConfig {
    /// Check that every field is usable
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.outlier_z_threshold.is_finite() || self.outlier_z_threshold <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "outlierZThreshold must be positive, got {}",
                self.outlier_z_threshold
            )));
        }
        if self.trend_window_days == 0 {
            return Err(EngineError::InvalidConfig(
                "trendWindowDays must be at least 1".to_string(),
            ));
        }
        if self.domain_start_hour >= 24 || self.domain_end_hour >= 24 {
            return Err(EngineError::InvalidConfig(format!(
                "domain hours must be below 24, got {} and {}",
                self.domain_start_hour, self.domain_end_hour
            )));
        }
        Ok(())
    }

    /// Load and validate configuration from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
