//! Healthwaves Engine - Time-series health analytics and sleep segmentation
//!
//! The engine turns daily health samples into an insight payload (descriptive
//! statistics, weekly trend and z-score outliers) and turns raw stage-tagged sleep
//! intervals into per-night segments clamped to an evening-to-noon visualization
//! window. Both pipelines are pure: the same inputs always produce the same output.
//!
//! ## Modules
//!
//! - **Statistics Pipeline**: daily series → summary → `InsightPayload`
//! - **Sleep Segmentation**: intervals → night buckets → clamped `SleepTimeline`

pub mod config;
pub mod error;
pub mod input;
pub mod payload;
pub mod pipeline;
pub mod sleep;
pub mod stats;
pub mod types;
pub mod window;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::EngineConfig;
pub use error::EngineError;
pub use payload::{build_payload, PayloadBuilder};
pub use pipeline::{build_insight_json, sleep_timeline_json, InsightEngine, SleepReport};
pub use sleep::{segment_sleep, NightSummary, SleepSegmenter, StageBreakdown};
pub use stats::{summarize, SummaryCalculator};
pub use types::{
    DailyPoint, InsightPayload, Metric, Outlier, Sample, SleepInterval, SleepSegment, SleepStage,
    SleepTimeline, Summary,
};
pub use window::{aggregate_daily, fill_missing_days, Domain, Window};

/// Engine version
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
