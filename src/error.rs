//! Error types for the Healthwaves engine
//!
//! The statistics and segmentation pipelines never fail. These errors only surface
//! at the edges: decoding input records, loading configuration and building windows.

use thiserror::Error;

/// Errors that can occur while preparing input for the pipelines
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),
}
