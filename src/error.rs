//! Error types for the surge factor pipeline

use thiserror::Error;

/// Main error type for the surge factor pipeline
#[derive(Error, Debug)]
pub enum SurgeError {
    /// A required `(date, exchange, kind)` tick file is absent.
    #[error("missing tick input: {0}")]
    MissingInput(String),

    /// An M10 same-time task could not assemble `H` prior business days.
    #[error("insufficient history: {0}")]
    InsufficientHistory(String),

    /// Aggregation was requested but `is_surge` was never true.
    #[error("empty surge set: {0}")]
    EmptySurgeSet(String),

    /// An expected column was absent from a tick file, or a frame's shape
    /// otherwise doesn't match what a stage requires.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A factor configuration is internally inconsistent.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A calendar lookup failed (no such business day / out of range).
    #[error("calendar error: {0}")]
    CalendarError(String),

    /// Emit to the factor store failed.
    #[error("emit failure: {0}")]
    IoFailure(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("columnar engine error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for surge factor pipeline operations
pub type Result<T> = std::result::Result<T, SurgeError>;
