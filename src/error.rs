//! Error types for econ_pit
//!
//! Only schema-level problems, bad configuration and storage failures are
//! errors. Gaps, small samples and missing denominators are represented as
//! nulls or omitted rows in the output tables.

use chrono::NaiveDate;
use thiserror::Error;

/// Main error type for econ_pit
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Schema violation at row {row}: {message}")]
    SchemaViolation { row: usize, message: String },

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate partition key: snapshot {snapshot_date}, entity {entity_id}, period {period_date}")]
    DuplicateKey {
        snapshot_date: NaiveDate,
        entity_id: String,
        period_date: NaiveDate,
    },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Frame error: {0}")]
    FrameError(#[from] polars::prelude::PolarsError),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl AnalyticsError {
    /// Shorthand for a schema violation at a given input row
    pub fn schema(row: usize, message: impl Into<String>) -> Self {
        AnalyticsError::SchemaViolation {
            row,
            message: message.into(),
        }
    }

    /// Whether this error was caused by malformed input rather than the environment
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AnalyticsError::SchemaViolation { .. } | AnalyticsError::MissingColumn(_)
        )
    }
}

/// Result type alias for econ_pit operations
pub type Result<T> = std::result::Result<T, AnalyticsError>;
