//! Error types for the calmerge pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching, parsing or aggregating calendars.
#[derive(Error, Debug)]
pub enum CalMergeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to fetch '{calendar}': {reason}")]
    Fetch { calendar: String, reason: String },

    #[error("Failed to read local calendar {}: {error}", path.display())]
    LocalRead {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Extraction task failed: {0}")]
    Task(String),

    #[error("Aggregation failed for '{calendar}': {error}")]
    Aggregation {
        calendar: String,
        #[source]
        error: Box<CalMergeError>,
    },
}

impl CalMergeError {
    /// Wrap an error raised while processing `calendar` into an aggregation failure.
    pub fn aggregation(calendar: impl Into<String>, error: CalMergeError) -> Self {
        CalMergeError::Aggregation {
            calendar: calendar.into(),
            error: Box::new(error),
        }
    }
}

/// Result type alias for calmerge operations.
pub type CalMergeResult<T> = Result<T, CalMergeError>;
