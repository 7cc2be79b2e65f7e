//! Error types for Summit

use thiserror::Error;

/// Result type alias for Summit operations
pub type Result<T> = std::result::Result<T, SummitError>;

/// Main error type for Summit
#[derive(Error, Debug)]
pub enum SummitError {
    #[error("Invalid timestamp '{value}' (expected {format})")]
    Timestamp { value: String, format: &'static str },
}

impl SummitError {
    pub fn timestamp(value: impl Into<String>, format: &'static str) -> Self {
        Self::Timestamp {
            value: value.into(),
            format,
        }
    }
}
