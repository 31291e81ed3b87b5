use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse file: {0}")]
    Parse(#[from] ParseError),

    #[error("Missing required fields: {}", .missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("Row {row}: {message}")]
    FieldConstraint { row: usize, message: String },

    #[error("Unexpected fault: {details}")]
    UnexpectedFault { details: String },

    #[error("Unknown schema identifier: {0}")]
    UnknownSchema(String),

    #[error("Snapshot serialization error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("Snapshot file error: {path} - {details}")]
    SnapshotFile { path: PathBuf, details: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Parse-time error types, fatal to a single file's attempt
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("File is empty")]
    EmptySource,

    #[error("Unreadable {format} source: {details}")]
    UnreadableSource { format: String, details: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    pub(crate) fn unreadable(format: impl Into<String>, details: impl ToString) -> Self {
        ParseError::UnreadableSource {
            format: format.into(),
            details: details.to_string(),
        }
    }
}

impl From<ConfigError> for UploadError {
    fn from(err: ConfigError) -> Self {
        UploadError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, UploadError>;

/// Parser result type alias
pub type ParseResult<T> = std::result::Result<T, ParseError>;
