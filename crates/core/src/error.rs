//! Core error types

use thiserror::Error;

/// Errors raised while interpreting caller-supplied conversation data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Unknown decision timeline: {0}")]
    UnknownTimeline(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
