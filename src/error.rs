use thiserror::Error;

use crate::detection::PatternKind;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DetectorError {
    /// Raised by constructors only, never during analysis.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid market data: {0}")]
    InvalidData(String),

    #[error("{pattern} detector failed: {reason}")]
    PatternFailed { pattern: PatternKind, reason: String },

    #[error("Detector pool error: {0}")]
    Pool(String),
}

impl DetectorError {
    pub fn config(msg: impl Into<String>) -> Self {
        DetectorError::Configuration(msg.into())
    }

    pub fn pattern(pattern: PatternKind, reason: impl Into<String>) -> Self {
        DetectorError::PatternFailed {
            pattern,
            reason: reason.into(),
        }
    }
}

pub type DetectorResult<T> = Result<T, DetectorError>;
