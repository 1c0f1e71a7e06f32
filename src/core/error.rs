//! Errors raised by the series pipeline stages

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// The series cannot be used to infer supply (too short, unordered, no prices).
    #[error("Invalid series for {symbol}: {reason}")]
    InvalidSeries { symbol: String, reason: String },

    #[error("Not enough overlapping data (need at least {required} days, got {available})")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl PipelineError {
    pub(crate) fn invalid_series(symbol: &str, reason: impl Into<String>) -> Self {
        PipelineError::InvalidSeries {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}
