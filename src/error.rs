//! Error taxonomy for the flattening core
//!
//! Configuration problems are reported as [`FlattenError::InvalidParameter`]
//! before any computation starts. Problems with a single record's readings are
//! [`FlattenError::InvalidInput`] (or the more specific
//! [`FlattenError::EmptySeries`]) and only fail that record in batch mode.

use thiserror::Error;

/// Errors raised by the detection and flattening core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlattenError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Empty series: cannot locate a minimum in a zero-length CUSUM series")]
    EmptySeries,
}

impl FlattenError {
    /// True for errors caused by a record's readings rather than by configuration
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::EmptySeries)
    }

    pub(crate) fn parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub(crate) fn input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, FlattenError>;
