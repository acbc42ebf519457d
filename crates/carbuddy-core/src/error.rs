//! Common error types shared across the pipeline

use thiserror::Error;

/// Result type for sink submissions
pub type SinkResult = Result<(), SinkError>;

/// A trouble code string reported by the adapter failed validation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodeError {
    /// Wrong overall length (expected one letter + four digits)
    #[error("Malformed trouble code {0:?}: expected 5 characters")]
    Length(String),

    /// Leading character is not one of P, C, B, U
    #[error("Malformed trouble code {0:?}: unknown system letter")]
    System(String),

    /// Trailing characters are not decimal digits
    #[error("Malformed trouble code {0:?}: expected 4 decimal digits")]
    Digits(String),
}

/// Outcome of a failed submission to an event sink
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// Temporary condition (network down, rate limited, 5xx); worth retrying
    #[error("Transient sink failure: {0}")]
    Transient(String),

    /// The sink rejected the event (bad payload, revoked credentials)
    #[error("Permanent sink failure: {0}")]
    Permanent(String),
}

impl SinkError {
    /// Whether the dispatcher should retry this submission
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}
