use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("empty schedule: start {start} is not before stop {stop}")]
    EmptySchedule { start: u64, stop: u64 },

    #[error("inconsistent stream #{id}: {reason}")]
    InconsistentStream { id: u64, reason: String },
}
