use drip_types::StreamId;

/// Errors from stream store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No record exists under the id (never created, or already removed).
    #[error("stream not found: {0}")]
    NotFound(StreamId),

    /// A record already exists under the id.
    #[error("duplicate stream id: {0}")]
    DuplicateId(StreamId),

    /// The id counter cannot advance any further.
    #[error("stream id space exhausted")]
    IdExhausted,

    /// A snapshot failed its consistency checks on restore.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
