use std::fmt;

use drip_store::StoreError;
use drip_types::{Address, StreamId, Timestamp};

use crate::transfer::TransferError;

/// Why a recipient was refused at stream creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientRejection {
    /// The recipient is the ledger's own identity.
    Ledger,
    /// The recipient is the caller funding the stream.
    Caller,
}

impl fmt::Display for RecipientRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ledger => write!(f, "self"),
            Self::Caller => write!(f, "caller"),
        }
    }
}

/// Errors produced by ledger operations.
///
/// Every variant aborts only the operation that raised it; the ledger state
/// is left exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("{0} does not exist")]
    NotFound(StreamId),

    #[error("caller {caller} is not authorized for {id}")]
    Unauthorized { id: StreamId, caller: Address },

    #[error("invalid recipient: {0}")]
    InvalidRecipient(RecipientRejection),

    #[error("deposit must be greater than zero")]
    InvalidDeposit,

    #[error("invalid time range: start {start} must be before stop {stop}")]
    InvalidTimeRange { start: Timestamp, stop: Timestamp },

    #[error("start time {start} is in the past (now {now})")]
    StartInPast { start: Timestamp, now: Timestamp },

    #[error("nothing available to withdraw from {0}")]
    NothingAvailable(StreamId),

    #[error("transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    #[error("arithmetic overflow")]
    Overflow,

    #[error("store error: {0}")]
    Store(StoreError),
}

impl LedgerError {
    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unauthorized { .. } => "unauthorized",
            Self::InvalidRecipient(_) => "invalid_recipient",
            Self::InvalidDeposit => "invalid_deposit",
            Self::InvalidTimeRange { .. } => "invalid_time_range",
            Self::StartInPast { .. } => "start_in_past",
            Self::NothingAvailable(_) => "nothing_available",
            Self::TransferFailed(_) => "transfer_failed",
            Self::Overflow => "overflow",
            Self::Store(_) => "store",
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}
