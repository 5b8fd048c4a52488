//! Core streaming ledger for Drip.
//!
//! A sender locks a deposit that is released to a recipient linearly between
//! a start and a stop time. This crate provides:
//! - The pure balance algorithm (`balance`)
//! - `StreamingLedger` with create / withdraw / cancel and balance queries
//! - `Clock`, `FundTransfer`, and `EventObserver` seams to the host, with
//!   in-memory implementations for tests and embedding
//! - Custody totals and a conservation-of-funds audit
//! - `SharedLedger`, a mutex-guarded handle for multi-threaded hosts

pub mod audit;
pub mod balance;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod observer;
pub mod shared;
pub mod transfer;

pub use audit::{CustodyReport, CustodyTotals, Violation, ViolationKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, LedgerConfig, RemainderPolicy, StartPolicy};
pub use error::{LedgerError, RecipientRejection};
pub use ledger::{Cancellation, StreamingLedger};
pub use observer::{EventObserver, RecordingObserver, TracingObserver};
pub use shared::SharedLedger;
pub use transfer::{FundTransfer, InMemoryBank, Payout, TransferError};
