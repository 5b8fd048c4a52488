//! Foundation types for the Drip streaming ledger.
//!
//! Every other Drip crate depends on `drip-types`. It defines the identity,
//! record, and event shapes that flow between the store, the ledger, and the
//! hosting runtime.
//!
//! # Key Types
//!
//! - [`Address`]: 20-byte party identity, derivable from a label
//! - [`StreamId`]: sequential stream identifier, never reused
//! - [`Stream`]: the unit of accounting for one payment stream
//! - [`Role`]: how an address relates to a given stream
//! - [`LedgerEvent`]: notifications emitted after committed operations

pub mod address;
pub mod error;
pub mod event;
pub mod stream;

pub use address::Address;
pub use error::TypeError;
pub use event::LedgerEvent;
pub use stream::{Role, Stream, StreamId};

/// Integer amount of currency. All ledger arithmetic is exact.
pub type Amount = u128;

/// Seconds on the host clock.
pub type Timestamp = u64;
