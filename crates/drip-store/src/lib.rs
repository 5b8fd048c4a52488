//! Keyed storage of stream records for the Drip streaming ledger.
//!
//! The store owns two things: the stream records themselves and the
//! monotonic id counter that names them. It never interprets balances; all
//! accounting lives in `drip-ledger`.
//!
//! # Storage Backends
//!
//! All backends implement the [`StreamStore`] trait:
//!
//! - [`InMemoryStreamStore`] -- `BTreeMap`-based store for tests and embedding,
//!   with [`StoreSnapshot`] export/restore for hosts that persist state
//!
//! # Design Rules
//!
//! 1. Ids start at 1, only ever grow, and are never reused after removal.
//! 2. A removed record is gone: lookups report `NotFound`, never a zeroed record.
//! 3. Removing an absent record is an error, not a silent no-op.
//! 4. Inserting over an existing id is an error.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStreamStore, StoreSnapshot};
pub use traits::StreamStore;
