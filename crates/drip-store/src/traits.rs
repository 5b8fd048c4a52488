use std::sync::Arc;

use drip_types::{Stream, StreamId};

use crate::error::{StoreError, StoreResult};

/// Keyed storage of [`Stream`] records plus monotonic id assignment.
///
/// All implementations must satisfy these invariants:
/// - `next_id()` returns 1 first and strictly increasing values afterwards,
///   regardless of removals.
/// - `insert()` never overwrites; `update()` never creates.
/// - `remove()` of an absent id fails with `NotFound`.
pub trait StreamStore: Send + Sync {
    /// Allocate the next stream id.
    fn next_id(&self) -> StoreResult<StreamId>;

    /// The most recently allocated id, or `StreamId(0)` if none.
    fn last_id(&self) -> StreamId;

    /// The id `next_id()` would hand out, without allocating it.
    fn peek_next_id(&self) -> StoreResult<StreamId> {
        self.last_id()
            .value()
            .checked_add(1)
            .map(StreamId)
            .ok_or(StoreError::IdExhausted)
    }

    /// Store a new record under its id.
    fn insert(&self, stream: Stream) -> StoreResult<()>;

    /// Fetch a copy of the record.
    fn get(&self, id: StreamId) -> StoreResult<Stream>;

    /// Replace an existing record.
    fn update(&self, stream: &Stream) -> StoreResult<()>;

    /// Delete the record and hand it back.
    fn remove(&self, id: StreamId) -> StoreResult<Stream>;

    /// Ids of all live records in ascending order.
    fn ids(&self) -> Vec<StreamId>;

    /// Check whether a record exists.
    fn contains(&self, id: StreamId) -> bool {
        self.get(id).is_ok()
    }

    /// Number of live records.
    fn len(&self) -> usize {
        self.ids().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: StreamStore + ?Sized> StreamStore for Arc<S> {
    fn next_id(&self) -> StoreResult<StreamId> {
        (**self).next_id()
    }

    fn last_id(&self) -> StreamId {
        (**self).last_id()
    }

    fn peek_next_id(&self) -> StoreResult<StreamId> {
        (**self).peek_next_id()
    }

    fn insert(&self, stream: Stream) -> StoreResult<()> {
        (**self).insert(stream)
    }

    fn get(&self, id: StreamId) -> StoreResult<Stream> {
        (**self).get(id)
    }

    fn update(&self, stream: &Stream) -> StoreResult<()> {
        (**self).update(stream)
    }

    fn remove(&self, id: StreamId) -> StoreResult<Stream> {
        (**self).remove(id)
    }

    fn ids(&self) -> Vec<StreamId> {
        (**self).ids()
    }

    fn contains(&self, id: StreamId) -> bool {
        (**self).contains(id)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}
