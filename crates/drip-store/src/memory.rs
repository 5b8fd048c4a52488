use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use drip_types::{Stream, StreamId};

use crate::error::{StoreError, StoreResult};
use crate::traits::StreamStore;

/// In-memory, `BTreeMap`-based stream store.
///
/// Intended for tests and embedding. Records are held behind a `RwLock` and
/// cloned on read. Hosts that need durability persist a [`StoreSnapshot`]
/// and rebuild the store with [`InMemoryStreamStore::restore`].
pub struct InMemoryStreamStore {
    inner: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    last_id: u64,
    streams: BTreeMap<StreamId, Stream>,
}

/// Serializable image of a store: the id counter plus every live record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub last_id: u64,
    pub streams: Vec<Stream>,
}

impl InMemoryStreamStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreState::default()),
        }
    }

    /// Capture the current state.
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.inner.read().expect("lock poisoned");
        StoreSnapshot {
            last_id: state.last_id,
            streams: state.streams.values().cloned().collect(),
        }
    }

    /// Rebuild a store from a snapshot.
    ///
    /// Rejects snapshots holding a record whose id was never allocated
    /// (greater than `last_id`, or zero), holding the same id twice, or
    /// holding a record that fails [`Stream::check`].
    pub fn restore(snapshot: StoreSnapshot) -> StoreResult<Self> {
        let mut streams = BTreeMap::new();
        for stream in snapshot.streams {
            let id = stream.id;
            stream
                .check()
                .map_err(|err| StoreError::CorruptSnapshot(err.to_string()))?;
            if id.0 == 0 || id.0 > snapshot.last_id {
                return Err(StoreError::CorruptSnapshot(format!(
                    "{id} outside allocated range 1..={}",
                    snapshot.last_id
                )));
            }
            if streams.insert(id, stream).is_some() {
                return Err(StoreError::CorruptSnapshot(format!("{id} appears twice")));
            }
        }
        debug!(
            last_id = snapshot.last_id,
            streams = streams.len(),
            "store restored"
        );
        Ok(Self {
            inner: RwLock::new(StoreState {
                last_id: snapshot.last_id,
                streams,
            }),
        })
    }
}

impl Default for InMemoryStreamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamStore for InMemoryStreamStore {
    fn next_id(&self) -> StoreResult<StreamId> {
        let mut state = self.inner.write().expect("lock poisoned");
        state.last_id = state.last_id.checked_add(1).ok_or(StoreError::IdExhausted)?;
        Ok(StreamId(state.last_id))
    }

    fn last_id(&self) -> StreamId {
        StreamId(self.inner.read().expect("lock poisoned").last_id)
    }

    fn insert(&self, stream: Stream) -> StoreResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        let id = stream.id;
        if state.streams.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        state.streams.insert(id, stream);
        debug!(%id, "stream inserted");
        Ok(())
    }

    fn get(&self, id: StreamId) -> StoreResult<Stream> {
        let state = self.inner.read().expect("lock poisoned");
        state.streams.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    fn update(&self, stream: &Stream) -> StoreResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        let slot = state
            .streams
            .get_mut(&stream.id)
            .ok_or(StoreError::NotFound(stream.id))?;
        *slot = stream.clone();
        debug!(id = %stream.id, remaining = %stream.remaining_balance, "stream updated");
        Ok(())
    }

    fn remove(&self, id: StreamId) -> StoreResult<Stream> {
        let mut state = self.inner.write().expect("lock poisoned");
        let removed = state.streams.remove(&id).ok_or(StoreError::NotFound(id))?;
        debug!(%id, "stream removed");
        Ok(removed)
    }

    fn ids(&self) -> Vec<StreamId> {
        let state = self.inner.read().expect("lock poisoned");
        state.streams.keys().copied().collect()
    }

    fn contains(&self, id: StreamId) -> bool {
        self.inner
            .read()
            .expect("lock poisoned")
            .streams
            .contains_key(&id)
    }

    fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").streams.len()
    }
}

impl std::fmt::Debug for InMemoryStreamStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read().expect("lock poisoned");
        f.debug_struct("InMemoryStreamStore")
            .field("last_id", &state.last_id)
            .field("stream_count", &state.streams.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drip_types::Address;
    use std::sync::Arc;

    fn make_stream(store: &InMemoryStreamStore) -> Stream {
        let id = store.next_id().unwrap();
        Stream::new(
            id,
            Address::from_label("sender"),
            Address::from_label("recipient"),
            100,
            200,
            1_000,
        )
        .unwrap()
    }

    // -----------------------------------------------------------------------
    // Id assignment
    // -----------------------------------------------------------------------

    #[test]
    fn ids_start_at_one_and_increase() {
        let store = InMemoryStreamStore::new();
        assert_eq!(store.last_id(), StreamId(0));
        assert_eq!(store.next_id().unwrap(), StreamId::FIRST);
        assert_eq!(store.next_id().unwrap(), StreamId(2));
        assert_eq!(store.last_id(), StreamId(2));
    }

    #[test]
    fn peek_does_not_allocate() {
        let store = InMemoryStreamStore::new();
        assert_eq!(store.peek_next_id().unwrap(), StreamId::FIRST);
        assert_eq!(store.peek_next_id().unwrap(), StreamId::FIRST);
        assert_eq!(store.next_id().unwrap(), StreamId::FIRST);
        assert_eq!(store.peek_next_id().unwrap(), StreamId(2));
    }

    #[test]
    fn exhausted_counter_fails_peek_and_next() {
        let store = InMemoryStreamStore::restore(StoreSnapshot {
            last_id: u64::MAX,
            streams: Vec::new(),
        })
        .unwrap();
        assert_eq!(store.peek_next_id(), Err(StoreError::IdExhausted));
        assert_eq!(store.next_id(), Err(StoreError::IdExhausted));
        assert_eq!(store.last_id(), StreamId(u64::MAX));
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let store = InMemoryStreamStore::new();
        let stream = make_stream(&store);
        store.insert(stream.clone()).unwrap();
        store.remove(stream.id).unwrap();
        assert_eq!(store.next_id().unwrap(), StreamId(2));
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn insert_and_get() {
        let store = InMemoryStreamStore::new();
        let stream = make_stream(&store);
        store.insert(stream.clone()).unwrap();
        assert_eq!(store.get(stream.id).unwrap(), stream);
        assert!(store.contains(stream.id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn insert_duplicate_fails() {
        let store = InMemoryStreamStore::new();
        let stream = make_stream(&store);
        store.insert(stream.clone()).unwrap();
        assert_eq!(
            store.insert(stream.clone()),
            Err(StoreError::DuplicateId(stream.id))
        );
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = InMemoryStreamStore::new();
        assert_eq!(store.get(StreamId(9)), Err(StoreError::NotFound(StreamId(9))));
    }

    #[test]
    fn update_replaces_existing_record() {
        let store = InMemoryStreamStore::new();
        let mut stream = make_stream(&store);
        store.insert(stream.clone()).unwrap();
        stream.remaining_balance -= 300;
        store.update(&stream).unwrap();
        assert_eq!(store.get(stream.id).unwrap().remaining_balance, 700);
    }

    #[test]
    fn update_missing_is_not_found() {
        let store = InMemoryStreamStore::new();
        let stream = make_stream(&store);
        assert_eq!(store.update(&stream), Err(StoreError::NotFound(stream.id)));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_twice_signals_not_found() {
        let store = InMemoryStreamStore::new();
        let stream = make_stream(&store);
        store.insert(stream.clone()).unwrap();
        assert_eq!(store.remove(stream.id).unwrap(), stream);
        assert_eq!(store.remove(stream.id), Err(StoreError::NotFound(stream.id)));
        assert_eq!(store.get(stream.id), Err(StoreError::NotFound(stream.id)));
    }

    #[test]
    fn ids_are_sorted() {
        let store = InMemoryStreamStore::new();
        let a = make_stream(&store);
        let b = make_stream(&store);
        store.insert(b.clone()).unwrap();
        store.insert(a.clone()).unwrap();
        assert_eq!(store.ids(), vec![a.id, b.id]);
    }

    #[test]
    fn arc_store_shares_state() {
        let store = Arc::new(InMemoryStreamStore::new());
        let handle = Arc::clone(&store);
        let stream = make_stream(&store);
        handle.insert(stream.clone()).unwrap();
        assert!(StreamStore::contains(&store, stream.id));
        assert_eq!(StreamStore::last_id(&handle), stream.id);
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    #[test]
    fn snapshot_restore_preserves_counter_and_records() {
        let store = InMemoryStreamStore::new();
        let kept = make_stream(&store);
        let dropped = make_stream(&store);
        store.insert(kept.clone()).unwrap();
        store.insert(dropped.clone()).unwrap();
        store.remove(dropped.id).unwrap();

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        let snapshot: StoreSnapshot = serde_json::from_str(&json).unwrap();
        let restored = InMemoryStreamStore::restore(snapshot).unwrap();

        assert_eq!(restored.get(kept.id).unwrap(), kept);
        assert_eq!(
            restored.get(dropped.id),
            Err(StoreError::NotFound(dropped.id))
        );
        assert_eq!(restored.next_id().unwrap(), StreamId(3));
    }

    #[test]
    fn restore_rejects_unallocated_id() {
        let store = InMemoryStreamStore::new();
        let stream = make_stream(&store);
        let snapshot = StoreSnapshot {
            last_id: 0,
            streams: vec![stream],
        };
        assert!(matches!(
            InMemoryStreamStore::restore(snapshot),
            Err(StoreError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn restore_rejects_inconsistent_records() {
        let store = InMemoryStreamStore::new();
        let valid = make_stream(&store);
        let tampered: [fn(&mut Stream); 4] = [
            |s| s.remaining_balance = s.streamed_deposit + 1,
            |s| s.stop_time = s.start_time,
            |s| s.streamed_deposit -= 100,
            |s| s.rate_per_second += 1,
        ];
        for tamper in tampered {
            let mut stream = valid.clone();
            tamper(&mut stream);
            let snapshot = StoreSnapshot {
                last_id: 1,
                streams: vec![stream],
            };
            assert!(matches!(
                InMemoryStreamStore::restore(snapshot),
                Err(StoreError::CorruptSnapshot(_))
            ));
        }
    }

    #[test]
    fn restore_accepts_partly_withdrawn_records() {
        let store = InMemoryStreamStore::new();
        let mut stream = make_stream(&store);
        stream.remaining_balance = 1;
        let snapshot = StoreSnapshot {
            last_id: 1,
            streams: vec![stream.clone()],
        };
        let restored = InMemoryStreamStore::restore(snapshot).unwrap();
        assert_eq!(restored.get(stream.id).unwrap(), stream);
    }

    #[test]
    fn restore_rejects_duplicate_records() {
        let store = InMemoryStreamStore::new();
        let stream = make_stream(&store);
        let snapshot = StoreSnapshot {
            last_id: 1,
            streams: vec![stream.clone(), stream],
        };
        assert!(matches!(
            InMemoryStreamStore::restore(snapshot),
            Err(StoreError::CorruptSnapshot(_))
        ));
    }
}
