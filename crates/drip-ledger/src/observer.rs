use std::sync::{Arc, Mutex};

use drip_types::LedgerEvent;
use tracing::info;

/// Fire-and-forget sink for [`LedgerEvent`]s.
///
/// Called once per committed operation, after every state change and
/// transfer has succeeded. Observers cannot fail the operation.
pub trait EventObserver: Send + Sync {
    fn notify(&self, event: &LedgerEvent);
}

/// Discards every event.
impl EventObserver for () {
    fn notify(&self, _event: &LedgerEvent) {}
}

impl<O: EventObserver + ?Sized> EventObserver for Arc<O> {
    fn notify(&self, event: &LedgerEvent) {
        (**self).notify(event)
    }
}

/// Logs each event through `tracing` at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn notify(&self, event: &LedgerEvent) {
        info!(
            event = event.name(),
            stream = %event.stream_id(),
            "{event}"
        );
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LedgerEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events recorded so far.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().expect("observer mutex poisoned").clone()
    }

    /// Drain recorded events.
    pub fn take(&self) -> Vec<LedgerEvent> {
        std::mem::take(&mut *self.events.lock().expect("observer mutex poisoned"))
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("observer mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventObserver for RecordingObserver {
    fn notify(&self, event: &LedgerEvent) {
        self.events
            .lock()
            .expect("observer mutex poisoned")
            .push(event.clone());
    }
}
