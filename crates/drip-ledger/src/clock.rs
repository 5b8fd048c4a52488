use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use drip_types::Timestamp;

/// Source of the current instant.
///
/// Implementations must be monotonic: a later call never returns a smaller
/// value than an earlier one. The ledger trusts the value completely.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time in whole seconds since the UNIX epoch.
///
/// Remembers the largest value it has handed out so a wall clock stepping
/// backwards cannot make ledger time regress.
#[derive(Debug, Default)]
pub struct SystemClock {
    high_water: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let previous = self.high_water.fetch_max(wall, Ordering::SeqCst);
        previous.max(wall)
    }
}

/// Clock driven explicitly by the host, for tests, simulations, and
/// scenario replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock to `at`. Requests to move backwards are ignored.
    /// Returns the resulting time.
    pub fn set(&self, at: Timestamp) -> Timestamp {
        let previous = self.now.fetch_max(at, Ordering::SeqCst);
        previous.max(at)
    }

    /// Move the clock forward by `seconds`, saturating at the maximum.
    pub fn advance(&self, seconds: u64) -> Timestamp {
        let mut current = self.now.load(Ordering::SeqCst);
        loop {
            let next = current.saturating_add(seconds);
            match self
                .now
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}
