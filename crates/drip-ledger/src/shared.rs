use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use drip_store::StreamStore;
use drip_types::{Address, Amount, Stream, StreamId, Timestamp};

use crate::audit::CustodyReport;
use crate::clock::Clock;
use crate::error::LedgerError;
use crate::ledger::{Cancellation, StreamingLedger};
use crate::observer::EventObserver;
use crate::transfer::FundTransfer;

/// Cloneable, thread-safe handle to a [`StreamingLedger`].
///
/// Each top-level operation holds one mutex for its whole duration, which
/// serializes all operations against the store and keeps the conservation
/// invariant under concurrent callers.
///
/// A call made by the thread that already holds the mutex, such as a
/// transfer calling back into the ledger while funds move, runs directly
/// against the committed state instead of waiting on itself. A re-entrant
/// withdrawal therefore sees the already reduced balance.
pub struct SharedLedger<S, C, T, O> {
    inner: Arc<Inner<S, C, T, O>>,
}

struct Inner<S, C, T, O> {
    ledger: StreamingLedger<S, C, T, O>,
    gate: Mutex<()>,
    holder: Mutex<Option<ThreadId>>,
}

/// Exclusive turn on the ledger. Clears the holder before the gate opens.
struct Turn<'a> {
    holder: &'a Mutex<Option<ThreadId>>,
    _gate: MutexGuard<'a, ()>,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        *self.holder.lock().expect("holder mutex poisoned") = None;
    }
}

impl<S, C, T, O> Clone for SharedLedger<S, C, T, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, C, T, O> SharedLedger<S, C, T, O>
where
    S: StreamStore,
    C: Clock,
    T: FundTransfer,
    O: EventObserver,
{
    pub fn new(ledger: StreamingLedger<S, C, T, O>) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                gate: Mutex::new(()),
                holder: Mutex::new(None),
            }),
        }
    }

    /// Take a turn, or `None` if this thread already has one.
    fn enter(&self) -> Option<Turn<'_>> {
        let me = thread::current().id();
        if *self.inner.holder.lock().expect("holder mutex poisoned") == Some(me) {
            return None;
        }
        let gate = self.inner.gate.lock().expect("ledger mutex poisoned");
        *self.inner.holder.lock().expect("holder mutex poisoned") = Some(me);
        Some(Turn {
            holder: &self.inner.holder,
            _gate: gate,
        })
    }

    /// Run `f` with exclusive access to the ledger.
    pub fn with<R>(&self, f: impl FnOnce(&StreamingLedger<S, C, T, O>) -> R) -> R {
        let _turn = self.enter();
        f(&self.inner.ledger)
    }

    pub fn create_stream(
        &self,
        caller: &Address,
        recipient: &Address,
        start_time: Timestamp,
        stop_time: Timestamp,
        total_deposit: Amount,
    ) -> Result<StreamId, LedgerError> {
        self.with(|l| l.create(caller, recipient, start_time, stop_time, total_deposit))
    }

    pub fn withdraw_from_stream(
        &self,
        id: StreamId,
        caller: &Address,
    ) -> Result<Amount, LedgerError> {
        self.with(|l| l.withdraw(id, caller))
    }

    pub fn cancel_stream(
        &self,
        id: StreamId,
        caller: &Address,
    ) -> Result<Cancellation, LedgerError> {
        self.with(|l| l.cancel(id, caller))
    }

    pub fn balance_of(&self, id: StreamId, address: &Address) -> Result<Amount, LedgerError> {
        self.with(|l| l.balance_of(id, address))
    }

    pub fn get_stream(&self, id: StreamId) -> Result<Stream, LedgerError> {
        self.with(|l| l.get_stream(id))
    }

    pub fn stream_count(&self) -> u64 {
        self.with(|l| l.stream_count())
    }

    pub fn audit(&self) -> Result<CustodyReport, LedgerError> {
        self.with(|l| l.audit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::LedgerConfig;
    use crate::transfer::{InMemoryBank, Payout, TransferError};
    use drip_store::InMemoryStreamStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::OnceLock;

    type Ledger = SharedLedger<InMemoryStreamStore, Arc<ManualClock>, Arc<InMemoryBank>, ()>;

    fn setup() -> (Ledger, Arc<ManualClock>, Arc<InMemoryBank>) {
        let config = LedgerConfig::default();
        let clock = Arc::new(ManualClock::new(0));
        let bank = Arc::new(InMemoryBank::new(config.identity));
        let ledger = StreamingLedger::new(
            config,
            InMemoryStreamStore::new(),
            Arc::clone(&clock),
            Arc::clone(&bank),
            (),
        );
        (SharedLedger::new(ledger), clock, bank)
    }

    #[test]
    fn concurrent_withdrawals_never_double_spend() {
        let (ledger, clock, bank) = setup();
        let sender = Address::from_label("sender");
        let recipient = Address::from_label("recipient");
        bank.fund(sender, 10_000);
        let id = ledger
            .create_stream(&sender, &recipient, 100, 200, 10_000)
            .unwrap();
        clock.set(150);

        let paid: Amount = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let ledger = ledger.clone();
                    scope.spawn(move || ledger.withdraw_from_stream(id, &recipient).unwrap_or(0))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(paid, 5_000);
        assert_eq!(bank.balance(&recipient), 5_000);
        assert!(ledger.audit().unwrap().is_balanced());
    }

    #[test]
    fn concurrent_cancels_pay_out_once() {
        let (ledger, clock, bank) = setup();
        let sender = Address::from_label("sender");
        let recipient = Address::from_label("recipient");
        bank.fund(sender, 1_000);
        let id = ledger
            .create_stream(&sender, &recipient, 0, 100, 1_000)
            .unwrap();
        clock.set(30);

        let successes = thread::scope(|scope| {
            let handles: Vec<_> = [sender, recipient, sender, recipient]
                .into_iter()
                .map(|caller| {
                    let ledger = ledger.clone();
                    scope.spawn(move || ledger.cancel_stream(id, &caller))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|r| r.is_ok())
                .count()
        });

        assert_eq!(successes, 1);
        assert_eq!(ledger.get_stream(id), Err(LedgerError::NotFound(id)));
        assert_eq!(bank.balance(&recipient), 300);
        assert_eq!(bank.balance(&sender), 700);
        assert_eq!(bank.custody_balance(), 0);
    }

    #[test]
    fn with_exposes_the_inner_ledger() {
        let (ledger, _, _) = setup();
        let owner = ledger.with(|l| *l.owner());
        assert_eq!(owner, LedgerConfig::default().owner);
        assert_eq!(ledger.stream_count(), 0);
    }

    // -----------------------------------------------------------------------
    // Re-entry from the transfer capability
    // -----------------------------------------------------------------------

    type ReenteringLedger =
        SharedLedger<InMemoryStreamStore, Arc<ManualClock>, Arc<Reentering>, ()>;

    enum Callback {
        Withdraw,
        Cancel,
    }

    /// Transfer that calls back into the ledger once, from inside
    /// `disburse`, before moving any funds.
    struct Reentering {
        bank: InMemoryBank,
        ledger: OnceLock<ReenteringLedger>,
        armed: AtomicBool,
        callback: Callback,
        target: (StreamId, Address),
        outcomes: Mutex<Vec<String>>,
    }

    impl FundTransfer for Reentering {
        fn collect(&self, from: &Address, amount: Amount) -> Result<(), TransferError> {
            self.bank.collect(from, amount)
        }

        fn disburse(&self, payouts: &[Payout]) -> Result<(), TransferError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                if let Some(ledger) = self.ledger.get() {
                    let (id, caller) = self.target;
                    let outcome = match self.callback {
                        Callback::Withdraw => ledger
                            .withdraw_from_stream(id, &caller)
                            .map(|amount| format!("withdrew {amount}")),
                        Callback::Cancel => ledger
                            .cancel_stream(id, &caller)
                            .map(|c| format!("canceled {}/{}", c.sender_share, c.recipient_share)),
                    };
                    let outcome = outcome.unwrap_or_else(|err| err.kind().to_string());
                    self.outcomes.lock().unwrap().push(outcome);
                }
            }
            self.bank.disburse(payouts)
        }
    }

    fn reentering(
        callback: Callback,
        caller: Address,
    ) -> (ReenteringLedger, Arc<Reentering>, Arc<ManualClock>) {
        let config = LedgerConfig::default();
        let clock = Arc::new(ManualClock::new(0));
        let transfer = Arc::new(Reentering {
            bank: InMemoryBank::new(config.identity),
            ledger: OnceLock::new(),
            armed: AtomicBool::new(false),
            callback,
            target: (StreamId::FIRST, caller),
            outcomes: Mutex::new(Vec::new()),
        });
        transfer.bank.fund(Address::from_label("sender"), 100);
        let ledger = SharedLedger::new(StreamingLedger::new(
            config,
            InMemoryStreamStore::new(),
            Arc::clone(&clock),
            Arc::clone(&transfer),
            (),
        ));
        assert!(transfer.ledger.set(ledger.clone()).is_ok());
        (ledger, transfer, clock)
    }

    #[test]
    fn reentrant_withdrawal_sees_reduced_balance() {
        let sender = Address::from_label("sender");
        let recipient = Address::from_label("recipient");
        let (ledger, transfer, clock) = reentering(Callback::Withdraw, recipient);
        let id = ledger.create_stream(&sender, &recipient, 0, 100, 100).unwrap();
        clock.set(30);

        transfer.armed.store(true, Ordering::SeqCst);
        assert_eq!(ledger.withdraw_from_stream(id, &recipient), Ok(30));

        assert_eq!(*transfer.outcomes.lock().unwrap(), vec!["nothing_available"]);
        assert_eq!(transfer.bank.balance(&recipient), 30);
        assert_eq!(ledger.get_stream(id).unwrap().remaining_balance, 70);
        assert!(ledger.audit().unwrap().is_balanced());
    }

    #[test]
    fn reentrant_cancel_cannot_double_pay() {
        let sender = Address::from_label("sender");
        let recipient = Address::from_label("recipient");
        let (ledger, transfer, clock) = reentering(Callback::Cancel, sender);
        let id = ledger.create_stream(&sender, &recipient, 0, 100, 100).unwrap();
        clock.set(30);

        transfer.armed.store(true, Ordering::SeqCst);
        assert_eq!(ledger.withdraw_from_stream(id, &recipient), Ok(30));

        // The recipient's 30 was already committed, so the cancel owes them nothing.
        assert_eq!(*transfer.outcomes.lock().unwrap(), vec!["canceled 70/0"]);
        assert_eq!(transfer.bank.balance(&recipient), 30);
        assert_eq!(transfer.bank.balance(&sender), 70);
        assert_eq!(transfer.bank.custody_balance(), 0);
        assert_eq!(ledger.get_stream(id), Err(LedgerError::NotFound(id)));
        let report = ledger.audit().unwrap();
        assert!(report.is_balanced(), "{:?}", report.violations);
        assert_eq!(report.totals.paid_out, 100);
    }

    #[test]
    fn nested_call_on_the_holding_thread_does_not_block() {
        let (ledger, _, _) = setup();
        let count = ledger.with(|_| ledger.stream_count());
        assert_eq!(count, 0);
        // The turn is released afterwards.
        assert!(ledger.audit().unwrap().is_balanced());
    }
}
