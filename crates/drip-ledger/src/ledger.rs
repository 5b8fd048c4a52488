use std::sync::Mutex;

use tracing::{error, info, warn};

use drip_store::StreamStore;
use drip_types::{Address, Amount, LedgerEvent, Role, Stream, StreamId, Timestamp};

use crate::audit::{self, CustodyReport, CustodyTotals};
use crate::balance;
use crate::clock::Clock;
use crate::config::{LedgerConfig, RemainderPolicy, StartPolicy};
use crate::error::{LedgerError, RecipientRejection};
use crate::observer::EventObserver;
use crate::transfer::{FundTransfer, Payout, TransferError};

/// Final split paid out by [`StreamingLedger::cancel_stream`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancellation {
    pub sender_share: Amount,
    pub recipient_share: Amount,
}

/// The streaming ledger: creation, balance queries, withdrawal, and
/// cancellation over an injected store, clock, transfer capability, and
/// event observer.
///
/// Withdrawal and cancellation run validate → commit store change →
/// transfer → emit. If the transfer fails the store change is undone and the
/// operation returns [`LedgerError::TransferFailed`]. Because the store is
/// updated before the transfer runs, a transfer that calls back into the
/// ledger already sees the reduced balance.
///
/// Creation pulls funds in rather than paying them out, so it checks
/// everything that can fail first, collects the deposit, and only then
/// stores the record.
///
/// Operations take `&mut self` and must not run concurrently against the
/// same store; wrap the ledger in a [`SharedLedger`](crate::SharedLedger)
/// in multi-threaded hosts or when a transfer re-enters the ledger.
pub struct StreamingLedger<S, C, T, O> {
    config: LedgerConfig,
    store: S,
    clock: C,
    transfer: T,
    observer: O,
    totals: Mutex<CustodyTotals>,
}

impl<S, C, T, O> StreamingLedger<S, C, T, O>
where
    S: StreamStore,
    C: Clock,
    T: FundTransfer,
    O: EventObserver,
{
    pub fn new(config: LedgerConfig, store: S, clock: C, transfer: T, observer: O) -> Self {
        info!(
            identity = %config.identity,
            owner = %config.owner,
            "streaming ledger initialized"
        );
        Self {
            config,
            store,
            clock,
            transfer,
            observer,
            totals: Mutex::new(CustodyTotals::default()),
        }
    }

    /// Resume with custody totals persisted alongside a restored store.
    pub fn with_totals(mut self, totals: CustodyTotals) -> Self {
        *self.totals.get_mut().expect("totals mutex poisoned") = totals;
        self
    }

    // -----------------------------------------------------------------------
    // Mutating operations
    // -----------------------------------------------------------------------

    /// Open a stream from `caller` to `recipient`, collecting the deposit
    /// into custody. Returns the new stream's id.
    pub fn create_stream(
        &mut self,
        caller: &Address,
        recipient: &Address,
        start_time: Timestamp,
        stop_time: Timestamp,
        total_deposit: Amount,
    ) -> Result<StreamId, LedgerError> {
        self.create(caller, recipient, start_time, stop_time, total_deposit)
    }

    /// Pay the recipient everything earned and not yet withdrawn. Returns
    /// the amount paid.
    pub fn withdraw_from_stream(
        &mut self,
        id: StreamId,
        caller: &Address,
    ) -> Result<Amount, LedgerError> {
        self.withdraw(id, caller)
    }

    /// Close a stream early. The recipient receives what they have earned
    /// and not withdrawn, the sender receives the rest, and the record is
    /// deleted.
    pub fn cancel_stream(
        &mut self,
        id: StreamId,
        caller: &Address,
    ) -> Result<Cancellation, LedgerError> {
        self.cancel(id, caller)
    }

    // The bodies below take `&self` so that `SharedLedger` can serve calls
    // made from inside a transfer. Callers outside this crate go through
    // the `&mut self` entry points above.

    pub(crate) fn create(
        &self,
        caller: &Address,
        recipient: &Address,
        start_time: Timestamp,
        stop_time: Timestamp,
        total_deposit: Amount,
    ) -> Result<StreamId, LedgerError> {
        if *recipient == self.config.identity {
            return Err(LedgerError::InvalidRecipient(RecipientRejection::Ledger));
        }
        if recipient == caller {
            return Err(LedgerError::InvalidRecipient(RecipientRejection::Caller));
        }
        if total_deposit == 0 {
            return Err(LedgerError::InvalidDeposit);
        }
        if start_time >= stop_time {
            return Err(LedgerError::InvalidTimeRange {
                start: start_time,
                stop: stop_time,
            });
        }
        let now = self.clock.now();
        if self.config.start_policy == StartPolicy::NotInPast && start_time < now {
            return Err(LedgerError::StartInPast {
                start: start_time,
                now,
            });
        }

        // Nothing that can be checked up front is left for after the
        // collection: a failed creation burns no id and moves no funds.
        let draft = Stream::new(
            self.store.peek_next_id()?,
            *caller,
            *recipient,
            start_time,
            stop_time,
            total_deposit,
        )
        .map_err(|_| LedgerError::InvalidTimeRange {
            start: start_time,
            stop: stop_time,
        })?;
        let collected = match self.config.remainder_policy {
            RemainderPolicy::Retain => total_deposit,
            RemainderPolicy::Refund => draft.streamed_deposit,
        };
        let retained = collected - draft.streamed_deposit;
        self.totals().after_deposit(collected, retained)?;

        if collected > 0 {
            if let Err(err) = self.transfer.collect(caller, collected) {
                warn!(caller = %caller, amount = %collected, error = %err, "deposit collection failed");
                return Err(err.into());
            }
        }

        let stream = match self.store_new(draft) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(caller = %caller, error = %err, "storing new stream failed; returning deposit");
                self.return_deposit(caller, collected);
                return Err(err);
            }
        };

        self.update_totals(|t| t.after_deposit(collected, retained));
        info!(
            id = %stream.id,
            sender = %stream.sender,
            recipient = %stream.recipient,
            deposit = %total_deposit,
            streamed = %stream.streamed_deposit,
            rate = %stream.rate_per_second,
            "stream created"
        );
        self.observer.notify(&LedgerEvent::StreamCreated {
            id: stream.id,
            sender: stream.sender,
            recipient: stream.recipient,
        });
        Ok(stream.id)
    }

    pub(crate) fn withdraw(&self, id: StreamId, caller: &Address) -> Result<Amount, LedgerError> {
        let mut stream = self.store.get(id)?;
        if stream.role_of(caller) != Role::Recipient {
            return Err(LedgerError::Unauthorized {
                id,
                caller: *caller,
            });
        }

        let now = self.clock.now();
        let available = balance::recipient_balance(&stream, now)?;
        if available == 0 {
            return Err(LedgerError::NothingAvailable(id));
        }
        self.totals().after_payout(available)?;

        stream.remaining_balance = stream
            .remaining_balance
            .checked_sub(available)
            .ok_or(LedgerError::Overflow)?;
        self.store.update(&stream)?;

        if let Err(err) = self.pay(&[Payout::new(stream.recipient, available)]) {
            warn!(%id, amount = %available, error = %err, "withdrawal transfer failed; rolling back");
            self.restore_withdrawal(id, available);
            return Err(err.into());
        }

        self.update_totals(|t| t.after_payout(available));
        info!(
            %id,
            amount = %available,
            remaining = %stream.remaining_balance,
            "withdrawal"
        );
        self.observer.notify(&LedgerEvent::Withdrawal {
            id,
            sender: stream.sender,
            recipient: stream.recipient,
            amount: available,
        });
        Ok(available)
    }

    pub(crate) fn cancel(&self, id: StreamId, caller: &Address) -> Result<Cancellation, LedgerError> {
        let stream = self.store.get(id)?;
        if stream.role_of(caller) == Role::Other {
            return Err(LedgerError::Unauthorized {
                id,
                caller: *caller,
            });
        }

        let now = self.clock.now();
        let recipient_share = balance::recipient_balance(&stream, now)?;
        let sender_share = stream
            .remaining_balance
            .checked_sub(recipient_share)
            .ok_or(LedgerError::Overflow)?;
        self.totals().after_payout(stream.remaining_balance)?;

        let removed = self.store.remove(id)?;

        let payouts = [
            Payout::new(stream.recipient, recipient_share),
            Payout::new(stream.sender, sender_share),
        ];
        if let Err(err) = self.pay(&payouts) {
            warn!(%id, error = %err, "cancellation transfer failed; rolling back");
            if let Err(restore) = self.store.insert(removed) {
                error!(%id, error = %restore, "failed to restore stream after declined cancellation");
            }
            return Err(err.into());
        }

        self.update_totals(|t| t.after_payout(stream.remaining_balance));
        info!(
            %id,
            %sender_share,
            %recipient_share,
            "stream canceled"
        );
        self.observer.notify(&LedgerEvent::StreamCanceled {
            id,
            sender: stream.sender,
            recipient: stream.recipient,
            sender_share,
            recipient_share,
        });
        Ok(Cancellation {
            sender_share,
            recipient_share,
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Balance of `address` in stream `id` at the clock's current instant.
    pub fn balance_of(&self, id: StreamId, address: &Address) -> Result<Amount, LedgerError> {
        self.balance_of_at(id, address, self.clock.now())
    }

    /// Balance of `address` in stream `id` at an explicit instant.
    pub fn balance_of_at(
        &self,
        id: StreamId,
        address: &Address,
        at: Timestamp,
    ) -> Result<Amount, LedgerError> {
        let stream = self.store.get(id)?;
        balance::balance_for(&stream, address, at)
    }

    pub fn get_stream(&self, id: StreamId) -> Result<Stream, LedgerError> {
        Ok(self.store.get(id)?)
    }

    /// The last id assigned, i.e. the number of streams ever created.
    pub fn stream_count(&self) -> u64 {
        self.store.last_id().value()
    }

    /// Check the bound and conservation invariants over all live streams.
    pub fn audit(&self) -> Result<CustodyReport, LedgerError> {
        audit::audit(&self.store, &self.totals())
    }

    pub fn owner(&self) -> &Address {
        &self.config.owner
    }

    pub fn identity(&self) -> &Address {
        &self.config.identity
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn totals(&self) -> CustodyTotals {
        *self.totals.lock().expect("totals mutex poisoned")
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Apply a totals change against the current value, so commits made by
    /// re-entrant calls in the meantime are kept.
    fn update_totals(
        &self,
        change: impl FnOnce(&CustodyTotals) -> Result<CustodyTotals, LedgerError>,
    ) {
        let mut totals = self.totals.lock().expect("totals mutex poisoned");
        match change(&totals) {
            Ok(next) => *totals = next,
            Err(err) => error!(error = %err, "custody totals update failed"),
        }
    }

    /// Allocate the real id and insert. A transfer that re-entered `create`
    /// during collection may have taken the id the draft was built with.
    fn store_new(&self, draft: Stream) -> Result<Stream, LedgerError> {
        let id = self.store.next_id()?;
        let stream = Stream { id, ..draft };
        self.store.insert(stream.clone())?;
        Ok(stream)
    }

    /// Disburse the non-zero payouts, if any.
    fn pay(&self, payouts: &[Payout]) -> Result<(), TransferError> {
        let due: Vec<Payout> = payouts.iter().copied().filter(|p| p.amount > 0).collect();
        if due.is_empty() {
            return Ok(());
        }
        self.transfer.disburse(&due)
    }

    /// Credit a declined withdrawal back to its stream. Applied to the
    /// current record so changes made by re-entrant calls are kept.
    fn restore_withdrawal(&self, id: StreamId, amount: Amount) {
        let restored = self.store.get(id).map_err(LedgerError::from).and_then(|mut stream| {
            stream.remaining_balance = stream
                .remaining_balance
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
            Ok(self.store.update(&stream)?)
        });
        if let Err(err) = restored {
            error!(%id, %amount, error = %err, "failed to restore stream after declined withdrawal");
        }
    }

    /// Hand a collected deposit back after creation failed downstream. If
    /// the refund is declined too, the funds stay in custody and are
    /// counted as retained so the totals keep matching custody.
    fn return_deposit(&self, caller: &Address, amount: Amount) {
        if let Err(err) = self.pay(&[Payout::new(*caller, amount)]) {
            error!(caller = %caller, %amount, error = %err, "failed to return deposit after aborted creation; retaining it");
            self.update_totals(|t| t.after_deposit(amount, amount));
        }
    }
}

impl<S, C, T, O> std::fmt::Debug for StreamingLedger<S, C, T, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingLedger")
            .field("identity", &self.config.identity)
            .field("totals", &self.totals)
            .finish_non_exhaustive()
    }
}
