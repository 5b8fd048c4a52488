use serde::{Deserialize, Serialize};

use drip_store::StreamStore;
use drip_types::{Amount, StreamId};

use crate::error::LedgerError;

/// Running totals of every amount that has crossed the custody boundary.
///
/// Conservation of funds holds when
/// `deposited - retained - paid_out == Σ remaining_balance` over live streams.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyTotals {
    /// Everything collected from senders.
    pub deposited: Amount,
    /// Truncation remainders kept in custody outside any stream.
    pub retained: Amount,
    /// Everything paid to recipients and refunded to senders.
    pub paid_out: Amount,
}

impl CustodyTotals {
    /// Funds that should currently back live streams.
    pub fn held_for_streams(&self) -> Option<Amount> {
        self.deposited
            .checked_sub(self.retained)?
            .checked_sub(self.paid_out)
    }

    /// Funds that should currently sit in custody, remainders included.
    pub fn custodied(&self) -> Option<Amount> {
        self.deposited.checked_sub(self.paid_out)
    }

    pub(crate) fn after_deposit(
        &self,
        collected: Amount,
        retained: Amount,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            deposited: self
                .deposited
                .checked_add(collected)
                .ok_or(LedgerError::Overflow)?,
            retained: self
                .retained
                .checked_add(retained)
                .ok_or(LedgerError::Overflow)?,
            paid_out: self.paid_out,
        })
    }

    pub(crate) fn after_payout(&self, amount: Amount) -> Result<Self, LedgerError> {
        Ok(Self {
            paid_out: self
                .paid_out
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?,
            ..*self
        })
    }
}

/// Result of a custody audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CustodyReport {
    pub stream_count: usize,
    pub total_remaining: Amount,
    pub totals: CustodyTotals,
    pub violations: Vec<Violation>,
}

impl CustodyReport {
    /// Returns `true` if every stream is within bounds and the live
    /// balances exactly match the custody totals.
    pub fn is_balanced(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific inconsistency found during an audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub stream: Option<StreamId>,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ViolationKind {
    /// `remaining_balance` exceeds `streamed_deposit`.
    BalanceOutOfBounds,
    /// Live balances do not add up to the funds the totals say are held.
    ConservationBreak,
}

/// Walk every live stream and check the bound and conservation invariants.
pub fn audit<S: StreamStore + ?Sized>(
    store: &S,
    totals: &CustodyTotals,
) -> Result<CustodyReport, LedgerError> {
    let ids = store.ids();
    let mut violations = Vec::new();
    let mut total_remaining: Amount = 0;

    for id in &ids {
        let stream = store.get(*id)?;
        if stream.remaining_balance > stream.streamed_deposit {
            violations.push(Violation {
                stream: Some(*id),
                kind: ViolationKind::BalanceOutOfBounds,
                description: format!(
                    "remaining {} exceeds streamed deposit {}",
                    stream.remaining_balance, stream.streamed_deposit
                ),
            });
        }
        total_remaining = total_remaining
            .checked_add(stream.remaining_balance)
            .ok_or(LedgerError::Overflow)?;
    }

    match totals.held_for_streams() {
        Some(expected) if expected == total_remaining => {}
        expected => violations.push(Violation {
            stream: None,
            kind: ViolationKind::ConservationBreak,
            description: format!(
                "live streams hold {total_remaining}, totals expect {}",
                expected.map_or_else(|| "a negative amount".to_string(), |e| e.to_string())
            ),
        }),
    }

    Ok(CustodyReport {
        stream_count: ids.len(),
        total_remaining,
        totals: *totals,
        violations,
    })
}
