use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use drip_types::{Address, Amount};

/// Failure reported by a [`FundTransfer`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("insufficient funds in {account}: needed {needed}, available {available}")]
    InsufficientFunds {
        account: Address,
        needed: Amount,
        available: Amount,
    },

    #[error("transfer declined: {0}")]
    Declined(String),

    #[error("balance overflow crediting {0}")]
    Overflow(Address),
}

/// One credit owed by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    pub to: Address,
    pub amount: Amount,
}

impl Payout {
    pub fn new(to: Address, amount: Amount) -> Self {
        Self { to, amount }
    }
}

/// Capability that moves currency in and out of the ledger's custody.
///
/// Both methods are atomic: they either fully succeed or leave every
/// balance untouched. The ledger only calls them after its own state change
/// has been committed, and undoes that change when they fail.
pub trait FundTransfer: Send + Sync {
    /// Pull `amount` from `from` into custody.
    fn collect(&self, from: &Address, amount: Amount) -> Result<(), TransferError>;

    /// Pay every payout out of custody, all or nothing.
    fn disburse(&self, payouts: &[Payout]) -> Result<(), TransferError>;
}

impl<T: FundTransfer + ?Sized> FundTransfer for Arc<T> {
    fn collect(&self, from: &Address, amount: Amount) -> Result<(), TransferError> {
        (**self).collect(from, amount)
    }

    fn disburse(&self, payouts: &[Payout]) -> Result<(), TransferError> {
        (**self).disburse(payouts)
    }
}

/// In-memory account book with a single custody account.
///
/// Reference [`FundTransfer`] for tests, simulations, and the CLI. It can be
/// armed to decline the next collection or disbursement so hosts can check
/// that failed transfers leave the ledger untouched.
#[derive(Debug)]
pub struct InMemoryBank {
    custody: Address,
    balances: Mutex<HashMap<Address, Amount>>,
    fail_next_collect: AtomicBool,
    fail_next_disbursement: AtomicBool,
}

impl InMemoryBank {
    /// Create a bank whose custody account is `custody` (normally the
    /// ledger's identity).
    pub fn new(custody: Address) -> Self {
        Self {
            custody,
            balances: Mutex::new(HashMap::new()),
            fail_next_collect: AtomicBool::new(false),
            fail_next_disbursement: AtomicBool::new(false),
        }
    }

    pub fn custody(&self) -> &Address {
        &self.custody
    }

    /// Credit an account from outside the ledger.
    pub fn fund(&self, account: Address, amount: Amount) {
        let mut balances = self.balances.lock().expect("bank mutex poisoned");
        let entry = balances.entry(account).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn balance(&self, account: &Address) -> Amount {
        let balances = self.balances.lock().expect("bank mutex poisoned");
        balances.get(account).copied().unwrap_or(0)
    }

    /// Funds currently held in custody.
    pub fn custody_balance(&self) -> Amount {
        self.balance(&self.custody)
    }

    /// Make the next `collect` call fail.
    pub fn fail_next_collect(&self) {
        self.fail_next_collect.store(true, Ordering::SeqCst);
    }

    /// Make the next `disburse` call fail.
    pub fn fail_next_disbursement(&self) {
        self.fail_next_disbursement.store(true, Ordering::SeqCst);
    }

    /// Snapshot of every non-zero account balance.
    pub fn accounts(&self) -> Vec<(Address, Amount)> {
        let balances = self.balances.lock().expect("bank mutex poisoned");
        let mut accounts: Vec<_> = balances
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|(account, amount)| (*account, *amount))
            .collect();
        accounts.sort();
        accounts
    }
}

impl FundTransfer for InMemoryBank {
    fn collect(&self, from: &Address, amount: Amount) -> Result<(), TransferError> {
        if self.fail_next_collect.swap(false, Ordering::SeqCst) {
            return Err(TransferError::Declined("collection declined".into()));
        }
        let mut balances = self.balances.lock().expect("bank mutex poisoned");
        let available = balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                account: *from,
                needed: amount,
                available,
            });
        }
        let custody = balances.get(&self.custody).copied().unwrap_or(0);
        let credited = custody
            .checked_add(amount)
            .ok_or(TransferError::Overflow(self.custody))?;
        balances.insert(*from, available - amount);
        balances.insert(self.custody, credited);
        Ok(())
    }

    fn disburse(&self, payouts: &[Payout]) -> Result<(), TransferError> {
        if self.fail_next_disbursement.swap(false, Ordering::SeqCst) {
            return Err(TransferError::Declined("disbursement declined".into()));
        }
        let mut balances = self.balances.lock().expect("bank mutex poisoned");

        // Validate against a scratch copy, then swap it in.
        let mut next = balances.clone();
        let needed = payouts
            .iter()
            .try_fold(0 as Amount, |acc, p| acc.checked_add(p.amount))
            .ok_or(TransferError::Overflow(self.custody))?;
        let available = next.get(&self.custody).copied().unwrap_or(0);
        if available < needed {
            return Err(TransferError::InsufficientFunds {
                account: self.custody,
                needed,
                available,
            });
        }
        next.insert(self.custody, available - needed);
        for payout in payouts {
            let entry = next.entry(payout.to).or_insert(0);
            *entry = entry
                .checked_add(payout.amount)
                .ok_or(TransferError::Overflow(payout.to))?;
        }
        *balances = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> (InMemoryBank, Address, Address) {
        let bank = InMemoryBank::new(Address::from_label("ledger"));
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        bank.fund(alice, 1_000);
        (bank, alice, bob)
    }

    #[test]
    fn collect_moves_funds_into_custody() {
        let (bank, alice, _) = bank();
        bank.collect(&alice, 300).unwrap();
        assert_eq!(bank.balance(&alice), 700);
        assert_eq!(bank.custody_balance(), 300);
    }

    #[test]
    fn collect_rejects_insufficient_funds_without_effect() {
        let (bank, alice, _) = bank();
        let err = bank.collect(&alice, 1_001).unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientFunds {
                account: alice,
                needed: 1_001,
                available: 1_000
            }
        );
        assert_eq!(bank.balance(&alice), 1_000);
        assert_eq!(bank.custody_balance(), 0);
    }

    #[test]
    fn disburse_pays_every_payout() {
        let (bank, alice, bob) = bank();
        bank.collect(&alice, 100).unwrap();
        bank.disburse(&[Payout::new(bob, 40), Payout::new(alice, 60)])
            .unwrap();
        assert_eq!(bank.balance(&bob), 40);
        assert_eq!(bank.balance(&alice), 960);
        assert_eq!(bank.custody_balance(), 0);
    }

    #[test]
    fn disburse_is_all_or_nothing() {
        let (bank, alice, bob) = bank();
        bank.collect(&alice, 100).unwrap();
        let err = bank
            .disburse(&[Payout::new(bob, 60), Payout::new(alice, 60)])
            .unwrap_err();
        assert!(matches!(err, TransferError::InsufficientFunds { .. }));
        assert_eq!(bank.balance(&bob), 0);
        assert_eq!(bank.custody_balance(), 100);
    }

    #[test]
    fn armed_failures_fire_once() {
        let (bank, alice, bob) = bank();
        bank.fail_next_collect();
        assert!(matches!(
            bank.collect(&alice, 10),
            Err(TransferError::Declined(_))
        ));
        bank.collect(&alice, 10).unwrap();

        bank.fail_next_disbursement();
        assert!(bank.disburse(&[Payout::new(bob, 10)]).is_err());
        bank.disburse(&[Payout::new(bob, 10)]).unwrap();
        assert_eq!(bank.balance(&bob), 10);
    }

    #[test]
    fn accounts_lists_non_zero_balances() {
        let (bank, alice, _) = bank();
        bank.collect(&alice, 1_000).unwrap();
        assert_eq!(bank.accounts(), vec![(*bank.custody(), 1_000)]);
    }
}
