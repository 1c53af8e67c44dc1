//! Ledger module
//!
//! Account balances are never stored as a mutable column. A balance is the
//! latest snapshot plus the signed sum of completed transactions recorded
//! after the snapshot's reference transaction.

mod service;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Amount, AmountError, Balance, DomainError, TransactionType};

pub use service::{AccountBalance, BalanceService, BalanceView, Snapshot};
pub(crate) use service::lock_account;

/// Signed contribution of a ledger entry to the balance
pub fn signed_amount(kind: TransactionType, amount: Decimal) -> Decimal {
    match kind {
        TransactionType::Deposit => amount,
        TransactionType::Withdrawal => -amount,
    }
}

/// Fold ledger entries recorded after a snapshot onto the snapshot balance
pub fn fold_balance<I>(snapshot_balance: Decimal, entries: I) -> Decimal
where
    I: IntoIterator<Item = (TransactionType, Decimal)>,
{
    entries
        .into_iter()
        .fold(snapshot_balance, |acc, (kind, amount)| acc + signed_amount(kind, amount))
}

/// Reject a withdrawal that would take the balance below zero
pub fn ensure_sufficient(available: Decimal, amount: &Amount) -> Result<(), DomainError> {
    let sufficient = match Balance::new(available) {
        Ok(balance) => balance.is_sufficient_for(amount),
        // Above the per-row column range, still covers any single amount
        Err(AmountError::Overflow) => true,
        Err(_) => false,
    };

    if sufficient {
        Ok(())
    } else {
        Err(DomainError::insufficient_funds(amount.value(), available))
    }
}

/// Ledger errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<crate::event_store::EventStoreError> for LedgerError {
    fn from(err: crate::event_store::EventStoreError) -> Self {
        match err {
            crate::event_store::EventStoreError::Database(e) => LedgerError::Database(e),
            crate::event_store::EventStoreError::Serialization(e) => {
                LedgerError::Domain(DomainError::InvalidValue(e.to_string()))
            }
        }
    }
}
