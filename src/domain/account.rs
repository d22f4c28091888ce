use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, TransactionKind};

pub type AccountId = Uuid;

/// External identity of a chat user (e.g. a Telegram user id).
pub type UserKey = i64;

/// A user's financial summary: running balance plus aggregate counters.
///
/// Invariants, enforced by [`Account::apply_transaction`] and
/// [`Account::revert_transaction`]:
/// - `balance == total_income - total_expenses`
/// - `balance >= 0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_key: UserKey,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub currency: String,
    pub balance: Cents,
    pub total_income: Cents,
    pub total_expenses: Cents,
    pub transaction_count: i64,
    /// Optimistic concurrency token, bumped by every ledger write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_key: UserKey, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_key,
            username: None,
            display_name: None,
            currency: currency.into(),
            balance: 0,
            total_income: 0,
            total_expenses: 0,
            transaction_count: 0,
            version: 0,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Returns true if the aggregate counters agree with each other.
    pub fn is_consistent(&self) -> bool {
        self.balance >= 0
            && self.total_income >= 0
            && self.total_expenses >= 0
            && self.transaction_count >= 0
            && self.total_income.checked_sub(self.total_expenses) == Some(self.balance)
    }

    /// Compute the account state after recording a transaction.
    ///
    /// The returned value carries the next `version`; the receiver is left
    /// untouched so the caller can still compare against the stored version.
    pub fn apply_transaction(
        &self,
        kind: TransactionKind,
        amount: Cents,
    ) -> Result<Account, LedgerError> {
        let mut next = self.clone();

        match kind {
            TransactionKind::Income => {
                next.balance = checked(self.balance.checked_add(amount))?;
                next.total_income = checked(self.total_income.checked_add(amount))?;
            }
            TransactionKind::Expense => {
                if self.balance < amount {
                    return Err(LedgerError::InsufficientFunds {
                        balance: self.balance,
                        required: amount,
                    });
                }
                next.balance = self.balance - amount;
                next.total_expenses = checked(self.total_expenses.checked_add(amount))?;
            }
            TransactionKind::Transfer => {}
        }

        next.transaction_count = checked(self.transaction_count.checked_add(1))?;
        next.version = self.version + 1;
        next.last_activity_at = Utc::now();
        Ok(next)
    }

    /// Compute the account state with a previously applied transaction undone.
    pub fn revert_transaction(
        &self,
        kind: TransactionKind,
        amount: Cents,
    ) -> Result<Account, LedgerError> {
        let mut next = self.clone();

        match kind {
            TransactionKind::Income => {
                if self.balance < amount {
                    return Err(LedgerError::InsufficientFunds {
                        balance: self.balance,
                        required: amount,
                    });
                }
                if self.total_income < amount {
                    return Err(LedgerError::Overflow);
                }
                next.balance = self.balance - amount;
                next.total_income = self.total_income - amount;
            }
            TransactionKind::Expense => {
                if self.total_expenses < amount {
                    return Err(LedgerError::Overflow);
                }
                next.balance = checked(self.balance.checked_add(amount))?;
                next.total_expenses = self.total_expenses - amount;
            }
            TransactionKind::Transfer => {}
        }

        if self.transaction_count == 0 {
            return Err(LedgerError::Overflow);
        }
        next.transaction_count = self.transaction_count - 1;
        next.version = self.version + 1;
        next.last_activity_at = Utc::now();
        Ok(next)
    }
}

fn checked(value: Option<Cents>) -> Result<Cents, LedgerError> {
    value.ok_or(LedgerError::Overflow)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    InsufficientFunds { balance: Cents, required: Cents },
    /// A counter would leave its representable (or meaningful) range
    Overflow,
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::InsufficientFunds { balance, required } => write!(
                f,
                "Insufficient funds: balance {} cents, required {} cents",
                balance, required
            ),
            LedgerError::Overflow => write!(f, "Ledger counters out of range"),
        }
    }
}

impl std::error::Error for LedgerError {}
