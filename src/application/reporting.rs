use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Account, AccountId, CategoryTotal, Cents, TransactionKind, UserKey};

/// Point-in-time view of an account's aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub account_id: AccountId,
    pub user_key: UserKey,
    pub currency: String,
    pub balance: Cents,
    pub total_income: Cents,
    pub total_expenses: Cents,
    pub transaction_count: i64,
    pub last_activity_at: DateTime<Utc>,
}

impl From<&Account> for BalanceSnapshot {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            user_key: account.user_key,
            currency: account.currency.clone(),
            balance: account.balance,
            total_income: account.total_income,
            total_expenses: account.total_expenses,
            transaction_count: account.transaction_count,
            last_activity_at: account.last_activity_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodStatistics {
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub currency: String,
    pub total_income: Cents,
    pub total_expense: Cents,
    pub net: Cents,
    pub income_count: i64,
    pub expense_count: i64,
    /// Largest expense categories, with their share of `total_expense`
    pub top_expenses: Vec<CategoryShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: String,
    pub total: Cents,
    pub count: i64,
    pub percentage: f64,
}

impl PeriodStatistics {
    /// Fold category aggregates into period totals. `totals` must already be
    /// in canonical order (largest first).
    pub fn from_category_totals(
        from_date: DateTime<Utc>,
        to_date: DateTime<Utc>,
        currency: impl Into<String>,
        totals: &[CategoryTotal],
        top: usize,
    ) -> Self {
        let sum = |kind: TransactionKind| -> (Cents, i64) {
            totals
                .iter()
                .filter(|t| t.kind == kind)
                .fold((0, 0), |(total, count), t| (total + t.total, count + t.count))
        };
        let (total_income, income_count) = sum(TransactionKind::Income);
        let (total_expense, expense_count) = sum(TransactionKind::Expense);

        let top_expenses = totals
            .iter()
            .filter(|t| t.kind == TransactionKind::Expense)
            .take(top)
            .map(|t| CategoryShare {
                category: t.category.clone(),
                total: t.total,
                count: t.count,
                percentage: if total_expense > 0 {
                    t.total as f64 / total_expense as f64 * 100.0
                } else {
                    0.0
                },
            })
            .collect();

        Self {
            from_date,
            to_date,
            currency: currency.into(),
            total_income,
            total_expense,
            net: total_income - total_expense,
            income_count,
            expense_count,
            top_expenses,
        }
    }
}
