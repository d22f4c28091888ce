use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Cents, LedgerError, Transaction, TransactionKind};

/// Totals for one (category, kind) bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub kind: TransactionKind,
    pub total: Cents,
    pub count: i64,
}

/// Group live transactions by (category, kind).
/// Sorted by total descending; ties are broken by category then kind so the
/// result is a pure function of its input.
pub fn aggregate_by_category(
    transactions: &[Transaction],
) -> Result<Vec<CategoryTotal>, LedgerError> {
    let mut buckets: HashMap<(&str, TransactionKind), (Cents, i64)> = HashMap::new();

    for transaction in transactions.iter().filter(|t| !t.is_deleted()) {
        let entry = buckets
            .entry((transaction.category.as_str(), transaction.kind))
            .or_insert((0, 0));
        entry.0 = entry
            .0
            .checked_add(transaction.amount_cents)
            .ok_or(LedgerError::Overflow)?;
        entry.1 += 1;
    }

    let mut totals: Vec<CategoryTotal> = buckets
        .into_iter()
        .map(|((category, kind), (total, count))| CategoryTotal {
            category: category.to_string(),
            kind,
            total,
            count,
        })
        .collect();

    sort_category_totals(&mut totals);
    Ok(totals)
}

/// Canonical ordering for category aggregates.
pub fn sort_category_totals(totals: &mut [CategoryTotal]) {
    totals.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.kind.cmp(&b.kind))
    });
}

/// What soft-deleting a transaction does to the owning account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPolicy {
    /// Only flag the record; balance and totals keep its effect
    #[default]
    Retain,
    /// Undo the effect on delete and re-apply it on restore
    Reverse,
}

impl DeletionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionPolicy::Retain => "retain",
            DeletionPolicy::Reverse => "reverse",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "retain" => Some(DeletionPolicy::Retain),
            "reverse" => Some(DeletionPolicy::Reverse),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
