use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type TransactionId = Uuid;

/// Longest category name the store accepts.
pub const MAX_CATEGORY_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
    /// Movement between a user's own pockets; counted but balance-neutral
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
            TransactionKind::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "income" => Some(TransactionKind::Income),
            "expense" => Some(TransactionKind::Expense),
            "transfer" => Some(TransactionKind::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How often a recurring transaction repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "monthly" => Some(Frequency::Monthly),
            "yearly" => Some(Frequency::Yearly),
            _ => None,
        }
    }

    /// The occurrence following `from`.
    /// Month arithmetic is calendar based: Jan 31 + 1 month lands on the last day of February.
    pub fn advance(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Frequency::Daily => from.checked_add_signed(Duration::days(1)),
            Frequency::Weekly => from.checked_add_signed(Duration::days(7)),
            Frequency::Monthly => from.checked_add_months(Months::new(1)),
            Frequency::Yearly => from.checked_add_months(Months::new(12)),
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: Frequency,
    pub next_occurrence: DateTime<Utc>,
}

/// A single income, expense or transfer event.
/// Amounts are always positive; direction comes from `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Creation order within the store, assigned on append
    pub sequence: i64,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub amount_cents: Cents,
    pub currency: String,
    pub category: String,
    pub description: Option<String>,
    /// When the event happened in the real world
    pub occurred_at: DateTime<Utc>,
    /// When the ledger recorded it
    pub recorded_at: DateTime<Utc>,
    pub recurrence: Option<Recurrence>,
    /// Recurring template this occurrence was materialized from
    pub parent_id: Option<TransactionId>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Create a new transaction. Sequence number is assigned by the store.
    pub fn new(
        account_id: AccountId,
        kind: TransactionKind,
        amount_cents: Cents,
        category: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            account_id,
            kind,
            amount_cents,
            currency: String::new(),
            category: category.into(),
            description: None,
            occurred_at,
            recorded_at: Utc::now(),
            recurrence: None,
            parent_id: None,
            deleted_at: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark as recurring; the first repetition is derived from `occurred_at`.
    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.recurrence = frequency
            .advance(self.occurred_at)
            .map(|next_occurrence| Recurrence {
                frequency,
                next_occurrence,
            });
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Build the concrete occurrence due at this template's `next_occurrence`.
    pub fn materialize_occurrence(&self) -> Option<Transaction> {
        let recurrence = self.recurrence?;
        let mut occurrence = Transaction::new(
            self.account_id,
            self.kind,
            self.amount_cents,
            self.category.clone(),
            recurrence.next_occurrence,
        )
        .with_currency(self.currency.clone());
        occurrence.description = self.description.clone();
        occurrence.parent_id = Some(self.id);
        Some(occurrence)
    }
}

/// Normalize and check a category name.
pub fn validate_category(category: &str) -> Result<String, FieldError> {
    let category = category.trim();
    if category.is_empty() {
        return Err(FieldError::EmptyCategory);
    }
    if category.chars().count() > MAX_CATEGORY_LEN {
        return Err(FieldError::CategoryTooLong);
    }
    Ok(category.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    EmptyCategory,
    CategoryTooLong,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldError::EmptyCategory => write!(f, "category must not be empty"),
            FieldError::CategoryTooLong => write!(
                f,
                "category must be at most {} characters",
                MAX_CATEGORY_LEN
            ),
        }
    }
}

impl std::error::Error for FieldError {}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            TransactionKind::Income,
            TransactionKind::Expense,
            TransactionKind::Transfer,
        ] {
            assert_eq!(TransactionKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(TransactionKind::from_str("refund"), None);
    }

    #[test]
    fn test_frequency_advance() {
        let start = at(2024, 1, 31);
        assert_eq!(Frequency::Daily.advance(start), Some(at(2024, 2, 1)));
        assert_eq!(Frequency::Weekly.advance(start), Some(at(2024, 2, 7)));
        // Leap year: clamps to Feb 29
        assert_eq!(Frequency::Monthly.advance(start), Some(at(2024, 2, 29)));
        assert_eq!(Frequency::Yearly.advance(at(2024, 2, 29)), Some(at(2025, 2, 28)));
    }

    #[test]
    fn test_with_frequency_derives_next_occurrence() {
        let tx = Transaction::new(Uuid::new_v4(), TransactionKind::Expense, 5000, "rent", at(2024, 3, 15))
            .with_frequency(Frequency::Monthly);

        let recurrence = tx.recurrence.unwrap();
        assert_eq!(recurrence.frequency, Frequency::Monthly);
        assert_eq!(recurrence.next_occurrence, at(2024, 4, 15));
        assert!(tx.is_recurring());
    }

    #[test]
    fn test_materialize_occurrence() {
        let template = Transaction::new(Uuid::new_v4(), TransactionKind::Income, 100000, "salary", at(2024, 1, 10))
            .with_currency("RUB")
            .with_description("monthly pay")
            .with_frequency(Frequency::Monthly);

        let occurrence = template.materialize_occurrence().unwrap();
        assert_ne!(occurrence.id, template.id);
        assert_eq!(occurrence.parent_id, Some(template.id));
        assert_eq!(occurrence.occurred_at, at(2024, 2, 10));
        assert_eq!(occurrence.amount_cents, 100000);
        assert_eq!(occurrence.description.as_deref(), Some("monthly pay"));
        assert!(!occurrence.is_recurring());
    }

    #[test]
    fn test_validate_category() {
        assert_eq!(validate_category("  groceries "), Ok("groceries".to_string()));
        assert_eq!(validate_category("   "), Err(FieldError::EmptyCategory));
        assert_eq!(
            validate_category(&"x".repeat(MAX_CATEGORY_LEN + 1)),
            Err(FieldError::CategoryTooLong)
        );
    }
}
