use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Account, AccountId, CategoryTotal, Goal, GoalId, GoalProgress, GoalStatus, Transaction,
    TransactionId, TransactionKind, UserKey,
};

mod memory;
mod repository;

pub use memory::*;
pub use repository::*;

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Another writer changed the guarded row first; nothing was written
    Conflict,
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed)
    }
}

/// Replace an account row, provided it is still at `expected_version`.
#[derive(Debug, Clone, Copy)]
pub struct AccountWrite<'a> {
    pub expected_version: i64,
    pub account: &'a Account,
}

/// Move a recurring template forward, provided nobody else already did.
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceAdvance {
    pub template_id: TransactionId,
    pub expected_next: DateTime<Utc>,
    pub next_occurrence: DateTime<Utc>,
}

/// Filters for range queries. Both bounds are inclusive.
#[derive(Debug, Clone)]
pub struct TransactionQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: Option<TransactionKind>,
    pub category: Option<String>,
}

impl TransactionQuery {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            kind: None,
            category: None,
        }
    }

    pub fn with_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        !transaction.is_deleted()
            && transaction.occurred_at >= self.start
            && transaction.occurred_at <= self.end
            && self.kind.is_none_or(|kind| transaction.kind == kind)
            && self
                .category
                .as_deref()
                .is_none_or(|category| transaction.category == category)
    }
}

/// Durable store behind the ledger.
///
/// Implementations hold no business rules: they persist what they are given
/// and guard every ledger write with a version check so concurrent writers
/// can never interleave a read-modify-write on the same account or goal.
/// Each `commit_*` method is a single atomic unit.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // Accounts

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    async fn get_account_by_user(&self, user_key: UserKey) -> Result<Option<Account>>;

    /// Insert the account if its user key is unknown, otherwise refresh the
    /// profile fields and activity timestamp. Returns the stored row and
    /// whether it was created.
    async fn upsert_account(&self, account: &Account) -> Result<(Account, bool)>;

    /// Remove an account together with everything it owns.
    async fn delete_account(&self, id: AccountId) -> Result<bool>;

    // Transactions

    /// Append a transaction and replace the owning account in one unit.
    /// Assigns `transaction.sequence` on success.
    async fn commit_transaction(
        &self,
        write: AccountWrite<'_>,
        transaction: &mut Transaction,
        advance: Option<RecurrenceAdvance>,
    ) -> Result<CommitOutcome>;

    /// Flip the soft-delete flag, guarded on its current state, optionally
    /// replacing the owning account in the same unit.
    async fn commit_deletion(
        &self,
        transaction_id: TransactionId,
        deleted_at: Option<DateTime<Utc>>,
        write: Option<AccountWrite<'_>>,
    ) -> Result<CommitOutcome>;

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;

    /// Most recent first by (occurred_at, sequence).
    async fn list_recent(
        &self,
        account_id: AccountId,
        limit: usize,
        include_deleted: bool,
    ) -> Result<Vec<Transaction>>;

    /// Live transactions inside the query window, most recent first.
    async fn list_in_range(
        &self,
        account_id: AccountId,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>>;

    /// Live transactions grouped by (category, kind), largest total first.
    async fn aggregate_by_category(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CategoryTotal>>;

    /// Live recurring templates whose next occurrence is at or before `as_of`.
    async fn list_due_recurring(&self, as_of: DateTime<Utc>) -> Result<Vec<Transaction>>;

    // Goals

    async fn insert_goal(&self, goal: &Goal) -> Result<()>;

    async fn get_goal(&self, id: GoalId) -> Result<Option<Goal>>;

    /// Goals with one of `statuses` (all goals when empty), by target date with undated goals last.
    async fn list_goals(&self, account_id: AccountId, statuses: &[GoalStatus]) -> Result<Vec<Goal>>;

    /// Append a progress entry and replace the goal in one unit.
    async fn commit_goal_progress(
        &self,
        expected_version: i64,
        goal: &Goal,
        progress: &GoalProgress,
    ) -> Result<CommitOutcome>;

    async fn update_goal(&self, expected_version: i64, goal: &Goal) -> Result<CommitOutcome>;

    /// Progress entries in creation order.
    async fn list_goal_progress(&self, goal_id: GoalId) -> Result<Vec<GoalProgress>>;

    /// Release held resources. Further calls may fail.
    async fn close(&self) {}
}
