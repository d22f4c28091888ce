use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{
    Account, AccountId, CategoryTotal, Goal, GoalId, GoalProgress, GoalStatus, Transaction,
    TransactionId, UserKey, aggregate_by_category,
};

use super::{AccountWrite, CommitOutcome, LedgerStore, RecurrenceAdvance, TransactionQuery};

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    users: HashMap<UserKey, AccountId>,
    transactions: Vec<Transaction>,
    goals: HashMap<GoalId, Goal>,
    progress: Vec<GoalProgress>,
    sequence: i64,
}

impl MemoryState {
    /// Version check shared by every ledger write.
    fn account_matches(&self, write: &AccountWrite<'_>) -> bool {
        self.accounts
            .get(&write.account.id)
            .is_some_and(|stored| stored.version == write.expected_version)
    }

    fn store_account(&mut self, account: &Account) {
        if let Some(stored) = self.accounts.get_mut(&account.id) {
            stored.balance = account.balance;
            stored.total_income = account.total_income;
            stored.total_expenses = account.total_expenses;
            stored.transaction_count = account.transaction_count;
            stored.version = account.version;
            stored.last_activity_at = account.last_activity_at;
        }
    }
}

/// In-process store with the same atomicity as [`super::SqliteStore`]:
/// every commit checks and writes under one lock acquisition.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_recent(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| {
        b.occurred_at
            .cmp(&a.occurred_at)
            .then_with(|| b.sequence.cmp(&a.sequence))
    });
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(&id).cloned())
    }

    async fn get_account_by_user(&self, user_key: UserKey) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(&user_key)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn upsert_account(&self, account: &Account) -> Result<(Account, bool)> {
        let mut state = self.state.write().await;

        if let Some(id) = state.users.get(&account.user_key).copied() {
            if let Some(stored) = state.accounts.get_mut(&id) {
                if account.username.is_some() {
                    stored.username = account.username.clone();
                }
                if account.display_name.is_some() {
                    stored.display_name = account.display_name.clone();
                }
                stored.last_activity_at = account.last_activity_at;
                return Ok((stored.clone(), false));
            }
        }

        let fresh = Account {
            balance: 0,
            total_income: 0,
            total_expenses: 0,
            transaction_count: 0,
            version: 0,
            ..account.clone()
        };
        state.users.insert(fresh.user_key, fresh.id);
        state.accounts.insert(fresh.id, fresh.clone());
        Ok((fresh, true))
    }

    async fn delete_account(&self, id: AccountId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(account) = state.accounts.remove(&id) else {
            return Ok(false);
        };
        state.users.remove(&account.user_key);
        state.transactions.retain(|t| t.account_id != id);

        let goal_ids: Vec<GoalId> = state
            .goals
            .values()
            .filter(|g| g.account_id == id)
            .map(|g| g.id)
            .collect();
        state.goals.retain(|_, g| g.account_id != id);
        state.progress.retain(|p| !goal_ids.contains(&p.goal_id));
        Ok(true)
    }

    async fn commit_transaction(
        &self,
        write: AccountWrite<'_>,
        transaction: &mut Transaction,
        advance: Option<RecurrenceAdvance>,
    ) -> Result<CommitOutcome> {
        let mut state = self.state.write().await;

        if !state.account_matches(&write) {
            return Ok(CommitOutcome::Conflict);
        }

        if let Some(advance) = advance {
            let template = state.transactions.iter_mut().find(|t| {
                t.id == advance.template_id
                    && !t.is_deleted()
                    && t.recurrence
                        .is_some_and(|r| r.next_occurrence == advance.expected_next)
            });
            match template.and_then(|t| t.recurrence.as_mut()) {
                Some(recurrence) => recurrence.next_occurrence = advance.next_occurrence,
                None => return Ok(CommitOutcome::Conflict),
            }
        }

        state.store_account(write.account);
        state.sequence += 1;
        transaction.sequence = state.sequence;
        state.transactions.push(transaction.clone());
        Ok(CommitOutcome::Committed)
    }

    async fn commit_deletion(
        &self,
        transaction_id: TransactionId,
        deleted_at: Option<DateTime<Utc>>,
        write: Option<AccountWrite<'_>>,
    ) -> Result<CommitOutcome> {
        let mut state = self.state.write().await;

        if let Some(write) = &write {
            if !state.account_matches(write) {
                return Ok(CommitOutcome::Conflict);
            }
        }

        let Some(transaction) = state
            .transactions
            .iter_mut()
            .find(|t| t.id == transaction_id)
        else {
            return Ok(CommitOutcome::Conflict);
        };
        // Deleting requires a live row, restoring a deleted one
        if transaction.is_deleted() == deleted_at.is_some() {
            return Ok(CommitOutcome::Conflict);
        }
        transaction.deleted_at = deleted_at;

        if let Some(write) = write {
            state.store_account(write.account);
        }
        Ok(CommitOutcome::Committed)
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn list_recent(
        &self,
        account_id: AccountId,
        limit: usize,
        include_deleted: bool,
    ) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut transactions: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id && (include_deleted || !t.is_deleted()))
            .cloned()
            .collect();
        sort_recent(&mut transactions);
        transactions.truncate(limit);
        Ok(transactions)
    }

    async fn list_in_range(
        &self,
        account_id: AccountId,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut transactions: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id && query.matches(t))
            .cloned()
            .collect();
        sort_recent(&mut transactions);
        Ok(transactions)
    }

    async fn aggregate_by_category(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CategoryTotal>> {
        let transactions = self
            .list_in_range(account_id, &TransactionQuery::between(start, end))
            .await?;
        Ok(aggregate_by_category(&transactions)?)
    }

    async fn list_due_recurring(&self, as_of: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut due: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| {
                !t.is_deleted() && t.recurrence.is_some_and(|r| r.next_occurrence <= as_of)
            })
            .cloned()
            .collect();
        due.sort_by_key(|t| (t.recurrence.map(|r| r.next_occurrence), t.sequence));
        Ok(due)
    }

    async fn insert_goal(&self, goal: &Goal) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.accounts.contains_key(&goal.account_id) {
            anyhow::bail!("Account not found: {}", goal.account_id);
        }
        state.goals.insert(goal.id, goal.clone());
        Ok(())
    }

    async fn get_goal(&self, id: GoalId) -> Result<Option<Goal>> {
        let state = self.state.read().await;
        Ok(state.goals.get(&id).cloned())
    }

    async fn list_goals(&self, account_id: AccountId, statuses: &[GoalStatus]) -> Result<Vec<Goal>> {
        let state = self.state.read().await;
        let mut goals: Vec<Goal> = state
            .goals
            .values()
            .filter(|g| {
                g.account_id == account_id && (statuses.is_empty() || statuses.contains(&g.status))
            })
            .cloned()
            .collect();
        goals.sort_by_key(|g| (g.target_date.is_none(), g.target_date, g.created_at));
        Ok(goals)
    }

    async fn commit_goal_progress(
        &self,
        expected_version: i64,
        goal: &Goal,
        progress: &GoalProgress,
    ) -> Result<CommitOutcome> {
        let mut state = self.state.write().await;
        match state.goals.get_mut(&goal.id) {
            Some(stored) if stored.version == expected_version => *stored = goal.clone(),
            _ => return Ok(CommitOutcome::Conflict),
        }
        state.progress.push(progress.clone());
        Ok(CommitOutcome::Committed)
    }

    async fn update_goal(&self, expected_version: i64, goal: &Goal) -> Result<CommitOutcome> {
        let mut state = self.state.write().await;
        match state.goals.get_mut(&goal.id) {
            Some(stored) if stored.version == expected_version => {
                *stored = goal.clone();
                Ok(CommitOutcome::Committed)
            }
            _ => Ok(CommitOutcome::Conflict),
        }
    }

    async fn list_goal_progress(&self, goal_id: GoalId) -> Result<Vec<GoalProgress>> {
        let state = self.state.read().await;
        Ok(state
            .progress
            .iter()
            .filter(|p| p.goal_id == goal_id)
            .cloned()
            .collect())
    }
}
