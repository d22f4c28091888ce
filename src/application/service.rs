use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{LedgerOptions, StoreConfig};
use crate::domain::{
    Account, AccountId, CategoryTotal, Cents, DeletionPolicy, Frequency, Goal, GoalId,
    GoalProgress, GoalStatus, ProgressType, Transaction, TransactionId, TransactionKind, UserKey,
    validate_amount, validate_category,
};
use crate::storage::{
    AccountWrite, CommitOutcome, LedgerStore, MemoryStore, SqliteStore, TransactionQuery,
};

use super::{AppError, BalanceSnapshot, PeriodStatistics};

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, chat, ...).
///
/// Every write re-reads the state it decides on, computes the next state with
/// the domain rules and hands both to the store as one conditional commit. A
/// lost race re-runs the decision against fresh state.
#[derive(Clone)]
pub struct LedgerService {
    pub(super) store: Arc<dyn LedgerStore>,
    pub(super) options: LedgerOptions,
}

/// Who is talking to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub user_key: UserKey,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

impl UserProfile {
    pub fn new(user_key: UserKey) -> Self {
        Self {
            user_key,
            username: None,
            display_name: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

/// Request to record a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub amount_cents: Cents,
    pub category: String,
    pub description: Option<String>,
    /// Defaults to the time of the commit
    pub occurred_at: Option<DateTime<Utc>>,
    pub recurring: bool,
    pub frequency: Option<Frequency>,
}

impl NewTransaction {
    pub fn new(kind: TransactionKind, amount_cents: Cents, category: impl Into<String>) -> Self {
        Self {
            kind,
            amount_cents,
            category: category.into(),
            description: None,
            occurred_at: None,
            recurring: false,
            frequency: None,
        }
    }

    pub fn income(amount_cents: Cents, category: impl Into<String>) -> Self {
        Self::new(TransactionKind::Income, amount_cents, category)
    }

    pub fn expense(amount_cents: Cents, category: impl Into<String>) -> Self {
        Self::new(TransactionKind::Expense, amount_cents, category)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.recurring = true;
        self.frequency = Some(frequency);
        self
    }
}

/// Result of recording a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_id: TransactionId,
    pub new_balance: Cents,
    pub transaction: Transaction,
    pub account: Account,
}

/// Request to create a savings goal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGoal {
    pub title: String,
    pub target_cents: Cents,
    pub target_date: Option<NaiveDate>,
    pub description: Option<String>,
}

impl NewGoal {
    pub fn new(title: impl Into<String>, target_cents: Cents) -> Self {
        Self {
            title: title.into(),
            target_cents,
            target_date: None,
            description: None,
        }
    }

    pub fn with_target_date(mut self, target_date: NaiveDate) -> Self {
        self.target_date = Some(target_date);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Result of applying goal progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalProgressReceipt {
    pub progress: GoalProgress,
    pub goal: Goal,
    pub progress_percentage: f64,
}

impl LedgerService {
    /// Create a new ledger service on top of the given store.
    pub fn new(store: Arc<dyn LedgerStore>, mut options: LedgerOptions) -> Self {
        options.commit_attempts = options.commit_attempts.max(1);
        Self { store, options }
    }

    /// Service backed by a process-local store.
    pub fn in_memory(options: LedgerOptions) -> Self {
        Self::new(Arc::new(MemoryStore::new()), options)
    }

    /// Open (and migrate) the SQLite database described by `config`.
    pub async fn open(config: &StoreConfig, options: LedgerOptions) -> Result<Self, AppError> {
        let store = SqliteStore::init(config).await?;
        Ok(Self::new(Arc::new(store), options))
    }

    /// Shut the underlying store down once no more requests will come.
    pub async fn close(&self) {
        self.store.close().await;
    }

    pub(super) fn conflict(&self) -> AppError {
        AppError::CommitConflict {
            attempts: self.options.commit_attempts,
        }
    }

    // ========================
    // Account operations
    // ========================

    /// Provision the account on first contact, or refresh its profile.
    pub async fn register_user(&self, profile: UserProfile) -> Result<(Account, bool), AppError> {
        let mut account = Account::new(profile.user_key, self.options.default_currency.clone());
        account.username = profile.username;
        account.display_name = profile.display_name;

        let (account, created) = self.store.upsert_account(&account).await?;
        if created {
            info!(user = account.user_key, account = %account.id, "account provisioned");
        }
        Ok((account, created))
    }

    pub async fn account(&self, user_key: UserKey) -> Result<Account, AppError> {
        self.store
            .get_account_by_user(user_key)
            .await?
            .ok_or(AppError::AccountNotFound(user_key))
    }

    pub async fn balance(&self, user_key: UserKey) -> Result<BalanceSnapshot, AppError> {
        let account = self.account(user_key).await?;
        Ok(BalanceSnapshot::from(&account))
    }

    /// Remove an account together with its transactions, goals and progress.
    pub async fn close_account(&self, user_key: UserKey) -> Result<(), AppError> {
        let account = self.account(user_key).await?;
        if !self.store.delete_account(account.id).await? {
            return Err(AppError::AccountNotFound(user_key));
        }
        info!(user = user_key, account = %account.id, "account closed");
        Ok(())
    }

    async fn reload_account(&self, id: AccountId, user_key: UserKey) -> Result<Account, AppError> {
        self.store
            .get_account(id)
            .await?
            .ok_or(AppError::AccountNotFound(user_key))
    }

    // ========================
    // Transaction operations
    // ========================

    /// Record a transaction and apply it to the account in one commit.
    pub async fn create_transaction(
        &self,
        user_key: UserKey,
        request: NewTransaction,
    ) -> Result<TransactionReceipt, AppError> {
        validate_amount(request.amount_cents)?;
        let category = validate_category(&request.category)?;
        let frequency = match (request.recurring, request.frequency) {
            (true, Some(frequency)) => Some(frequency),
            (true, None) => {
                return Err(AppError::Validation(
                    "recurring transactions require a frequency".to_string(),
                ));
            }
            (false, Some(_)) => {
                return Err(AppError::Validation(
                    "frequency is only allowed on recurring transactions".to_string(),
                ));
            }
            (false, None) => None,
        };

        let mut account = self.account(user_key).await?;

        let mut transaction = Transaction::new(
            account.id,
            request.kind,
            request.amount_cents,
            category,
            request.occurred_at.unwrap_or_else(Utc::now),
        )
        .with_currency(account.currency.clone());
        transaction.description = normalize_text(request.description);
        if let Some(frequency) = frequency {
            transaction = transaction.with_frequency(frequency);
            if transaction.recurrence.is_none() {
                return Err(AppError::Validation(
                    "next occurrence is out of range".to_string(),
                ));
            }
        }

        for attempt in 1..=self.options.commit_attempts {
            let next = account.apply_transaction(transaction.kind, transaction.amount_cents)?;
            let write = AccountWrite {
                expected_version: account.version,
                account: &next,
            };

            match self.store.commit_transaction(write, &mut transaction, None).await? {
                CommitOutcome::Committed => {
                    info!(
                        user = user_key,
                        transaction = %transaction.id,
                        kind = %transaction.kind,
                        amount = transaction.amount_cents,
                        balance = next.balance,
                        "transaction recorded"
                    );
                    return Ok(TransactionReceipt {
                        transaction_id: transaction.id,
                        new_balance: next.balance,
                        transaction,
                        account: next,
                    });
                }
                CommitOutcome::Conflict => {
                    debug!(user = user_key, attempt, "account changed concurrently, retrying");
                    account = self.reload_account(account.id, user_key).await?;
                }
            }
        }

        warn!(user = user_key, "giving up on transaction after repeated conflicts");
        Err(self.conflict())
    }

    pub async fn record_income(
        &self,
        user_key: UserKey,
        amount_cents: Cents,
        category: &str,
        description: Option<String>,
    ) -> Result<TransactionReceipt, AppError> {
        let mut request = NewTransaction::income(amount_cents, category);
        request.description = description;
        self.create_transaction(user_key, request).await
    }

    pub async fn record_expense(
        &self,
        user_key: UserKey,
        amount_cents: Cents,
        category: &str,
        description: Option<String>,
    ) -> Result<TransactionReceipt, AppError> {
        let mut request = NewTransaction::expense(amount_cents, category);
        request.description = description;
        self.create_transaction(user_key, request).await
    }

    /// Look up a transaction owned by the user (deleted ones included).
    pub async fn transaction(
        &self,
        user_key: UserKey,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        let account = self.account(user_key).await?;
        self.owned_transaction(&account, id).await
    }

    async fn owned_transaction(
        &self,
        account: &Account,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        self.store
            .get_transaction(id)
            .await?
            .filter(|t| t.account_id == account.id)
            .ok_or_else(|| AppError::TransactionNotFound(id.to_string()))
    }

    /// Most recent first, at most `limit`.
    pub async fn recent_transactions(
        &self,
        user_key: UserKey,
        limit: usize,
        include_deleted: bool,
    ) -> Result<Vec<Transaction>, AppError> {
        let account = self.account(user_key).await?;
        Ok(self
            .store
            .list_recent(account.id, limit, include_deleted)
            .await?)
    }

    /// Every transaction the user ever recorded, deleted ones included.
    pub async fn all_transactions(&self, user_key: UserKey) -> Result<Vec<Transaction>, AppError> {
        self.recent_transactions(user_key, usize::MAX, true).await
    }

    pub async fn transactions_in_range(
        &self,
        user_key: UserKey,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, AppError> {
        check_range(query.start, query.end)?;
        let account = self.account(user_key).await?;
        Ok(self.store.list_in_range(account.id, query).await?)
    }

    pub async fn category_breakdown(
        &self,
        user_key: UserKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CategoryTotal>, AppError> {
        check_range(start, end)?;
        let account = self.account(user_key).await?;
        Ok(self
            .store
            .aggregate_by_category(account.id, start, end)
            .await?)
    }

    /// Income/expense totals for the window plus the `top` expense categories.
    pub async fn period_statistics(
        &self,
        user_key: UserKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        top: usize,
    ) -> Result<PeriodStatistics, AppError> {
        check_range(start, end)?;
        let account = self.account(user_key).await?;
        let totals = self
            .store
            .aggregate_by_category(account.id, start, end)
            .await?;
        Ok(PeriodStatistics::from_category_totals(
            start,
            end,
            account.currency,
            &totals,
            top,
        ))
    }

    /// Soft-delete a transaction. Deleting an already deleted one is a no-op.
    pub async fn delete_transaction(
        &self,
        user_key: UserKey,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        self.set_deleted(user_key, id, true).await
    }

    /// Undo a soft delete. Restoring a live transaction is a no-op.
    pub async fn restore_transaction(
        &self,
        user_key: UserKey,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        self.set_deleted(user_key, id, false).await
    }

    async fn set_deleted(
        &self,
        user_key: UserKey,
        id: TransactionId,
        delete: bool,
    ) -> Result<Transaction, AppError> {
        let mut account = self.account(user_key).await?;

        for attempt in 1..=self.options.commit_attempts {
            let mut transaction = self.owned_transaction(&account, id).await?;
            if transaction.is_deleted() == delete {
                return Ok(transaction);
            }

            let next = match self.options.deletion_policy {
                DeletionPolicy::Retain => None,
                DeletionPolicy::Reverse if delete => {
                    Some(account.revert_transaction(transaction.kind, transaction.amount_cents)?)
                }
                DeletionPolicy::Reverse => {
                    Some(account.apply_transaction(transaction.kind, transaction.amount_cents)?)
                }
            };
            let write = next.as_ref().map(|next| AccountWrite {
                expected_version: account.version,
                account: next,
            });
            let deleted_at = delete.then(Utc::now);

            match self.store.commit_deletion(id, deleted_at, write).await? {
                CommitOutcome::Committed => {
                    info!(
                        user = user_key,
                        transaction = %id,
                        deleted = delete,
                        policy = %self.options.deletion_policy,
                        "deletion flag updated"
                    );
                    transaction.deleted_at = deleted_at;
                    return Ok(transaction);
                }
                CommitOutcome::Conflict => {
                    debug!(user = user_key, attempt, "transaction changed concurrently, retrying");
                    account = self.reload_account(account.id, user_key).await?;
                }
            }
        }

        Err(self.conflict())
    }

    // ========================
    // Goal operations
    // ========================

    pub async fn create_goal(&self, user_key: UserKey, request: NewGoal) -> Result<Goal, AppError> {
        validate_amount(request.target_cents)?;
        let title = request.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("goal title must not be empty".to_string()));
        }

        let account = self.account(user_key).await?;
        let mut goal = Goal::new(account.id, title, request.target_cents, account.currency);
        goal.description = normalize_text(request.description);
        goal.target_date = request.target_date;

        self.store.insert_goal(&goal).await?;
        info!(user = user_key, goal = %goal.id, target = goal.target_cents, "goal created");
        Ok(goal)
    }

    pub async fn goal(&self, user_key: UserKey, goal_id: GoalId) -> Result<Goal, AppError> {
        let account = self.account(user_key).await?;
        self.owned_goal(&account, goal_id).await
    }

    async fn owned_goal(&self, account: &Account, goal_id: GoalId) -> Result<Goal, AppError> {
        self.store
            .get_goal(goal_id)
            .await?
            .filter(|g| g.account_id == account.id)
            .ok_or_else(|| AppError::GoalNotFound(goal_id.to_string()))
    }

    /// Goals in one of `statuses` (every goal when empty), soonest target date first.
    pub async fn goals(
        &self,
        user_key: UserKey,
        statuses: &[GoalStatus],
    ) -> Result<Vec<Goal>, AppError> {
        let account = self.account(user_key).await?;
        Ok(self.store.list_goals(account.id, statuses).await?)
    }

    pub async fn active_goals(&self, user_key: UserKey) -> Result<Vec<Goal>, AppError> {
        self.goals(user_key, &[GoalStatus::Active]).await
    }

    pub async fn goal_history(
        &self,
        user_key: UserKey,
        goal_id: GoalId,
    ) -> Result<Vec<GoalProgress>, AppError> {
        let goal = self.goal(user_key, goal_id).await?;
        Ok(self.store.list_goal_progress(goal.id).await?)
    }

    /// Apply a progress entry and re-evaluate completion in one commit.
    pub async fn add_goal_progress(
        &self,
        user_key: UserKey,
        goal_id: GoalId,
        progress_type: ProgressType,
        amount_cents: Cents,
        description: Option<String>,
    ) -> Result<GoalProgressReceipt, AppError> {
        validate_amount(amount_cents)?;
        let description = normalize_text(description);
        let account = self.account(user_key).await?;
        let mut goal = self.owned_goal(&account, goal_id).await?;

        for attempt in 1..=self.options.commit_attempts {
            if goal.status == GoalStatus::Cancelled {
                return Err(AppError::Validation(format!(
                    "goal '{}' is cancelled",
                    goal.title
                )));
            }

            let (next, progress) =
                goal.apply_progress(progress_type, amount_cents, description.clone(), Utc::now());

            match self
                .store
                .commit_goal_progress(goal.version, &next, &progress)
                .await?
            {
                CommitOutcome::Committed => {
                    if next.is_completed() && !goal.is_completed() {
                        info!(user = user_key, goal = %goal_id, "goal completed");
                    }
                    debug!(
                        goal = %goal_id,
                        kind = %progress_type,
                        applied = progress.applied_cents,
                        current = next.current_cents,
                        "goal progress recorded"
                    );
                    return Ok(GoalProgressReceipt {
                        progress_percentage: next.progress_percentage(),
                        progress,
                        goal: next,
                    });
                }
                CommitOutcome::Conflict => {
                    debug!(goal = %goal_id, attempt, "goal changed concurrently, retrying");
                    goal = self.owned_goal(&account, goal_id).await?;
                }
            }
        }

        Err(self.conflict())
    }

    pub async fn contribute_to_goal(
        &self,
        user_key: UserKey,
        goal_id: GoalId,
        amount_cents: Cents,
        description: Option<String>,
    ) -> Result<GoalProgressReceipt, AppError> {
        self.add_goal_progress(
            user_key,
            goal_id,
            ProgressType::Contribution,
            amount_cents,
            description,
        )
        .await
    }

    pub async fn withdraw_from_goal(
        &self,
        user_key: UserKey,
        goal_id: GoalId,
        amount_cents: Cents,
        description: Option<String>,
    ) -> Result<GoalProgressReceipt, AppError> {
        self.add_goal_progress(
            user_key,
            goal_id,
            ProgressType::Withdrawal,
            amount_cents,
            description,
        )
        .await
    }

    /// Pause, resume or cancel a goal.
    pub async fn set_goal_status(
        &self,
        user_key: UserKey,
        goal_id: GoalId,
        status: GoalStatus,
    ) -> Result<Goal, AppError> {
        let account = self.account(user_key).await?;
        let mut goal = self.owned_goal(&account, goal_id).await?;

        for attempt in 1..=self.options.commit_attempts {
            let next = goal.transition_to(status, Utc::now())?;
            if next.version == goal.version {
                return Ok(next);
            }

            match self.store.update_goal(goal.version, &next).await? {
                CommitOutcome::Committed => {
                    info!(user = user_key, goal = %goal_id, status = %status, "goal status changed");
                    return Ok(next);
                }
                CommitOutcome::Conflict => {
                    debug!(goal = %goal_id, attempt, "goal changed concurrently, retrying");
                    goal = self.owned_goal(&account, goal_id).await?;
                }
            }
        }

        Err(self.conflict())
    }
}

fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), AppError> {
    if start > end {
        return Err(AppError::Validation(
            "range start must not be after its end".to_string(),
        ));
    }
    Ok(())
}

fn normalize_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
