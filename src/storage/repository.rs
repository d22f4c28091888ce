use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::domain::{
    Account, AccountId, CategoryTotal, Frequency, Goal, GoalId, GoalProgress, GoalStatus,
    ProgressType, Recurrence, Transaction, TransactionId, TransactionKind, UserKey,
    sort_category_totals,
};

use super::{
    AccountWrite, CommitOutcome, LedgerStore, MIGRATION_001_INITIAL, RecurrenceAdvance,
    TransactionQuery,
};

const ACCOUNT_COLUMNS: &str = "id, user_key, username, display_name, currency, balance_cents, \
     total_income_cents, total_expense_cents, transaction_count, version, created_at, last_activity_at";

const TRANSACTION_COLUMNS: &str = "id, sequence, account_id, kind, amount_cents, currency, category, \
     description, occurred_at, recorded_at, recurring_frequency, next_occurrence, parent_id, deleted_at";

const GOAL_COLUMNS: &str = "id, account_id, title, description, target_cents, current_cents, currency, \
     status, target_date, completed_at, version, created_at, updated_at";

const PROGRESS_COLUMNS: &str =
    "id, goal_id, progress_type, amount_cents, applied_cents, description, created_at";

/// SQLite-backed ledger store.
///
/// Every ledger write runs inside one SQLite transaction whose first statement
/// is the version-guarded account (or goal) update, so a lost race writes
/// nothing at all.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database described by `config`, creating the file if needed.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .with_context(|| format!("Invalid database URL: {}", config.database_url))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!(url = %config.database_url, "connected to ledger database");
        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run on every start.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(config: &StoreConfig) -> Result<Self> {
        let store = Self::connect(config).await?;
        store.migrate().await?;
        info!(url = %config.database_url, "ledger database ready");
        Ok(store)
    }

    async fn fetch_transactions(&self, sql: &str, account_id: AccountId) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(sql)
            .bind(account_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        rows.iter().map(row_to_transaction).collect()
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    // ========================
    // Account operations
    // ========================

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch account")?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn get_account_by_user(&self, user_key: UserKey) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_key = ?");
        let row = sqlx::query(&sql)
            .bind(user_key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch account by user")?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn upsert_account(&self, account: &Account) -> Result<(Account, bool)> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, user_key, username, display_name, currency, balance_cents,
                                  total_income_cents, total_expense_cents, transaction_count, version,
                                  created_at, last_activity_at)
            VALUES (?, ?, ?, ?, ?, 0, 0, 0, 0, 0, ?, ?)
            ON CONFLICT(user_key) DO UPDATE SET
                username = COALESCE(excluded.username, accounts.username),
                display_name = COALESCE(excluded.display_name, accounts.display_name),
                last_activity_at = excluded.last_activity_at
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.user_key)
        .bind(&account.username)
        .bind(&account.display_name)
        .bind(&account.currency)
        .bind(encode_ts(account.created_at))
        .bind(encode_ts(account.last_activity_at))
        .execute(&self.pool)
        .await
        .context("Failed to upsert account")?;

        let stored = self
            .get_account_by_user(account.user_key)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Account vanished after upsert: {}", account.user_key))?;
        let created = stored.id == account.id;
        Ok((stored, created))
    }

    async fn delete_account(&self, id: AccountId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete account")?;
        Ok(result.rows_affected() > 0)
    }

    // ========================
    // Transaction operations
    // ========================

    async fn commit_transaction(
        &self,
        write: AccountWrite<'_>,
        transaction: &mut Transaction,
        advance: Option<RecurrenceAdvance>,
    ) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        if !update_account_guarded(&mut tx, write).await? {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(CommitOutcome::Conflict);
        }

        if let Some(advance) = advance {
            let result = sqlx::query(
                r#"
                UPDATE transactions
                SET next_occurrence = ?
                WHERE id = ? AND next_occurrence = ? AND deleted_at IS NULL
                "#,
            )
            .bind(encode_ts(advance.next_occurrence))
            .bind(advance.template_id.to_string())
            .bind(encode_ts(advance.expected_next))
            .execute(&mut *tx)
            .await
            .context("Failed to advance recurring template")?;

            if result.rows_affected() == 0 {
                tx.rollback().await.context("Failed to roll back")?;
                return Ok(CommitOutcome::Conflict);
            }
        }

        // Get and increment sequence number inside the same unit
        let sequence: i64 = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .context("Failed to get next sequence number")?
        .get("value");

        sqlx::query(
            r#"
            INSERT INTO transactions (id, sequence, account_id, kind, amount_cents, currency, category,
                                      description, occurred_at, recorded_at, recurring_frequency,
                                      next_occurrence, parent_id, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(sequence)
        .bind(transaction.account_id.to_string())
        .bind(transaction.kind.as_str())
        .bind(transaction.amount_cents)
        .bind(&transaction.currency)
        .bind(&transaction.category)
        .bind(&transaction.description)
        .bind(encode_ts(transaction.occurred_at))
        .bind(encode_ts(transaction.recorded_at))
        .bind(transaction.recurrence.map(|r| r.frequency.as_str()))
        .bind(transaction.recurrence.map(|r| encode_ts(r.next_occurrence)))
        .bind(transaction.parent_id.map(|id| id.to_string()))
        .bind(transaction.deleted_at.map(encode_ts))
        .execute(&mut *tx)
        .await
        .context("Failed to save transaction")?;

        tx.commit().await.context("Failed to commit transaction")?;
        transaction.sequence = sequence;
        Ok(CommitOutcome::Committed)
    }

    async fn commit_deletion(
        &self,
        transaction_id: TransactionId,
        deleted_at: Option<DateTime<Utc>>,
        write: Option<AccountWrite<'_>>,
    ) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        if let Some(write) = write {
            if !update_account_guarded(&mut tx, write).await? {
                tx.rollback().await.context("Failed to roll back")?;
                return Ok(CommitOutcome::Conflict);
            }
        }

        // Deleting requires a live row, restoring a deleted one
        let sql = if deleted_at.is_some() {
            "UPDATE transactions SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL"
        } else {
            "UPDATE transactions SET deleted_at = ? WHERE id = ? AND deleted_at IS NOT NULL"
        };
        let result = sqlx::query(sql)
            .bind(deleted_at.map(encode_ts))
            .bind(transaction_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to update deletion flag")?;

        if result.rows_affected() == 0 {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(CommitOutcome::Conflict);
        }

        tx.commit().await.context("Failed to commit deletion")?;
        Ok(CommitOutcome::Committed)
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch transaction")?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn list_recent(
        &self,
        account_id: AccountId,
        limit: usize,
        include_deleted: bool,
    ) -> Result<Vec<Transaction>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let deleted_filter = if include_deleted {
            ""
        } else {
            " AND deleted_at IS NULL"
        };
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = ?{deleted_filter} \
             ORDER BY occurred_at DESC, sequence DESC LIMIT {limit}"
        );
        self.fetch_transactions(&sql, account_id).await
    }

    async fn list_in_range(
        &self,
        account_id: AccountId,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>> {
        let mut sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE account_id = ? AND deleted_at IS NULL AND occurred_at >= ? AND occurred_at <= ?"
        );
        if query.kind.is_some() {
            sql.push_str(" AND kind = ?");
        }
        if query.category.is_some() {
            sql.push_str(" AND category = ?");
        }
        sql.push_str(" ORDER BY occurred_at DESC, sequence DESC");

        let mut sql_query = sqlx::query(&sql)
            .bind(account_id.to_string())
            .bind(encode_ts(query.start))
            .bind(encode_ts(query.end));
        if let Some(kind) = query.kind {
            sql_query = sql_query.bind(kind.as_str());
        }
        if let Some(category) = &query.category {
            sql_query = sql_query.bind(category.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions in range")?;

        rows.iter().map(row_to_transaction).collect()
    }

    async fn aggregate_by_category(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CategoryTotal>> {
        let rows = sqlx::query(
            r#"
            SELECT category, kind, SUM(amount_cents) AS total, COUNT(*) AS count
            FROM transactions
            WHERE account_id = ? AND deleted_at IS NULL AND occurred_at >= ? AND occurred_at <= ?
            GROUP BY category, kind
            "#,
        )
        .bind(account_id.to_string())
        .bind(encode_ts(start))
        .bind(encode_ts(end))
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate by category")?;

        let mut totals = rows
            .iter()
            .map(|row| {
                let kind_str: String = row.get("kind");
                Ok(CategoryTotal {
                    category: row.get("category"),
                    kind: TransactionKind::from_str(&kind_str)
                        .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind_str))?,
                    total: row.get("total"),
                    count: row.get("count"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        sort_category_totals(&mut totals);
        Ok(totals)
    }

    async fn list_due_recurring(&self, as_of: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE next_occurrence IS NOT NULL AND next_occurrence <= ? AND deleted_at IS NULL \
             ORDER BY next_occurrence, sequence"
        );
        let rows = sqlx::query(&sql)
            .bind(encode_ts(as_of))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list due recurring transactions")?;

        rows.iter().map(row_to_transaction).collect()
    }

    // ========================
    // Goal operations
    // ========================

    async fn insert_goal(&self, goal: &Goal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO goals (id, account_id, title, description, target_cents, current_cents, currency,
                               status, target_date, completed_at, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(goal.id.to_string())
        .bind(goal.account_id.to_string())
        .bind(&goal.title)
        .bind(&goal.description)
        .bind(goal.target_cents)
        .bind(goal.current_cents)
        .bind(&goal.currency)
        .bind(goal.status.as_str())
        .bind(goal.target_date.map(|d| d.to_string()))
        .bind(goal.completed_at.map(encode_ts))
        .bind(goal.version)
        .bind(encode_ts(goal.created_at))
        .bind(encode_ts(goal.updated_at))
        .execute(&self.pool)
        .await
        .context("Failed to save goal")?;
        Ok(())
    }

    async fn get_goal(&self, id: GoalId) -> Result<Option<Goal>> {
        let sql = format!("SELECT {GOAL_COLUMNS} FROM goals WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch goal")?;

        row.as_ref().map(row_to_goal).transpose()
    }

    async fn list_goals(&self, account_id: AccountId, statuses: &[GoalStatus]) -> Result<Vec<Goal>> {
        let mut sql = format!("SELECT {GOAL_COLUMNS} FROM goals WHERE account_id = ?");
        if !statuses.is_empty() {
            let placeholders = vec!["?"; statuses.len()].join(", ");
            sql.push_str(&format!(" AND status IN ({placeholders})"));
        }
        sql.push_str(" ORDER BY target_date IS NULL, target_date, created_at");

        let mut sql_query = sqlx::query(&sql).bind(account_id.to_string());
        for status in statuses {
            sql_query = sql_query.bind(status.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list goals")?;

        rows.iter().map(row_to_goal).collect()
    }

    async fn commit_goal_progress(
        &self,
        expected_version: i64,
        goal: &Goal,
        progress: &GoalProgress,
    ) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let result = sqlx::query(
            r#"
            UPDATE goals
            SET current_cents = ?, status = ?, completed_at = ?, version = ?, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(goal.current_cents)
        .bind(goal.status.as_str())
        .bind(goal.completed_at.map(encode_ts))
        .bind(goal.version)
        .bind(encode_ts(goal.updated_at))
        .bind(goal.id.to_string())
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .context("Failed to update goal")?;

        if result.rows_affected() == 0 {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(CommitOutcome::Conflict);
        }

        sqlx::query(
            r#"
            INSERT INTO goal_progress (id, goal_id, progress_type, amount_cents, applied_cents, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(progress.id.to_string())
        .bind(progress.goal_id.to_string())
        .bind(progress.progress_type.as_str())
        .bind(progress.amount_cents)
        .bind(progress.applied_cents)
        .bind(&progress.description)
        .bind(encode_ts(progress.created_at))
        .execute(&mut *tx)
        .await
        .context("Failed to save goal progress")?;

        tx.commit().await.context("Failed to commit goal progress")?;
        Ok(CommitOutcome::Committed)
    }

    async fn update_goal(&self, expected_version: i64, goal: &Goal) -> Result<CommitOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE goals
            SET title = ?, description = ?, status = ?, target_date = ?, completed_at = ?,
                version = ?, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&goal.title)
        .bind(&goal.description)
        .bind(goal.status.as_str())
        .bind(goal.target_date.map(|d| d.to_string()))
        .bind(goal.completed_at.map(encode_ts))
        .bind(goal.version)
        .bind(encode_ts(goal.updated_at))
        .bind(goal.id.to_string())
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .context("Failed to update goal")?;

        Ok(if result.rows_affected() == 0 {
            CommitOutcome::Conflict
        } else {
            CommitOutcome::Committed
        })
    }

    async fn list_goal_progress(&self, goal_id: GoalId) -> Result<Vec<GoalProgress>> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM goal_progress WHERE goal_id = ? ORDER BY created_at, rowid"
        );
        let rows = sqlx::query(&sql)
            .bind(goal_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list goal progress")?;

        rows.iter().map(row_to_progress).collect()
    }

    /// Wait for checked-out connections to return and close the pool.
    async fn close(&self) {
        self.pool.close().await;
        debug!("ledger database closed");
    }
}

/// Version-guarded replacement of the ledger columns. Returns false when the
/// row moved on since it was read.
async fn update_account_guarded(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    write: AccountWrite<'_>,
) -> Result<bool> {
    let account = write.account;
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET balance_cents = ?, total_income_cents = ?, total_expense_cents = ?,
            transaction_count = ?, version = ?, last_activity_at = ?
        WHERE id = ? AND version = ?
        "#,
    )
    .bind(account.balance)
    .bind(account.total_income)
    .bind(account.total_expenses)
    .bind(account.transaction_count)
    .bind(account.version)
    .bind(encode_ts(account.last_activity_at))
    .bind(account.id.to_string())
    .bind(write.expected_version)
    .execute(&mut **tx)
    .await
    .context("Failed to update account")?;

    Ok(result.rows_affected() == 1)
}

/// Fixed-width UTC timestamps keep lexical order equal to chronological order.
fn encode_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp: {}", s))?
        .with_timezone(&Utc))
}

fn decode_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(decode_ts).transpose()
}

fn decode_id(s: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid {} ID: {}", what, s))
}

fn row_to_account(row: &SqliteRow) -> Result<Account> {
    let id_str: String = row.get("id");
    let created_at_str: String = row.get("created_at");
    let last_activity_str: String = row.get("last_activity_at");

    Ok(Account {
        id: decode_id(&id_str, "account")?,
        user_key: row.get("user_key"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        currency: row.get("currency"),
        balance: row.get("balance_cents"),
        total_income: row.get("total_income_cents"),
        total_expenses: row.get("total_expense_cents"),
        transaction_count: row.get("transaction_count"),
        version: row.get("version"),
        created_at: decode_ts(&created_at_str)?,
        last_activity_at: decode_ts(&last_activity_str)?,
    })
}

fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
    let id_str: String = row.get("id");
    let account_id_str: String = row.get("account_id");
    let kind_str: String = row.get("kind");
    let occurred_at_str: String = row.get("occurred_at");
    let recorded_at_str: String = row.get("recorded_at");
    let frequency_str: Option<String> = row.get("recurring_frequency");
    let next_occurrence_str: Option<String> = row.get("next_occurrence");
    let parent_id_str: Option<String> = row.get("parent_id");
    let deleted_at_str: Option<String> = row.get("deleted_at");

    let recurrence = match (frequency_str, next_occurrence_str) {
        (Some(frequency), Some(next)) => Some(Recurrence {
            frequency: Frequency::from_str(&frequency)
                .ok_or_else(|| anyhow::anyhow!("Invalid frequency: {}", frequency))?,
            next_occurrence: decode_ts(&next)?,
        }),
        _ => None,
    };

    Ok(Transaction {
        id: decode_id(&id_str, "transaction")?,
        sequence: row.get("sequence"),
        account_id: decode_id(&account_id_str, "account")?,
        kind: TransactionKind::from_str(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind_str))?,
        amount_cents: row.get("amount_cents"),
        currency: row.get("currency"),
        category: row.get("category"),
        description: row.get("description"),
        occurred_at: decode_ts(&occurred_at_str)?,
        recorded_at: decode_ts(&recorded_at_str)?,
        recurrence,
        parent_id: parent_id_str
            .as_deref()
            .map(|s| decode_id(s, "parent"))
            .transpose()?,
        deleted_at: decode_opt_ts(deleted_at_str)?,
    })
}

fn row_to_goal(row: &SqliteRow) -> Result<Goal> {
    let id_str: String = row.get("id");
    let account_id_str: String = row.get("account_id");
    let status_str: String = row.get("status");
    let target_date_str: Option<String> = row.get("target_date");
    let completed_at_str: Option<String> = row.get("completed_at");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    Ok(Goal {
        id: decode_id(&id_str, "goal")?,
        account_id: decode_id(&account_id_str, "account")?,
        title: row.get("title"),
        description: row.get("description"),
        target_cents: row.get("target_cents"),
        current_cents: row.get("current_cents"),
        currency: row.get("currency"),
        status: GoalStatus::from_str(&status_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid goal status: {}", status_str))?,
        target_date: target_date_str
            .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
            .transpose()
            .context("Invalid target date")?,
        completed_at: decode_opt_ts(completed_at_str)?,
        version: row.get("version"),
        created_at: decode_ts(&created_at_str)?,
        updated_at: decode_ts(&updated_at_str)?,
    })
}

fn row_to_progress(row: &SqliteRow) -> Result<GoalProgress> {
    let id_str: String = row.get("id");
    let goal_id_str: String = row.get("goal_id");
    let type_str: String = row.get("progress_type");
    let created_at_str: String = row.get("created_at");

    Ok(GoalProgress {
        id: decode_id(&id_str, "progress")?,
        goal_id: decode_id(&goal_id_str, "goal")?,
        progress_type: ProgressType::from_str(&type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid progress type: {}", type_str))?,
        amount_cents: row.get("amount_cents"),
        applied_cents: row.get("applied_cents"),
        description: row.get("description"),
        created_at: decode_ts(&created_at_str)?,
    })
}
