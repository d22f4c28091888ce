use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{Account, Goal, GoalProgress, Transaction, UserKey, format_cents};

/// Everything one user owns, for full export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub account: Account,
    pub transactions: Vec<Transaction>,
    pub goals: Vec<GoalExport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalExport {
    #[serde(flatten)]
    pub goal: Goal,
    pub progress: Vec<GoalProgress>,
}

/// Exporter for converting one user's ledger to various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
    user_key: UserKey,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService, user_key: UserKey) -> Self {
        Self { service, user_key }
    }

    /// Export transactions to CSV, oldest first. Deleted rows are included
    /// and carry their deletion time.
    pub async fn export_transactions_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let mut transactions = self.service.all_transactions(self.user_key).await?;
        transactions.reverse();
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "occurred_at",
            "kind",
            "amount",
            "currency",
            "category",
            "description",
            "frequency",
            "next_occurrence",
            "parent_id",
            "deleted_at",
        ])?;

        for transaction in &transactions {
            csv_writer.write_record([
                transaction.id.to_string(),
                transaction.sequence.to_string(),
                transaction.occurred_at.to_rfc3339(),
                transaction.kind.to_string(),
                format_cents(transaction.amount_cents),
                transaction.currency.clone(),
                transaction.category.clone(),
                transaction.description.clone().unwrap_or_default(),
                transaction
                    .recurrence
                    .map(|r| r.frequency.to_string())
                    .unwrap_or_default(),
                transaction
                    .recurrence
                    .map(|r| r.next_occurrence.to_rfc3339())
                    .unwrap_or_default(),
                transaction
                    .parent_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                transaction
                    .deleted_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(transactions.len())
    }

    /// Export every goal, whatever its status, to CSV
    pub async fn export_goals_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let goals = self.service.goals(self.user_key, &[]).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "title",
            "status",
            "current",
            "target",
            "progress_percentage",
            "currency",
            "target_date",
            "completed_at",
        ])?;

        for goal in &goals {
            csv_writer.write_record([
                goal.id.to_string(),
                goal.title.clone(),
                goal.status.to_string(),
                format_cents(goal.current_cents),
                format_cents(goal.target_cents),
                format!("{:.1}", goal.progress_percentage()),
                goal.currency.clone(),
                goal.target_date.map(|d| d.to_string()).unwrap_or_default(),
                goal.completed_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(goals.len())
    }

    /// Export the account with its transactions, goals and goal history as JSON
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<AccountSnapshot> {
        let account = self.service.account(self.user_key).await?;
        let mut transactions = self.service.all_transactions(self.user_key).await?;
        transactions.reverse();

        let mut goals = Vec::new();
        for goal in self.service.goals(self.user_key, &[]).await? {
            let progress = self.service.goal_history(self.user_key, goal.id).await?;
            goals.push(GoalExport { goal, progress });
        }

        let snapshot = AccountSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            account,
            transactions,
            goals,
        };

        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writeln!(writer)?;
        Ok(snapshot)
    }
}
