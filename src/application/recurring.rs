use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{Transaction, TransactionId};
use crate::storage::{AccountWrite, CommitOutcome, RecurrenceAdvance};

use super::{AppError, LedgerService};

/// Outcome of one materialization pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecurringRun {
    pub as_of: Option<DateTime<Utc>>,
    pub materialized: Vec<Transaction>,
    pub failures: Vec<RecurringFailure>,
}

/// An occurrence that could not be recorded; it stays due.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringFailure {
    pub template_id: TransactionId,
    pub due_at: DateTime<Utc>,
    pub reason: String,
}

enum Step {
    Recorded(Transaction),
    /// Someone else already advanced the template
    Superseded,
    Failed(String),
}

impl LedgerService {
    /// Record every recurring occurrence due at or before `as_of`.
    ///
    /// Each occurrence goes through the same conditional commit as a manual
    /// transaction, together with advancing its template, so concurrent runs
    /// never record the same occurrence twice. A template whose occurrence
    /// fails stops there and is retried by the next run.
    pub async fn materialize_due_recurring(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<RecurringRun, AppError> {
        let mut run = RecurringRun {
            as_of: Some(as_of),
            ..RecurringRun::default()
        };

        for template in self.store.list_due_recurring(as_of).await? {
            let mut template = template;

            while let Some(recurrence) = template.recurrence {
                if recurrence.next_occurrence > as_of {
                    break;
                }

                match self.record_occurrence(&template).await? {
                    Step::Recorded(occurrence) => {
                        run.materialized.push(occurrence);
                    }
                    Step::Superseded => {
                        debug!(template = %template.id, "occurrence recorded by another run");
                    }
                    Step::Failed(reason) => {
                        warn!(template = %template.id, due = %recurrence.next_occurrence, %reason, "recurring occurrence failed");
                        run.failures.push(RecurringFailure {
                            template_id: template.id,
                            due_at: recurrence.next_occurrence,
                            reason,
                        });
                        break;
                    }
                }

                match self.store.get_transaction(template.id).await? {
                    Some(fresh) if !fresh.is_deleted() => template = fresh,
                    _ => break,
                }
            }
        }

        if !run.materialized.is_empty() || !run.failures.is_empty() {
            info!(
                recorded = run.materialized.len(),
                failed = run.failures.len(),
                "recurring run finished"
            );
        }
        Ok(run)
    }

    async fn record_occurrence(&self, template: &Transaction) -> Result<Step, AppError> {
        let Some(recurrence) = template.recurrence else {
            return Ok(Step::Superseded);
        };
        let Some(next_occurrence) = recurrence.frequency.advance(recurrence.next_occurrence) else {
            return Ok(Step::Failed("next occurrence is out of range".to_string()));
        };
        let Some(mut occurrence) = template.materialize_occurrence() else {
            return Ok(Step::Superseded);
        };
        let advance = RecurrenceAdvance {
            template_id: template.id,
            expected_next: recurrence.next_occurrence,
            next_occurrence,
        };

        for _ in 0..self.options.commit_attempts {
            let Some(account) = self.store.get_account(template.account_id).await? else {
                return Ok(Step::Failed("account no longer exists".to_string()));
            };
            let next = match account.apply_transaction(occurrence.kind, occurrence.amount_cents) {
                Ok(next) => next,
                Err(err) => return Ok(Step::Failed(err.to_string())),
            };
            let write = AccountWrite {
                expected_version: account.version,
                account: &next,
            };

            match self
                .store
                .commit_transaction(write, &mut occurrence, Some(advance))
                .await?
            {
                CommitOutcome::Committed => return Ok(Step::Recorded(occurrence)),
                CommitOutcome::Conflict => {
                    // Either the account moved or the template did
                    let still_due = self
                        .store
                        .get_transaction(template.id)
                        .await?
                        .and_then(|t| if t.is_deleted() { None } else { t.recurrence })
                        .is_some_and(|r| r.next_occurrence == recurrence.next_occurrence);
                    if !still_due {
                        return Ok(Step::Superseded);
                    }
                }
            }
        }

        Ok(Step::Failed(self.conflict().to_string()))
    }
}
