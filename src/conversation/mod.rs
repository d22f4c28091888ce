//! Chat-facing layer: guided input flows on top of the ledger service.
//!
//! A [`Dialogue`] turns one incoming message into one [`Reply`]. Multi-step
//! inputs live as explicit [`Flow`] values in a [`SessionStore`]; the ledger
//! is only touched once a flow has collected every field.

mod flow;
mod session;

pub use flow::*;
pub use session::*;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::application::{
    AppError, BalanceSnapshot, LedgerService, NewGoal, NewTransaction, PeriodStatistics,
    TransactionReceipt, UserProfile,
};
use crate::domain::{Account, Goal, Transaction, TransactionKind, UserKey};

/// Rows shown by the history command.
pub const HISTORY_LIMIT: usize = 10;

/// Window covered by the statistics command.
pub const STATS_WINDOW_DAYS: i64 = 30;

pub const TOP_EXPENSE_CATEGORIES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Income,
    Expense,
    Goal,
    Cancel,
    Retry,
    Balance,
    History,
    Goals,
    Stats,
}

impl Command {
    /// Parse `/name` (optionally `/name@bot`). Returns None for plain text.
    pub fn parse(text: &str) -> Option<Result<Command, String>> {
        let text = text.trim();
        let name = text.strip_prefix('/')?;
        let name = name.split_whitespace().next().unwrap_or_default();
        let name = name.split('@').next().unwrap_or_default().to_lowercase();

        Some(match name.as_str() {
            "start" => Ok(Command::Start),
            "help" => Ok(Command::Help),
            "income" | "add_income" => Ok(Command::Income),
            "expense" | "add_expense" => Ok(Command::Expense),
            "goal" | "create_goal" => Ok(Command::Goal),
            "cancel" => Ok(Command::Cancel),
            "retry" => Ok(Command::Retry),
            "balance" => Ok(Command::Balance),
            "history" => Ok(Command::History),
            "goals" => Ok(Command::Goals),
            "stats" => Ok(Command::Stats),
            _ => Err(name),
        })
    }
}

/// Answer to a single message.
#[derive(Debug, Clone)]
pub enum Reply {
    Welcome { account: Account, created: bool },
    Help,
    Prompt(Prompt),
    /// The answer was invalid; the same question stands
    Rejected { error: InputError, prompt: Prompt },
    TransactionRecorded(TransactionReceipt),
    GoalCreated(Goal),
    /// The ledger refused or failed; collected fields are kept for /retry.
    /// `temporary` marks store trouble, where retrying as-is may succeed.
    CommitFailed { reason: String, temporary: bool },
    /// Another message from the same user is already handling this flow
    Busy,
    Cancelled,
    NothingToCancel,
    NothingToRetry,
    Balance(BalanceSnapshot),
    History(Vec<Transaction>),
    Goals(Vec<Goal>),
    Statistics(PeriodStatistics),
    Failed(String),
    Unrecognized(String),
}

enum Committed {
    Transaction(TransactionReceipt),
    Goal(Goal),
}

/// Per-message driver shared by every user. Cloning is cheap.
#[derive(Clone)]
pub struct Dialogue {
    service: LedgerService,
    sessions: SessionStore,
}

impl Dialogue {
    pub fn new(service: LedgerService) -> Self {
        Self {
            service,
            sessions: SessionStore::new(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn handle(&self, profile: &UserProfile, text: &str) -> Reply {
        self.handle_at(profile, text, Utc::now()).await
    }

    /// Handle a message as if it arrived at `now`.
    pub async fn handle_at(&self, profile: &UserProfile, text: &str, now: DateTime<Utc>) -> Reply {
        let user = profile.user_key;
        let (account, created) = match self.service.register_user(profile.clone()).await {
            Ok(registered) => registered,
            Err(err) => return Reply::Failed(err.to_string()),
        };

        let command = match Command::parse(text) {
            None => return self.answer(user, text, now).await,
            Some(Err(name)) => return Reply::Unrecognized(name),
            Some(Ok(command)) => command,
        };

        match command {
            Command::Start => Reply::Welcome { account, created },
            Command::Help => Reply::Help,
            Command::Income => self.start(user, Flow::transaction(TransactionKind::Income)).await,
            Command::Expense => self.start(user, Flow::transaction(TransactionKind::Expense)).await,
            Command::Goal => self.start(user, Flow::goal()).await,
            Command::Cancel => match self.sessions.clear(user).await {
                Some(_) => {
                    debug!(user, "flow cancelled");
                    Reply::Cancelled
                }
                None => Reply::NothingToCancel,
            },
            Command::Retry => match self.sessions.take_if(user, Flow::is_ready).await {
                Some(flow) => self.commit(user, flow, now).await,
                None => Reply::NothingToRetry,
            },
            Command::Balance => reply_with(self.service.balance(user).await, Reply::Balance),
            Command::History => reply_with(
                self.service
                    .recent_transactions(user, HISTORY_LIMIT, false)
                    .await,
                Reply::History,
            ),
            Command::Goals => reply_with(self.service.active_goals(user).await, Reply::Goals),
            Command::Stats => reply_with(
                self.service
                    .period_statistics(
                        user,
                        now - Duration::days(STATS_WINDOW_DAYS),
                        now,
                        TOP_EXPENSE_CATEGORIES,
                    )
                    .await,
                Reply::Statistics,
            ),
        }
    }

    async fn start(&self, user: UserKey, flow: Flow) -> Reply {
        let prompt = flow.prompt();
        self.sessions.set(user, flow).await;
        debug!(user, ?prompt, "flow started");
        Reply::Prompt(prompt)
    }

    async fn answer(&self, user: UserKey, text: &str, now: DateTime<Utc>) -> Reply {
        let Some(current) = self.sessions.get(user).await else {
            return Reply::Unrecognized(text.trim().to_string());
        };

        let mut flow = current.clone();
        if let Err(error) = flow.accept(text, now.date_naive()) {
            return Reply::Rejected {
                error,
                prompt: flow.prompt(),
            };
        }

        // A finished flow leaves the map before its commit starts
        let next = (!flow.is_ready()).then(|| flow.clone());
        if !self.sessions.replace_if(user, &current, next).await {
            debug!(user, "flow changed by a concurrent message");
            return Reply::Busy;
        }

        if flow.is_ready() {
            self.commit(user, flow, now).await
        } else {
            Reply::Prompt(flow.prompt())
        }
    }

    /// Hand a claimed flow to the ledger.
    ///
    /// The caller has already taken `flow` out of the session map, so no
    /// other message can commit it too. The write runs on its own task and a
    /// caller that goes away mid-commit cannot leave it half done. On failure
    /// the flow goes back for /retry.
    async fn commit(&self, user: UserKey, flow: Flow, now: DateTime<Utc>) -> Reply {
        let Some(draft) = flow.draft() else {
            let prompt = flow.prompt();
            self.sessions.restore(user, flow).await;
            return Reply::Prompt(prompt);
        };

        let service = self.service.clone();
        let task = tokio::spawn(async move {
            match draft {
                Draft::Transaction(draft) => {
                    let mut request =
                        NewTransaction::new(draft.kind, draft.amount_cents, draft.category)
                            .with_occurred_at(now);
                    request.description = draft.description;
                    service
                        .create_transaction(user, request)
                        .await
                        .map(Committed::Transaction)
                }
                Draft::Goal(draft) => {
                    let mut request = NewGoal::new(draft.title, draft.target_cents);
                    request.target_date = draft.target_date;
                    service.create_goal(user, request).await.map(Committed::Goal)
                }
            }
        });

        let (reason, temporary) = match task.await {
            Ok(Ok(Committed::Transaction(receipt))) => {
                return Reply::TransactionRecorded(receipt);
            }
            Ok(Ok(Committed::Goal(goal))) => return Reply::GoalCreated(goal),
            Ok(Err(err)) => {
                warn!(user, error = %err, "commit rejected, keeping flow for retry");
                (err.to_string(), err.is_storage())
            }
            Err(err) => {
                warn!(user, error = %err, "commit task failed");
                (err.to_string(), true)
            }
        };

        if !self.sessions.restore(user, flow).await {
            debug!(user, "newer flow started, dropping failed draft");
        }
        Reply::CommitFailed { reason, temporary }
    }
}

fn reply_with<T>(result: Result<T, AppError>, f: impl FnOnce(T) -> Reply) -> Reply {
    match result {
        Ok(value) => f(value),
        Err(err) => Reply::Failed(err.to_string()),
    }
}
