use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{LedgerService, NewGoal, NewTransaction, UserProfile};
use crate::config::{LedgerOptions, Settings, StoreConfig};
use crate::conversation::{STATS_WINDOW_DAYS, TARGET_DATE_FORMAT, TOP_EXPENSE_CATEGORIES};
use crate::domain::{
    DeletionPolicy, Frequency, GoalStatus, ProgressType, TransactionKind, UserKey, format_cents,
    format_cents_grouped, parse_cents,
};
use crate::storage::TransactionQuery;

mod chat;
mod render;

pub use render::*;

/// Moneta - conversational finance ledger
#[derive(Parser)]
#[command(name = "moneta")]
#[command(about = "Track income, expenses and savings goals with a consistent ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(long, env = "MONETA_DATABASE", default_value = "moneta.db", global = true)]
    pub database: String,

    /// Chat user the command acts for
    #[arg(short, long, env = "MONETA_USER", global = true)]
    pub user: Option<UserKey>,

    /// Maximum pooled database connections
    #[arg(long, env = "MONETA_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    pub max_connections: u32,

    /// Milliseconds a writer waits on a locked database
    #[arg(long, env = "MONETA_BUSY_TIMEOUT_MS", default_value_t = 5000, global = true)]
    pub busy_timeout_ms: u64,

    /// Currency for newly registered users
    #[arg(long, env = "MONETA_CURRENCY", default_value = "RUB", global = true)]
    pub currency: String,

    /// What deleting a transaction does to the balance: retain, reverse
    #[arg(long, env = "MONETA_DELETION_POLICY", default_value = "retain", global = true)]
    pub deletion_policy: String,

    /// Attempts per write before giving up on concurrent updates
    #[arg(long, env = "MONETA_COMMIT_ATTEMPTS", default_value_t = 32, global = true)]
    pub commit_attempts: u32,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "MONETA_LOG", default_value = "info", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Register a user or refresh their profile
    Register {
        #[arg(long)]
        username: Option<String>,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// Record an income
    Income(TransactionArgs),

    /// Record an expense
    Expense(TransactionArgs),

    /// Show balance and totals
    Balance,

    /// List recent transactions
    History {
        /// Maximum number of transactions to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Include deleted transactions
        #[arg(long)]
        all: bool,
    },

    /// List transactions inside a date range
    Range {
        /// Start date (YYYY-MM-DD, defaults to the start of the month)
        #[arg(long)]
        from: Option<String>,

        /// End date, inclusive (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        to: Option<String>,

        /// Filter by kind: income, expense, transfer
        #[arg(long)]
        kind: Option<String>,

        /// Filter by category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Income/expense statistics for recent days
    Stats {
        /// Number of days to cover
        #[arg(long, default_value_t = STATS_WINDOW_DAYS)]
        days: i64,

        /// Number of expense categories to show
        #[arg(long, default_value_t = TOP_EXPENSE_CATEGORIES)]
        top: usize,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Soft-delete a transaction
    Delete {
        /// Transaction ID
        id: String,
    },

    /// Restore a deleted transaction
    Restore {
        /// Transaction ID
        id: String,
    },

    /// Savings goal commands
    #[command(subcommand)]
    Goal(GoalCommands),

    /// Recurring transaction commands
    #[command(subcommand)]
    Recurring(RecurringCommands),

    /// Export a user's data to CSV or JSON
    Export {
        /// What to export: transactions, goals, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Talk to the ledger the way the chat bot does, one message per line
    Chat {
        /// Display name to register with
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete a user with all their transactions and goals
    Close {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(clap::Args)]
pub struct TransactionArgs {
    /// Amount (e.g. "50.00", "12,5" or "50")
    pub amount: String,

    /// Category (e.g. "groceries", "salary")
    #[arg(short, long)]
    pub category: String,

    /// Description
    #[arg(short, long)]
    pub description: Option<String>,

    /// When it happened (YYYY-MM-DD, defaults to now)
    #[arg(long)]
    pub date: Option<String>,

    /// Repeat: daily, weekly, monthly, yearly
    #[arg(long)]
    pub every: Option<String>,
}

#[derive(Subcommand)]
pub enum GoalCommands {
    /// Create a savings goal
    Create {
        /// Goal title
        title: String,

        /// Target amount
        target: String,

        /// Deadline (DD.MM.YYYY)
        #[arg(long)]
        deadline: Option<String>,

        /// Description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List goals
    List {
        /// Include completed, paused and cancelled goals
        #[arg(long)]
        all: bool,
    },

    /// Add money to a goal
    Contribute {
        id: String,
        amount: String,
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Take money out of a goal
    Withdraw {
        id: String,
        amount: String,
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Record an informational adjustment
    Adjust {
        id: String,
        amount: String,
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Show the progress history of a goal
    History { id: String },

    /// Change a goal's status: active, paused, cancelled
    Status { id: String, status: String },
}

#[derive(Subcommand)]
pub enum RecurringCommands {
    /// Record every recurring occurrence that is due
    Run {
        /// Treat this date as now (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<String>,
    },
}

impl Cli {
    /// Runtime settings assembled from flags and environment.
    pub fn settings(&self) -> Result<Settings> {
        let deletion_policy = DeletionPolicy::from_str(&self.deletion_policy).with_context(|| {
            format!(
                "Invalid deletion policy '{}'. Valid policies: retain, reverse",
                self.deletion_policy
            )
        })?;

        Ok(Settings {
            store: StoreConfig {
                max_connections: self.max_connections,
                busy_timeout_ms: self.busy_timeout_ms,
                ..StoreConfig::for_path(&self.database)
            },
            ledger: LedgerOptions {
                default_currency: self.currency.clone(),
                ..LedgerOptions::default()
            }
            .with_deletion_policy(deletion_policy)
            .with_commit_attempts(self.commit_attempts),
            log_level: self.log.clone(),
        })
    }

    fn user(&self) -> Result<UserKey> {
        self.user
            .context("No user given. Pass --user <ID> or set MONETA_USER")
    }

    pub async fn run(self) -> Result<()> {
        let settings = self.settings()?;
        let service = LedgerService::open(&settings.store, settings.ledger.clone()).await?;

        let result = self.execute(&service).await;
        service.close().await;
        result
    }

    async fn execute(&self, service: &LedgerService) -> Result<()> {
        match &self.command {
            Commands::Init => {
                println!("Database initialized: {}", self.database);
            }

            Commands::Register { username, name } => {
                let mut profile = UserProfile::new(self.user()?);
                profile.username = username.clone();
                profile.display_name = name.clone();
                let (account, created) = service.register_user(profile).await?;
                if created {
                    println!("Registered user {} ({})", account.user_key, account.id);
                } else {
                    println!("Updated user {} ({})", account.user_key, account.id);
                }
            }

            Commands::Income(args) => {
                run_transaction_command(service, self.user()?, TransactionKind::Income, args)
                    .await?;
            }

            Commands::Expense(args) => {
                run_transaction_command(service, self.user()?, TransactionKind::Expense, args)
                    .await?;
            }

            Commands::Balance => {
                let snapshot = service.balance(self.user()?).await?;
                print!("{}", render_balance(&snapshot));
            }

            Commands::History { limit, all } => {
                let transactions = service
                    .recent_transactions(self.user()?, *limit, *all)
                    .await?;
                print!("{}", render_transactions(&transactions));
            }

            Commands::Range {
                from,
                to,
                kind,
                category,
            } => {
                let (start, end) = parse_date_range(from.as_deref(), to.as_deref())?;
                let mut query = TransactionQuery::between(start, end);
                if let Some(kind) = kind {
                    query = query.with_kind(TransactionKind::from_str(kind).with_context(|| {
                        format!(
                            "Invalid kind '{}'. Valid kinds: income, expense, transfer",
                            kind
                        )
                    })?);
                }
                if let Some(category) = category {
                    query = query.with_category(category.clone());
                }
                let transactions = service.transactions_in_range(self.user()?, &query).await?;
                print!("{}", render_transactions(&transactions));
            }

            Commands::Stats { days, top, format } => {
                let (start, end) = stats_window(Utc::now(), *days)?;
                let stats = service
                    .period_statistics(self.user()?, start, end, *top)
                    .await?;
                match format.as_str() {
                    "json" => println!("{}", serde_json::to_string_pretty(&stats)?),
                    "text" => print!("{}", render_statistics(&stats)),
                    _ => anyhow::bail!("Invalid format '{}'. Valid formats: text, json", format),
                }
            }

            Commands::Delete { id } => {
                let transaction = service
                    .delete_transaction(self.user()?, parse_id(id)?)
                    .await?;
                println!(
                    "Deleted {} {} ({})",
                    transaction.kind,
                    format_cents(transaction.amount_cents),
                    transaction.id
                );
            }

            Commands::Restore { id } => {
                let transaction = service
                    .restore_transaction(self.user()?, parse_id(id)?)
                    .await?;
                println!(
                    "Restored {} {} ({})",
                    transaction.kind,
                    format_cents(transaction.amount_cents),
                    transaction.id
                );
            }

            Commands::Goal(cmd) => {
                run_goal_command(service, self.user()?, cmd).await?;
            }

            Commands::Recurring(RecurringCommands::Run { as_of }) => {
                let as_of = match as_of {
                    Some(date) => end_of_day(date)?,
                    None => Utc::now(),
                };
                let run = service.materialize_due_recurring(as_of).await?;
                println!("Recorded {} recurring transactions", run.materialized.len());
                for failure in &run.failures {
                    println!(
                        "  Failed {} due {}: {}",
                        failure.template_id,
                        failure.due_at.format("%Y-%m-%d"),
                        failure.reason
                    );
                }
            }

            Commands::Export {
                export_type,
                output,
            } => {
                run_export_command(service, self.user()?, export_type, output.as_deref()).await?;
            }

            Commands::Chat { name } => {
                let mut profile = UserProfile::new(self.user()?);
                profile.display_name = name.clone();
                chat::run_chat(service.clone(), profile).await?;
            }

            Commands::Close { yes } => {
                if !yes {
                    anyhow::bail!("Refusing to delete user data without --yes");
                }
                let user = self.user()?;
                service.close_account(user).await?;
                println!("Deleted user {} and all their data", user);
            }
        }

        Ok(())
    }
}

/// The `days` long window ending at `end`.
fn stats_window(end: DateTime<Utc>, days: i64) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = Duration::try_days(days)
        .and_then(|span| end.checked_sub_signed(span))
        .with_context(|| format!("Invalid --days value {}: window out of range", days))?;
    Ok((start, end))
}

async fn run_transaction_command(
    service: &LedgerService,
    user: UserKey,
    kind: TransactionKind,
    args: &TransactionArgs,
) -> Result<()> {
    let amount_cents =
        parse_cents(&args.amount).context("Invalid amount format. Use '50.00' or '50'")?;

    let mut request = NewTransaction::new(kind, amount_cents, args.category.clone());
    request.description = args.description.clone();
    if let Some(date) = &args.date {
        request = request.with_occurred_at(parse_date(date).with_context(|| {
            format!("Invalid date format '{}'. Use YYYY-MM-DD", date)
        })?);
    }
    if let Some(every) = &args.every {
        let frequency = Frequency::from_str(every).with_context(|| {
            format!(
                "Invalid frequency '{}'. Valid: daily, weekly, monthly, yearly",
                every
            )
        })?;
        request = request.with_frequency(frequency);
    }

    let receipt = service.create_transaction(user, request).await?;
    println!(
        "Recorded {}: {} {} [{}] ({})",
        kind,
        format_cents_grouped(receipt.transaction.amount_cents),
        receipt.transaction.currency,
        receipt.transaction.category,
        receipt.transaction_id
    );
    println!(
        "New balance: {} {}",
        format_cents_grouped(receipt.new_balance),
        receipt.account.currency
    );
    if let Some(recurrence) = receipt.transaction.recurrence {
        println!(
            "Repeats {}; next on {}",
            recurrence.frequency,
            recurrence.next_occurrence.format("%Y-%m-%d")
        );
    }
    Ok(())
}

async fn run_goal_command(service: &LedgerService, user: UserKey, cmd: &GoalCommands) -> Result<()> {
    match cmd {
        GoalCommands::Create {
            title,
            target,
            deadline,
            description,
        } => {
            let target_cents =
                parse_cents(target).context("Invalid amount format. Use '50.00' or '50'")?;
            let mut request = NewGoal::new(title.clone(), target_cents);
            request.description = description.clone();
            if let Some(deadline) = deadline {
                request = request.with_target_date(
                    NaiveDate::parse_from_str(deadline, TARGET_DATE_FORMAT).with_context(|| {
                        format!("Invalid deadline '{}'. Use DD.MM.YYYY", deadline)
                    })?,
                );
            }
            let goal = service.create_goal(user, request).await?;
            println!("Created goal: {} ({})", goal.title, goal.id);
        }

        GoalCommands::List { all } => {
            let statuses: &[GoalStatus] = if *all { &[] } else { &[GoalStatus::Active] };
            let goals = service.goals(user, statuses).await?;
            print!("{}", render_goals(&goals));
        }

        GoalCommands::Contribute {
            id,
            amount,
            description,
        } => {
            run_progress(service, user, id, ProgressType::Contribution, amount, description).await?;
        }

        GoalCommands::Withdraw {
            id,
            amount,
            description,
        } => {
            run_progress(service, user, id, ProgressType::Withdrawal, amount, description).await?;
        }

        GoalCommands::Adjust {
            id,
            amount,
            description,
        } => {
            run_progress(service, user, id, ProgressType::Adjustment, amount, description).await?;
        }

        GoalCommands::History { id } => {
            let goal = service.goal(user, parse_id(id)?).await?;
            let entries = service.goal_history(user, goal.id).await?;
            print!("{}", render_goal_history(&goal, &entries));
        }

        GoalCommands::Status { id, status } => {
            let status = GoalStatus::from_str(status).with_context(|| {
                format!(
                    "Invalid status '{}'. Valid: active, paused, cancelled",
                    status
                )
            })?;
            let goal = service.set_goal_status(user, parse_id(id)?, status).await?;
            println!("Goal '{}' is now {}", goal.title, goal.status);
        }
    }
    Ok(())
}

async fn run_progress(
    service: &LedgerService,
    user: UserKey,
    id: &str,
    progress_type: ProgressType,
    amount: &str,
    description: &Option<String>,
) -> Result<()> {
    let amount_cents = parse_cents(amount).context("Invalid amount format. Use '50.00' or '50'")?;
    let receipt = service
        .add_goal_progress(user, parse_id(id)?, progress_type, amount_cents, description.clone())
        .await?;
    print!("{}", render_goal(&receipt.goal));
    if receipt.progress.applied_cents.abs() != receipt.progress.amount_cents
        && progress_type != ProgressType::Adjustment
    {
        println!(
            "  Applied {} of the requested {}",
            format_cents(receipt.progress.applied_cents.abs()),
            format_cents(receipt.progress.amount_cents)
        );
    }
    if receipt.goal.is_completed() {
        println!("  Goal reached!");
    }
    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    user: UserKey,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service, user);

    // Determine output writer
    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "transactions" => {
            let count = exporter.export_transactions_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        "goals" => {
            let count = exporter.export_goals_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} goals", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported {} transactions and {} goals",
                    snapshot.transactions.len(),
                    snapshot.goals.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: transactions, goals, full",
                export_type
            );
        }
    }

    Ok(())
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("Invalid ID: {}", id))
}

fn parse_date_range(from: Option<&str>, to: Option<&str>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    use chrono::Datelike;

    let now = Utc::now();

    // Default to_date is now
    let to_date = match to {
        Some(date_str) => end_of_day(date_str)?,
        None => now,
    };

    // Default from_date is start of current month
    let from_date = match from {
        Some(date_str) => parse_date(date_str)?,
        None => {
            let first = now
                .date_naive()
                .with_day(1)
                .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;
            start_of(first)?
        }
    };

    Ok((from_date, to_date))
}

fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    // Parse YYYY-MM-DD format
    let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .context("Date must be in YYYY-MM-DD format")?;
    start_of(naive_date)
}

fn start_of(date: NaiveDate) -> Result<DateTime<Utc>> {
    Ok(date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?
        .and_utc())
}

/// Last representable instant of the given day.
fn end_of_day(date_str: &str) -> Result<DateTime<Utc>> {
    let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .context("Date must be in YYYY-MM-DD format")?;
    Ok(naive_date
        .and_hms_micro_opt(23, 59, 59, 999_999)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?
        .and_utc())
}
