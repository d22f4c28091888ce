//! Plain-text rendering shared by the one-shot commands and the chat REPL.

use std::fmt::Write;

use crate::application::{BalanceSnapshot, PeriodStatistics};
use crate::conversation::Reply;
use crate::domain::{Goal, GoalProgress, Transaction, TransactionKind, format_cents, format_cents_grouped};

pub fn render_balance(snapshot: &BalanceSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Balance:       {:>18} {}",
        format_cents_grouped(snapshot.balance),
        snapshot.currency
    );
    let _ = writeln!(
        out,
        "Total income:  {:>18}",
        format_cents_grouped(snapshot.total_income)
    );
    let _ = writeln!(
        out,
        "Total expense: {:>18}",
        format_cents_grouped(snapshot.total_expenses)
    );
    let _ = writeln!(out, "Transactions:  {:>18}", snapshot.transaction_count);
    out
}

pub fn render_transactions(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return "No transactions found.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:>14} {:<16} {:<36} DESCRIPTION",
        "DATE", "AMOUNT", "CATEGORY", "ID"
    );
    let _ = writeln!(out, "{}", "-".repeat(100));
    for transaction in transactions {
        let sign = match transaction.kind {
            TransactionKind::Income => "+",
            TransactionKind::Expense => "-",
            TransactionKind::Transfer => "~",
        };
        let mut description = transaction.description.clone().unwrap_or_default();
        if transaction.is_deleted() {
            description = format!("[deleted] {}", description);
        }
        let _ = writeln!(
            out,
            "{:<12} {:>14} {:<16} {:<36} {}",
            transaction.occurred_at.format("%Y-%m-%d"),
            format!("{}{}", sign, format_cents(transaction.amount_cents)),
            truncate(&transaction.category, 16),
            transaction.id,
            truncate(description.trim(), 30)
        );
    }
    out
}

pub fn render_statistics(stats: &PeriodStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Statistics {} to {}",
        stats.from_date.format("%Y-%m-%d"),
        stats.to_date.format("%Y-%m-%d")
    );
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Income:  {:>18} ({} transactions)",
        format_cents_grouped(stats.total_income),
        stats.income_count
    );
    let _ = writeln!(
        out,
        "Expense: {:>18} ({} transactions)",
        format_cents_grouped(stats.total_expense),
        stats.expense_count
    );
    let _ = writeln!(out, "{}", "-".repeat(28));
    let _ = writeln!(
        out,
        "Net:     {:>18} {}",
        format_cents_grouped(stats.net),
        stats.currency
    );

    if !stats.top_expenses.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Top expense categories:");
        for share in &stats.top_expenses {
            let _ = writeln!(
                out,
                "  {:<20} {:>15} ({:>5.1}%)",
                truncate(&share.category, 20),
                format_cents_grouped(share.total),
                share.percentage
            );
        }
    }
    out
}

pub fn render_goal(goal: &Goal) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} [{}] ({})", goal.title, goal.status, goal.id);
    let _ = writeln!(
        out,
        "  {} / {} {} ({:.1}%)",
        format_cents_grouped(goal.current_cents),
        format_cents_grouped(goal.target_cents),
        goal.currency,
        goal.progress_percentage()
    );
    if let Some(date) = goal.target_date {
        let _ = writeln!(out, "  Deadline: {}", date.format("%d.%m.%Y"));
    }
    out
}

pub fn render_goals(goals: &[Goal]) -> String {
    if goals.is_empty() {
        return "No goals found.\n".to_string();
    }
    goals.iter().map(render_goal).collect()
}

pub fn render_goal_history(goal: &Goal, entries: &[GoalProgress]) -> String {
    let mut out = render_goal(goal);
    if entries.is_empty() {
        out.push_str("  No progress yet.\n");
        return out;
    }
    for entry in entries {
        let _ = writeln!(
            out,
            "  {} {:<12} {:>14} applied {:>14} {}",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.progress_type,
            format_cents(entry.amount_cents),
            format_cents(entry.applied_cents),
            entry.description.as_deref().unwrap_or("")
        );
    }
    out
}

/// Text answer for a chat message.
pub fn render_reply(reply: &Reply) -> String {
    match reply {
        Reply::Welcome { account, created } => {
            let name = account.display_name.as_deref().unwrap_or("there");
            let greeting = if *created { "Welcome" } else { "Welcome back" };
            format!("{}, {}!\n{}", greeting, name, HELP)
        }
        Reply::Help => HELP.to_string(),
        Reply::Prompt(prompt) => format!("{}\n", prompt),
        Reply::Rejected { error, prompt } => format!("{}\n{}\n", error, prompt),
        Reply::TransactionRecorded(receipt) => {
            let sign = if receipt.transaction.kind == TransactionKind::Income {
                "+"
            } else {
                "-"
            };
            format!(
                "Saved: {}{} {} [{}]\nNew balance: {} {}\n",
                sign,
                format_cents_grouped(receipt.transaction.amount_cents),
                receipt.transaction.currency,
                receipt.transaction.category,
                format_cents_grouped(receipt.new_balance),
                receipt.account.currency
            )
        }
        Reply::GoalCreated(goal) => format!("Goal created:\n{}", render_goal(goal)),
        Reply::CommitFailed {
            reason,
            temporary: true,
        } => format!(
            "Could not save right now: {}\nSend /retry to try again or /cancel to discard.\n",
            reason
        ),
        Reply::CommitFailed {
            reason,
            temporary: false,
        } => format!(
            "Could not save: {}\nSend /retry once it can go through, or /cancel to discard.\n",
            reason
        ),
        Reply::Busy => "Still working on your previous message.\n".to_string(),
        Reply::Cancelled => "Cancelled.\n".to_string(),
        Reply::NothingToCancel => "Nothing to cancel.\n".to_string(),
        Reply::NothingToRetry => "Nothing to retry.\n".to_string(),
        Reply::Balance(snapshot) => render_balance(snapshot),
        Reply::History(transactions) => render_transactions(transactions),
        Reply::Goals(goals) => render_goals(goals),
        Reply::Statistics(stats) => render_statistics(stats),
        Reply::Failed(reason) => format!("Error: {}\n", reason),
        Reply::Unrecognized(text) => format!("Don't know what to do with '{}'. Try /help\n", text),
    }
}

const HELP: &str = "\
Commands:
  /income   record an income
  /expense  record an expense
  /goal     create a savings goal
  /balance  show your balance
  /history  last 10 transactions
  /goals    active goals
  /stats    last 30 days
  /cancel   abandon the current input
  /retry    save a failed input again
";

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
