use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type GoalId = Uuid;
pub type GoalProgressId = Uuid;

/// Shortest goal title the conversational layer accepts
pub const MIN_GOAL_TITLE_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Completed,
    Cancelled,
    Paused,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Cancelled => "cancelled",
            GoalStatus::Paused => "paused",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(GoalStatus::Active),
            "completed" => Some(GoalStatus::Completed),
            "cancelled" => Some(GoalStatus::Cancelled),
            "paused" => Some(GoalStatus::Paused),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GoalStatus::Completed | GoalStatus::Cancelled)
    }
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressType {
    Contribution,
    Withdrawal,
    /// Informational entry; never moves the current amount
    Adjustment,
}

impl ProgressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressType::Contribution => "contribution",
            ProgressType::Withdrawal => "withdrawal",
            ProgressType::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "contribution" => Some(ProgressType::Contribution),
            "withdrawal" => Some(ProgressType::Withdrawal),
            "adjustment" => Some(ProgressType::Adjustment),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProgressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A savings target with progress tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub account_id: AccountId,
    pub title: String,
    pub description: Option<String>,
    pub target_cents: Cents,
    /// Always within `0..=target_cents`
    pub current_cents: Cents,
    pub currency: String,
    pub status: GoalStatus,
    pub target_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only entry in a goal's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalProgress {
    pub id: GoalProgressId,
    pub goal_id: GoalId,
    pub progress_type: ProgressType,
    /// Amount as requested (always positive)
    pub amount_cents: Cents,
    /// Signed delta actually applied to the goal after clamping
    pub applied_cents: Cents,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(
        account_id: AccountId,
        title: impl Into<String>,
        target_cents: Cents,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            title: title.into(),
            description: None,
            target_cents,
            current_cents: 0,
            currency: currency.into(),
            status: GoalStatus::Active,
            target_date: None,
            completed_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == GoalStatus::Completed
    }

    pub fn remaining_cents(&self) -> Cents {
        self.target_cents - self.current_cents
    }

    /// Share of the target already saved, in percent.
    pub fn progress_percentage(&self) -> f64 {
        if self.target_cents == 0 {
            return 0.0;
        }
        self.current_cents as f64 / self.target_cents as f64 * 100.0
    }

    /// Apply a progress entry and return the updated goal with the entry to append.
    ///
    /// Withdrawals clamp at zero and contributions clamp at the target; the
    /// entry records the delta that was actually applied. Completion is
    /// evaluated after every entry and is never undone here.
    pub fn apply_progress(
        &self,
        progress_type: ProgressType,
        amount_cents: Cents,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> (Goal, GoalProgress) {
        let mut next = self.clone();

        let applied_cents = match progress_type {
            ProgressType::Contribution => amount_cents.min(self.remaining_cents()),
            ProgressType::Withdrawal => -amount_cents.min(self.current_cents),
            ProgressType::Adjustment => 0,
        };
        next.current_cents = self.current_cents + applied_cents;

        if next.current_cents >= next.target_cents && next.status != GoalStatus::Completed {
            next.status = GoalStatus::Completed;
            next.completed_at = Some(now);
        }

        next.version = self.version + 1;
        next.updated_at = now;

        let progress = GoalProgress {
            id: Uuid::new_v4(),
            goal_id: self.id,
            progress_type,
            amount_cents,
            applied_cents,
            description,
            created_at: now,
        };

        (next, progress)
    }

    /// Move the goal to a new status, or explain why that isn't allowed.
    pub fn transition_to(&self, status: GoalStatus, now: DateTime<Utc>) -> Result<Goal, GoalError> {
        if self.status == status {
            return Ok(self.clone());
        }
        if self.status.is_terminal() {
            return Err(GoalError::TerminalStatus(self.status));
        }
        // Completion is only ever reached through progress
        if status == GoalStatus::Completed {
            return Err(GoalError::ManualCompletion);
        }

        let mut next = self.clone();
        next.status = status;
        next.version = self.version + 1;
        next.updated_at = now;
        Ok(next)
    }
}

/// Sum of applied deltas; must equal the goal's current amount.
pub fn reconcile_progress(entries: &[GoalProgress]) -> Cents {
    entries.iter().map(|entry| entry.applied_cents).sum()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalError {
    TerminalStatus(GoalStatus),
    ManualCompletion,
}

impl std::fmt::Display for GoalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoalError::TerminalStatus(status) => write!(f, "goal is already {}", status),
            GoalError::ManualCompletion => {
                write!(f, "goals complete by reaching their target amount")
            }
        }
    }
}

impl std::error::Error for GoalError {}
