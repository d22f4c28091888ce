use std::fmt;

use chrono::NaiveDate;

use crate::domain::{
    AmountError, Cents, FieldError, MIN_GOAL_TITLE_LEN, ParseCentsError, TransactionKind,
    parse_cents, validate_amount, validate_category,
};

/// Reply that skips an optional field.
pub const SKIP: &str = "-";

/// Date format accepted for goal deadlines.
pub const TARGET_DATE_FORMAT: &str = "%d.%m.%Y";

pub const INCOME_CATEGORIES: &[&str] = &[
    "Salary",
    "Freelance",
    "Gift",
    "Investments",
    "Interest",
    "Other",
];

pub const EXPENSE_CATEGORIES: &[&str] = &[
    "Groceries",
    "Housing",
    "Transport",
    "Clothing",
    "Entertainment",
    "Health",
    "Education",
    "Phone",
    "Other",
];

/// A guided multi-step input in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Transaction {
        kind: TransactionKind,
        step: TransactionStep,
    },
    Goal(GoalStep),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStep {
    AwaitingAmount,
    AwaitingCategory {
        amount_cents: Cents,
    },
    AwaitingDescription {
        amount_cents: Cents,
        category: String,
    },
    /// Every field collected; only the commit is left
    Ready(TransactionDraft),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalStep {
    AwaitingTitle,
    AwaitingTarget { title: String },
    AwaitingDate { title: String, target_cents: Cents },
    Ready(GoalDraft),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub kind: TransactionKind,
    pub amount_cents: Cents,
    pub category: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalDraft {
    pub title: String,
    pub target_cents: Cents,
    pub target_date: Option<NaiveDate>,
}

/// Collected fields ready to hand to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draft {
    Transaction(TransactionDraft),
    Goal(GoalDraft),
}

/// What the user is asked next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Amount(TransactionKind),
    Category(TransactionKind),
    Description,
    GoalTitle,
    GoalTarget,
    GoalDate,
    /// Fields are complete and the commit has not gone through yet
    Retry,
}

impl Flow {
    pub fn transaction(kind: TransactionKind) -> Self {
        Flow::Transaction {
            kind,
            step: TransactionStep::AwaitingAmount,
        }
    }

    pub fn goal() -> Self {
        Flow::Goal(GoalStep::AwaitingTitle)
    }

    pub fn prompt(&self) -> Prompt {
        match self {
            Flow::Transaction { kind, step } => match step {
                TransactionStep::AwaitingAmount => Prompt::Amount(*kind),
                TransactionStep::AwaitingCategory { .. } => Prompt::Category(*kind),
                TransactionStep::AwaitingDescription { .. } => Prompt::Description,
                TransactionStep::Ready(_) => Prompt::Retry,
            },
            Flow::Goal(step) => match step {
                GoalStep::AwaitingTitle => Prompt::GoalTitle,
                GoalStep::AwaitingTarget { .. } => Prompt::GoalTarget,
                GoalStep::AwaitingDate { .. } => Prompt::GoalDate,
                GoalStep::Ready(_) => Prompt::Retry,
            },
        }
    }

    /// The collected fields, once the last step has been answered.
    pub fn draft(&self) -> Option<Draft> {
        match self {
            Flow::Transaction {
                step: TransactionStep::Ready(draft),
                ..
            } => Some(Draft::Transaction(draft.clone())),
            Flow::Goal(GoalStep::Ready(draft)) => Some(Draft::Goal(draft.clone())),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.draft().is_some()
    }

    /// Feed one answer into the flow.
    ///
    /// On error the flow is left exactly as it was, so the same question can
    /// be asked again without losing earlier answers.
    pub fn accept(&mut self, input: &str, today: NaiveDate) -> Result<(), InputError> {
        let input = input.trim();
        match self {
            Flow::Transaction { kind, step } => {
                let next = match step {
                    TransactionStep::AwaitingAmount => TransactionStep::AwaitingCategory {
                        amount_cents: parse_amount(input)?,
                    },
                    TransactionStep::AwaitingCategory { amount_cents } => {
                        TransactionStep::AwaitingDescription {
                            amount_cents: *amount_cents,
                            category: validate_category(input).map_err(InputError::Category)?,
                        }
                    }
                    TransactionStep::AwaitingDescription {
                        amount_cents,
                        category,
                    } => TransactionStep::Ready(TransactionDraft {
                        kind: *kind,
                        amount_cents: *amount_cents,
                        category: category.clone(),
                        description: parse_optional_text(input),
                    }),
                    TransactionStep::Ready(_) => return Err(InputError::AwaitingCommit),
                };
                *step = next;
            }
            Flow::Goal(step) => {
                let next = match step {
                    GoalStep::AwaitingTitle => GoalStep::AwaitingTarget {
                        title: parse_title(input)?,
                    },
                    GoalStep::AwaitingTarget { title } => GoalStep::AwaitingDate {
                        title: title.clone(),
                        target_cents: parse_amount(input)?,
                    },
                    GoalStep::AwaitingDate {
                        title,
                        target_cents,
                    } => GoalStep::Ready(GoalDraft {
                        title: title.clone(),
                        target_cents: *target_cents,
                        target_date: parse_target_date(input, today)?,
                    }),
                    GoalStep::Ready(_) => return Err(InputError::AwaitingCommit),
                };
                *step = next;
            }
        }
        Ok(())
    }
}

/// Positive amount within the storage ceiling; `,` works as decimal separator.
pub fn parse_amount(input: &str) -> Result<Cents, InputError> {
    let cents = parse_cents(input).map_err(InputError::Amount)?;
    validate_amount(cents).map_err(InputError::AmountRange)?;
    Ok(cents)
}

pub fn parse_title(input: &str) -> Result<String, InputError> {
    let title = input.trim();
    if title.chars().count() < MIN_GOAL_TITLE_LEN {
        return Err(InputError::TitleTooShort);
    }
    Ok(title.to_string())
}

/// `-` skips the deadline; otherwise `DD.MM.YYYY` strictly after `today`.
pub fn parse_target_date(input: &str, today: NaiveDate) -> Result<Option<NaiveDate>, InputError> {
    let input = input.trim();
    if input == SKIP {
        return Ok(None);
    }
    let date = NaiveDate::parse_from_str(input, TARGET_DATE_FORMAT)
        .map_err(|_| InputError::DateFormat)?;
    if date <= today {
        return Err(InputError::DateNotInFuture);
    }
    Ok(Some(date))
}

fn parse_optional_text(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() || input == SKIP {
        None
    } else {
        Some(input.to_string())
    }
}

/// A rejected answer; the question is asked again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    Amount(ParseCentsError),
    AmountRange(AmountError),
    Category(FieldError),
    TitleTooShort,
    DateFormat,
    DateNotInFuture,
    AwaitingCommit,
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Amount(err) => write!(f, "Invalid amount ({}). Enter a number, e.g. 5000 or 12,50", err),
            InputError::AmountRange(err) => write!(f, "Invalid amount: {}", err),
            InputError::Category(err) => write!(f, "Invalid category: {}", err),
            InputError::TitleTooShort => write!(
                f,
                "Title is too short, use at least {} characters",
                MIN_GOAL_TITLE_LEN
            ),
            InputError::DateFormat => {
                write!(f, "Invalid date. Use DD.MM.YYYY (e.g. 31.12.2026) or '-' to skip")
            }
            InputError::DateNotInFuture => write!(f, "The deadline must be in the future"),
            InputError::AwaitingCommit => {
                write!(f, "Everything is filled in. Send /retry to save or /cancel to discard")
            }
        }
    }
}

impl std::error::Error for InputError {}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prompt::Amount(TransactionKind::Income) => write!(f, "Enter the income amount (e.g. 5000):"),
            Prompt::Amount(_) => write!(f, "Enter the expense amount (e.g. 1500):"),
            Prompt::Category(kind) => {
                let suggestions = match kind {
                    TransactionKind::Income => INCOME_CATEGORIES,
                    _ => EXPENSE_CATEGORIES,
                };
                write!(f, "Choose a category ({}):", suggestions.join(", "))
            }
            Prompt::Description => write!(f, "Enter a description (or '-' to skip):"),
            Prompt::GoalTitle => write!(f, "Enter the goal title (e.g. New bike):"),
            Prompt::GoalTarget => write!(f, "Enter the target amount (e.g. 150000):"),
            Prompt::GoalDate => write!(
                f,
                "Enter a deadline as DD.MM.YYYY (e.g. 31.12.2026) or '-' to skip:"
            ),
            Prompt::Retry => write!(f, "Send /retry to try saving again or /cancel to discard."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    #[test]
    fn test_transaction_flow_happy_path() {
        let mut flow = Flow::transaction(TransactionKind::Expense);
        assert_eq!(flow.prompt(), Prompt::Amount(TransactionKind::Expense));

        flow.accept("1500,50", today()).unwrap();
        assert_eq!(flow.prompt(), Prompt::Category(TransactionKind::Expense));

        flow.accept("  Groceries ", today()).unwrap();
        assert_eq!(flow.prompt(), Prompt::Description);

        flow.accept("-", today()).unwrap();
        assert_eq!(
            flow.draft(),
            Some(Draft::Transaction(TransactionDraft {
                kind: TransactionKind::Expense,
                amount_cents: 150050,
                category: "Groceries".to_string(),
                description: None,
            }))
        );
    }

    #[test]
    fn test_invalid_amount_keeps_state() {
        let mut flow = Flow::transaction(TransactionKind::Income);
        let before = flow.clone();

        assert!(matches!(flow.accept("abc", today()), Err(InputError::Amount(_))));
        assert!(matches!(
            flow.accept("0", today()),
            Err(InputError::AmountRange(AmountError::NotPositive))
        ));
        assert!(matches!(
            flow.accept("-10", today()),
            Err(InputError::AmountRange(AmountError::NotPositive))
        ));
        assert!(matches!(
            flow.accept("10000000000000", today()),
            Err(InputError::AmountRange(AmountError::ExceedsCeiling))
        ));
        assert_eq!(flow, before);

        flow.accept("9999999999999.99", today()).unwrap();
        assert_eq!(
            flow,
            Flow::Transaction {
                kind: TransactionKind::Income,
                step: TransactionStep::AwaitingCategory {
                    amount_cents: 999_999_999_999_999
                },
            }
        );
    }

    #[test]
    fn test_invalid_category_keeps_amount() {
        let mut flow = Flow::transaction(TransactionKind::Expense);
        flow.accept("100", today()).unwrap();
        let before = flow.clone();

        assert!(flow.accept("   ", today()).is_err());
        assert!(flow.accept(&"x".repeat(101), today()).is_err());
        assert_eq!(flow, before);
    }

    #[test]
    fn test_goal_flow_with_deadline() {
        let mut flow = Flow::goal();
        assert_eq!(
            flow.accept("PC", today()),
            Err(InputError::TitleTooShort)
        );
        flow.accept("New bike", today()).unwrap();
        flow.accept("150000", today()).unwrap();

        assert_eq!(flow.accept("15.03.2026", today()), Err(InputError::DateNotInFuture));
        assert_eq!(flow.accept("2026-12-31", today()), Err(InputError::DateFormat));
        assert_eq!(flow.prompt(), Prompt::GoalDate);

        flow.accept("16.03.2026", today()).unwrap();
        assert_eq!(
            flow.draft(),
            Some(Draft::Goal(GoalDraft {
                title: "New bike".to_string(),
                target_cents: 15_000_000,
                target_date: NaiveDate::from_ymd_opt(2026, 3, 16),
            }))
        );
    }

    #[test]
    fn test_goal_deadline_skip() {
        assert_eq!(parse_target_date("-", today()), Ok(None));
    }

    #[test]
    fn test_ready_flow_rejects_more_input() {
        let mut flow = Flow::goal();
        flow.accept("Vacation", today()).unwrap();
        flow.accept("500", today()).unwrap();
        flow.accept("-", today()).unwrap();
        assert!(flow.is_ready());
        assert_eq!(flow.accept("more", today()), Err(InputError::AwaitingCommit));
        assert_eq!(flow.prompt(), Prompt::Retry);
    }
}
