use thiserror::Error;

use crate::domain::{AmountError, Cents, FieldError, GoalError, LedgerError, ParseCentsError, UserKey};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Cents, required: Cents },

    #[error("Account not found for user {0}")]
    AccountNotFound(UserKey),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Goal not found: {0}")]
    GoalNotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Write kept losing to concurrent updates after {attempts} attempts")]
    CommitConflict { attempts: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the failure came from the store rather than from the request.
    pub fn is_storage(&self) -> bool {
        matches!(self, AppError::Storage(_) | AppError::CommitConflict { .. })
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds { balance, required } => {
                AppError::InsufficientFunds { balance, required }
            }
            LedgerError::Overflow => AppError::InvalidAmount(err.to_string()),
        }
    }
}

impl From<AmountError> for AppError {
    fn from(err: AmountError) -> Self {
        AppError::InvalidAmount(err.to_string())
    }
}

impl From<ParseCentsError> for AppError {
    fn from(err: ParseCentsError) -> Self {
        AppError::InvalidAmount(err.to_string())
    }
}

impl From<FieldError> for AppError {
    fn from(err: FieldError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<GoalError> for AppError {
    fn from(err: GoalError) -> Self {
        AppError::Validation(err.to_string())
    }
}
