// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use moneta::application::{LedgerService, UserProfile};
use moneta::config::{LedgerOptions, StoreConfig};
use moneta::domain::{Account, UserKey};
use tempfile::TempDir;

pub const ALICE: UserKey = 1001;
pub const BOB: UserKey = 2002;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    test_service_with(LedgerOptions::default()).await
}

pub async fn test_service_with(options: LedgerOptions) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let config = StoreConfig::for_path(db_path.to_str().unwrap());
    let service = LedgerService::open(&config, options).await?;
    Ok((service, temp_dir))
}

/// Helper to create a service over the in-process store
pub fn memory_service() -> LedgerService {
    LedgerService::in_memory(LedgerOptions::default())
}

/// Provision a user with a display name
pub async fn register(service: &LedgerService, user: UserKey) -> Result<Account> {
    let (account, _) = service
        .register_user(UserProfile::new(user).with_display_name(format!("user-{}", user)))
        .await?;
    Ok(account)
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Helper to parse a date-time string (YYYY-MM-DD HH:MM:SS) into DateTime<Utc>
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .unwrap()
        .and_utc()
}
