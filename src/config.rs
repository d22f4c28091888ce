//! Runtime configuration.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::DeletionPolicy;

/// Everything the binary needs to start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ledger: LedgerOptions,
    /// Tracing filter directive for the crate (e.g. `info`, `debug`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite connection URL.
    pub database_url: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    /// Configuration for a database file on disk.
    pub fn for_path(path: &str) -> Self {
        Self {
            database_url: format!("sqlite:{}", path),
            ..Self::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: format!("sqlite:{}", DEFAULT_DATABASE_PATH),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Behaviour knobs of the ledger engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerOptions {
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
    /// Lost races tolerated per write before giving up.
    #[serde(
        default = "default_commit_attempts",
        deserialize_with = "deserialize_commit_attempts"
    )]
    pub commit_attempts: u32,
    /// Currency assigned to newly provisioned accounts.
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            deletion_policy: DeletionPolicy::default(),
            commit_attempts: default_commit_attempts(),
            default_currency: default_currency(),
        }
    }
}

impl LedgerOptions {
    pub fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = policy;
        self
    }

    pub fn with_commit_attempts(mut self, attempts: u32) -> Self {
        self.commit_attempts = attempts.max(1);
        self
    }
}

pub const DEFAULT_DATABASE_PATH: &str = "moneta.db";

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_commit_attempts() -> u32 {
    32
}

/// Every write needs at least one attempt.
fn deserialize_commit_attempts<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(u32::deserialize(deserializer)?.max(1))
}

fn default_currency() -> String {
    "RUB".to_string()
}
