//! Effective engine configuration.
//!
//! Database-level settings are applied once at initialization; connection
//! settings are re-applied to every new connection. Loading these values
//! from files is the embedding application's concern.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, StrataError};

/// SQLite journal mode applied at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalMode {
    Delete,
    #[default]
    Wal,
    Memory,
    Persist,
}

impl JournalMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Wal => "WAL",
            Self::Memory => "MEMORY",
            Self::Persist => "PERSIST",
        }
    }
}

/// SQLite synchronous level applied per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Synchronous {
    Off,
    #[default]
    Normal,
    Full,
}

impl Synchronous {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }
}

/// Database-level settings, applied once when the file is first opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub page_size: u32,
    pub journal_mode: JournalMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            journal_mode: JournalMode::default(),
        }
    }
}

/// Connection-level settings, re-applied on every new connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Negative values are KiB of page cache, SQLite convention.
    pub cache_size: i64,
    pub synchronous: Synchronous,
    pub busy_timeout_ms: u64,
    pub enable_foreign_keys: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            cache_size: -8000,
            synchronous: Synchronous::Normal,
            busy_timeout_ms: 5_000,
            enable_foreign_keys: true,
        }
    }
}

/// Retry policy settings for transient faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// A policy that executes exactly once.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns `Misconfiguration` when the multiplier is below 1 or the
    /// delay bounds are inverted.
    pub fn validate(&self) -> Result<()> {
        if self.backoff_multiplier < 1.0 {
            return Err(misconfigured(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(misconfigured(format!(
                "max_delay_ms ({}) must be >= initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }
        Ok(())
    }
}

/// The complete effective configuration consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub connection: ConnectionConfig,
    pub command_timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            connection: ConnectionConfig::default(),
            command_timeout_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Validate all nested settings.
    ///
    /// # Errors
    ///
    /// Returns `Misconfiguration` on any invalid value.
    pub fn validate(&self) -> Result<()> {
        if !self.database.page_size.is_power_of_two()
            || !(512..=65_536).contains(&self.database.page_size)
        {
            return Err(misconfigured(format!(
                "page_size must be a power of two in 512..=65536, got {}",
                self.database.page_size
            )));
        }
        self.retry.validate()
    }
}

fn misconfigured(reason: String) -> StrataError {
    StrataError::Misconfiguration {
        entity: "EngineConfig".to_string(),
        reason,
    }
}
