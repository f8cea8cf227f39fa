//! Transient-fault retry policy.
//!
//! # Submodules
//!
//! - [`transient`] - classification of faults as transient vs. permanent

pub mod transient;

pub use transient::Classification;

use std::time::Duration;

use rand::Rng;

use crate::cancel::CancellationToken;
use crate::config::RetryConfig;
use crate::error::{Result, StrataError};

/// Executes fallible operations with exponential backoff on transient
/// faults. A disabled policy (or `max_attempts == 0`) executes exactly once.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Build a policy from validated settings.
    ///
    /// # Errors
    ///
    /// Returns `Misconfiguration` when the settings are invalid.
    pub fn new(config: RetryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// A policy that runs every operation exactly once.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            config: RetryConfig::disabled(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, retrying transient failures with backoff.
    ///
    /// The sleep between attempts is
    /// `min(max_delay, initial_delay * backoff^attempt)` plus a small
    /// random jitter, and is interrupted immediately by `cancel`
    /// (wake-to-cancel). Exhaustion surfaces the last underlying error.
    ///
    /// # Errors
    ///
    /// The operation's error, `Cancelled` when the token fires first.
    pub fn execute<T, F>(&self, cancel: &CancellationToken, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        if !self.config.enabled || self.config.max_attempts == 0 {
            return operation();
        }

        let mut attempt: u32 = 0;
        loop {
            cancel.checkpoint()?;
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    let verdict = transient::classify(&error);
                    if !verdict.is_transient || attempt >= self.config.max_attempts {
                        return Err(error);
                    }
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        cause = %verdict.description,
                        "transient database fault, retrying"
                    );
                    if cancel.wait(delay) {
                        return Err(StrataError::Cancelled);
                    }
                }
            }
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let nominal = (self.config.initial_delay_ms as f64)
            * self.config.backoff_multiplier.powi(exponent);
        let capped = nominal.min(self.config.max_delay_ms as f64);
        let jitter = rand::rng().random_range(1.0..1.2);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis((capped * jitter) as u64)
    }
}
