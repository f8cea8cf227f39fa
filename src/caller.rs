//! Caller context threaded through every data operation.

use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};

static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Ambient context (user id, correlation id, call site) passed through data
/// operations for audit records and tracing spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerInfo {
    pub correlation_id: String,
    pub user_id: String,
    /// `file:line` of the call site, captured automatically.
    pub source: Option<String>,
}

impl CallerInfo {
    /// Build caller info for `user_id` with a fresh process-local
    /// correlation id and the call site captured via `#[track_caller]`.
    #[must_use]
    #[track_caller]
    pub fn new(user_id: &str) -> Self {
        let loc = Location::caller();
        Self {
            correlation_id: next_correlation_id(),
            user_id: user_id.to_string(),
            source: Some(format!("{}:{}", loc.file(), loc.line())),
        }
    }

    /// Build caller info with an externally supplied correlation id
    /// (e.g. one propagated from an upstream request).
    #[must_use]
    pub fn with_correlation(user_id: &str, correlation_id: &str) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            user_id: user_id.to_string(),
            source: None,
        }
    }
}

impl Default for CallerInfo {
    fn default() -> Self {
        Self::new("anonymous")
    }
}

fn next_correlation_id() -> String {
    let n = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("c-{n:08}")
}
