//! Transient-fault classification.
//!
//! Classifies a caught error by SQLite error-code family, message
//! heuristics, IO kind, and nested causes. Transient faults are retried by
//! the policy; everything else propagates immediately.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use rusqlite::ffi::ErrorCode;

use crate::error::StrataError;

/// The detector's verdict and a human description for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub is_transient: bool,
    pub description: String,
}

impl Classification {
    fn transient(description: impl Into<String>) -> Self {
        Self {
            is_transient: true,
            description: description.into(),
        }
    }

    fn permanent(description: impl Into<String>) -> Self {
        Self {
            is_transient: false,
            description: description.into(),
        }
    }
}

/// Message substrings that indicate a recoverable fault, matched
/// case-insensitively against the whole error text.
static TRANSIENT_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(
        "database is locked\
         |table is locked\
         |unable to open database\
         |disk i/o error\
         |connection was (closed|lost)\
         |temporarily (locked|unavailable)\
         |deadlock\
         |busy\
         |timeout\
         |timed out\
         |network path\
         |being used by another process\
         |sharing violation\
         |lock violation\
         |insufficient system resources\
         |semaphore timeout",
    )
    .case_insensitive(true)
    .build()
    .expect("transient pattern set compiles")
});

/// True when an error message matches a transient phrase.
#[must_use]
pub fn transient_message(message: &str) -> bool {
    TRANSIENT_MESSAGE.is_match(message)
}

/// True for the SQLite code families that resolve on retry: BUSY, LOCKED,
/// IOERR (every extended sub-code, `base | (subcode << 8)`), CANTOPEN and
/// PROTOCOL. The primary code already folds the compound forms
/// (BUSY_RECOVERY, BUSY_SNAPSHOT, LOCKED_SHAREDCACHE).
#[must_use]
pub fn transient_sqlite_code(error: &rusqlite::ffi::Error) -> bool {
    matches!(
        error.code,
        ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure
            | ErrorCode::CannotOpen
            | ErrorCode::FileLockingProtocolFailed
    )
}

/// Classify an engine error, recursing into nested causes: an error whose
/// cause is transient is itself transient. Cancellation never retries.
#[must_use]
pub fn classify(error: &StrataError) -> Classification {
    match error {
        StrataError::Cancelled => Classification::permanent("operation was cancelled"),
        StrataError::Database(db) => classify_database(db),
        StrataError::Io(io) => classify_io(io),
        other => {
            let text = other.to_string();
            if transient_message(&text) {
                Classification::transient(text)
            } else if let Some(cause) = std::error::Error::source(other) {
                classify_cause(cause, &text)
            } else {
                Classification::permanent(text)
            }
        }
    }
}

fn classify_database(error: &rusqlite::Error) -> Classification {
    if let rusqlite::Error::SqliteFailure(ffi_err, message) = error {
        if transient_sqlite_code(ffi_err) {
            return Classification::transient(format!(
                "sqlite code {} ({})",
                ffi_err.extended_code,
                message.as_deref().unwrap_or("no message")
            ));
        }
        if let Some(message) = message {
            if transient_message(message) {
                return Classification::transient(message.clone());
            }
        }
        return Classification::permanent(format!(
            "sqlite code {} ({})",
            ffi_err.extended_code,
            message.as_deref().unwrap_or("no message")
        ));
    }

    let text = error.to_string();
    if transient_message(&text) {
        Classification::transient(text)
    } else if let Some(cause) = std::error::Error::source(error) {
        classify_cause(cause, &text)
    } else {
        Classification::permanent(text)
    }
}

fn classify_io(error: &std::io::Error) -> Classification {
    use std::io::ErrorKind;

    let text = error.to_string();
    if matches!(
        error.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    ) || transient_message(&text)
    {
        Classification::transient(text)
    } else {
        Classification::permanent(text)
    }
}

fn classify_cause(cause: &(dyn std::error::Error + 'static), outer: &str) -> Classification {
    let mut current = Some(cause);
    while let Some(err) = current {
        if transient_message(&err.to_string()) {
            return Classification::transient(format!("{outer}: {err}"));
        }
        current = err.source();
    }
    Classification::permanent(outer.to_string())
}
