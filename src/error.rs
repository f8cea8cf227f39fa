//! Error types for the strata engine.
//!
//! Every public operation maps any failure it produces to exactly one
//! [`ErrorKind`]. Transient faults are handled locally by the retry policy;
//! all other kinds propagate immediately.

use thiserror::Error;

/// Result type alias for strata operations.
pub type Result<T> = std::result::Result<T, StrataError>;

/// Coarse error classification, one kind per operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing table or primary-key registration; invalid retry settings.
    Misconfiguration,
    /// Null/empty id, rejected predicate, bad caller input.
    InvalidArgument,
    /// Insert over an existing primary key.
    EntityAlreadyExists,
    /// Update/delete against a missing key.
    EntityNotFound,
    /// Stale version on a versioned write.
    ConcurrencyConflict,
    /// Non-PK uniqueness, check, or foreign-key violation; conversion failure.
    DataIntegrity,
    /// Recoverable busy/lock/IO/timeout fault.
    Transient,
    /// Cooperative cancellation.
    Cancelled,
    /// Anything else, carrying the driver's original error as a cause.
    Internal,
}

impl ErrorKind {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Misconfiguration => "MISCONFIGURATION",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::EntityAlreadyExists => "ENTITY_ALREADY_EXISTS",
            Self::EntityNotFound => "ENTITY_NOT_FOUND",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::DataIntegrity => "DATA_INTEGRITY",
            Self::Transient => "TRANSIENT",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL",
        }
    }
}

/// Errors produced by the strata engine.
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("schema misconfiguration for {entity}: {reason}")]
    Misconfiguration { entity: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{entity} with key '{key}' already exists")]
    EntityAlreadyExists { entity: String, key: String },

    #[error("{entity} with key '{key}' not found")]
    EntityNotFound { entity: String, key: String },

    #[error("concurrency conflict on {entity} '{key}': {detail}")]
    ConcurrencyConflict {
        entity: String,
        key: String,
        detail: String,
    },

    #[error("data integrity violation ({}): {detail}", constraint.as_deref().unwrap_or("unnamed constraint"))]
    DataIntegrity {
        detail: String,
        /// Constraint name, when the driver reports one.
        constraint: Option<String>,
    },

    #[error("cannot convert column '{column}' to {target}: {detail}")]
    Conversion {
        column: String,
        target: &'static str,
        detail: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("provider is {state}, expected Ready")]
    NotReady { state: &'static str },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl StrataError {
    /// Map this error to its single [`ErrorKind`].
    ///
    /// Driver errors are classified by the transient detector first, then by
    /// constraint-violation shape, falling back to `Internal`.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Misconfiguration { .. } | Self::NotReady { .. } => ErrorKind::Misconfiguration,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::EntityAlreadyExists { .. } => ErrorKind::EntityAlreadyExists,
            Self::EntityNotFound { .. } => ErrorKind::EntityNotFound,
            Self::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            Self::DataIntegrity { .. } | Self::Conversion { .. } => ErrorKind::DataIntegrity,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Database(e) => classify_database(e),
            Self::Io(_) => {
                if crate::retry::transient::classify(self).is_transient {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Internal
                }
            }
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the retry policy may re-execute the failed operation.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Promote a unique-constraint driver failure on the primary key into
    /// `EntityAlreadyExists`; leave every other error untouched.
    /// `pk_reference` is the driver's `Table.Column` spelling of the first
    /// key column, distinguishing PK conflicts from other unique indexes.
    #[must_use]
    pub fn into_create_conflict(self, entity: &str, key: &str, pk_reference: &str) -> Self {
        match &self {
            Self::Database(e) if is_primary_key_conflict(e, pk_reference) => {
                Self::EntityAlreadyExists {
                    entity: entity.to_string(),
                    key: key.to_string(),
                }
            }
            _ => self,
        }
    }
}

fn classify_database(e: &rusqlite::Error) -> ErrorKind {
    use rusqlite::ffi::ErrorCode;

    if let rusqlite::Error::SqliteFailure(ffi_err, msg) = e {
        if crate::retry::transient::transient_sqlite_code(ffi_err) {
            return ErrorKind::Transient;
        }
        if ffi_err.code == ErrorCode::ConstraintViolation {
            return ErrorKind::DataIntegrity;
        }
        if let Some(m) = msg {
            if crate::retry::transient::transient_message(m) {
                return ErrorKind::Transient;
            }
        }
    }
    ErrorKind::Internal
}

/// Extract the constraint name from a driver message like
/// `UNIQUE constraint failed: Users.Email`, when present.
#[must_use]
pub fn constraint_name(e: &rusqlite::Error) -> Option<String> {
    let msg = match e {
        rusqlite::Error::SqliteFailure(_, Some(m)) => m.as_str(),
        _ => return None,
    };
    let (_, rest) = msg.split_once("constraint failed: ")?;
    Some(rest.trim().to_string())
}

fn is_primary_key_conflict(e: &rusqlite::Error, pk_reference: &str) -> bool {
    use rusqlite::ffi::ErrorCode;
    match e {
        rusqlite::Error::SqliteFailure(ffi_err, msg) => {
            ffi_err.code == ErrorCode::ConstraintViolation
                && msg.as_deref().is_some_and(|m| {
                    (m.contains("UNIQUE constraint failed") && m.contains(pk_reference))
                        || m.contains("PRIMARY KEY")
                })
        }
        _ => false,
    }
}
