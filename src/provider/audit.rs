//! Shared audit-record table.
//!
//! Every mutation writes one audit row inside the same transaction as the
//! data change, carrying the caller's user and correlation ids. The table
//! is shared across entity types; its first creation is serialized by a
//! process-wide mutex and memoized per database file.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::Utc;
use once_cell::sync::Lazy;
use rusqlite::Connection;

use crate::caller::CallerInfo;
use crate::error::Result;

/// Audit table name, shared by all providers on a database.
pub const AUDIT_TABLE: &str = "AuditRecords";

const AUDIT_SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS AuditRecords (
        Id INTEGER PRIMARY KEY AUTOINCREMENT,
        Operation TEXT NOT NULL,
        EntityType TEXT NOT NULL,
        EntityKey TEXT,
        UserId TEXT NOT NULL DEFAULT '',
        CorrelationId TEXT NOT NULL DEFAULT '',
        Source TEXT,
        CreatedTime DATETIME NOT NULL
    );
    CREATE INDEX IF NOT EXISTS IX_AuditRecords_EntityType ON AuditRecords(EntityType);
    CREATE INDEX IF NOT EXISTS IX_AuditRecords_CreatedTime ON AuditRecords(CreatedTime);
";

/// Database files whose audit table has already been created this process.
static CREATED: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Create the audit table once per database.
///
/// The mutex serializes the first create across providers; subsequent calls
/// for the same file are no-ops. In-memory databases are never memoized,
/// each one is a fresh database.
///
/// # Errors
///
/// Returns an error when the DDL fails.
pub fn ensure_audit_table(conn: &Connection, db_key: &str) -> Result<()> {
    let mut created = CREATED.lock().expect("audit init lock poisoned");
    let memoizable = !db_key.is_empty() && db_key != ":memory:";
    if memoizable && created.contains(db_key) {
        return Ok(());
    }
    conn.execute_batch(AUDIT_SCHEMA_SQL)?;
    if memoizable {
        created.insert(db_key.to_string());
    }
    Ok(())
}

/// Append one audit row. Call inside the mutation's transaction so the
/// record commits or rolls back with the data change.
///
/// # Errors
///
/// Returns an error when the insert fails.
pub fn record(
    conn: &Connection,
    operation: &str,
    entity_type: &str,
    entity_key: Option<&str>,
    caller: &CallerInfo,
) -> Result<()> {
    conn.execute(
        "INSERT INTO AuditRecords (Operation, EntityType, EntityKey, UserId, CorrelationId, Source, CreatedTime)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            operation,
            entity_type,
            entity_key,
            caller.user_id,
            caller.correlation_id,
            caller.source,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}
