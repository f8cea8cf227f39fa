//! SQLite persistence provider.
//!
//! A [`Provider`] owns one connection, the mapper and the retry policy for
//! a single entity type. Versioned writes read the current max-version row
//! and apply their change inside one immediate transaction; every mutation
//! appends an audit record in that same transaction.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

use crate::caller::CallerInfo;
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::error::{Result, StrataError, constraint_name};
use crate::mapper::{Entity, Mapper, SelectOptions, dml};
use crate::predicate::Predicate;
use crate::provider::audit;
use crate::retry::RetryPolicy;
use crate::schema::{
    ABSOLUTE_EXPIRATION, CREATED_TIME, IS_DELETED, LAST_WRITE_TIME, TableSchema, VERSION,
};
use crate::value::{Parameters, Value, bind};

/// Default rows per batch for bulk creates.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Provider lifecycle. Only `Ready` accepts data operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Uninitialized,
    Initializing,
    Ready,
    Disposing,
    Disposed,
}

impl ProviderState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Initializing => "Initializing",
            Self::Ready => "Ready",
            Self::Disposing => "Disposing",
            Self::Disposed => "Disposed",
        }
    }
}

/// Read options for single-entity fetches.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Return the latest row even when the chain is tombstoned.
    pub include_deleted: bool,
}

/// What a purge removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeMode {
    /// Rows whose `AbsoluteExpiration` has passed.
    Expired,
    /// Rows matched by the supplied predicate.
    ByPredicate,
}

/// Purge behavior switches.
#[derive(Debug, Clone, Copy)]
pub struct PurgeOptions {
    pub mode: PurgeMode,
    /// Count matching rows without deleting them.
    pub preview: bool,
    /// Run VACUUM after a non-preview purge.
    pub vacuum: bool,
}

impl Default for PurgeOptions {
    fn default() -> Self {
        Self {
            mode: PurgeMode::Expired,
            preview: false,
            vacuum: false,
        }
    }
}

/// SQLite-backed persistence provider for one entity type.
#[derive(Debug)]
pub struct Provider<E: Entity> {
    conn: Connection,
    mapper: Mapper<E>,
    retry: RetryPolicy,
    config: EngineConfig,
    cancellation: CancellationToken,
    state: ProviderState,
    db_key: String,
}

impl<E: Entity> Provider<E> {
    /// Open a provider over the database file at `path`.
    ///
    /// The provider starts `Uninitialized`; call [`Self::initialize`]
    /// before any data operation.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid or the file
    /// cannot be opened.
    pub fn open(path: &Path, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let conn = Connection::open(path)?;
        let db_key = path.to_string_lossy().into_owned();
        Self::from_connection(conn, config, db_key)
    }

    /// Open a provider over a fresh in-memory database (tests, scratch).
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid.
    pub fn open_memory(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, config, ":memory:".to_string())
    }

    fn from_connection(conn: Connection, config: EngineConfig, db_key: String) -> Result<Self> {
        let retry = RetryPolicy::new(config.retry.clone())?;
        Ok(Self {
            conn,
            mapper: Mapper::new(),
            retry,
            config,
            cancellation: CancellationToken::new(),
            state: ProviderState::Uninitialized,
            db_key,
        })
    }

    #[must_use]
    pub const fn state(&self) -> ProviderState {
        self.state
    }

    #[must_use]
    pub fn mapper(&self) -> &Mapper<E> {
        &self.mapper
    }

    /// Bind a cancellation token observed by every subsequent operation.
    pub fn bind_cancellation(&mut self, token: CancellationToken) {
        self.cancellation = token;
    }

    /// Apply PRAGMAs, create the table, its indexes and the shared audit
    /// table. Idempotent: a `Ready` provider returns immediately.
    ///
    /// # Errors
    ///
    /// `Misconfiguration` after dispose; otherwise driver errors.
    pub fn initialize(&mut self) -> Result<()> {
        match self.state {
            ProviderState::Ready => return Ok(()),
            ProviderState::Disposing | ProviderState::Disposed => {
                return Err(StrataError::NotReady {
                    state: self.state.as_str(),
                });
            }
            ProviderState::Uninitialized | ProviderState::Initializing => {}
        }
        self.state = ProviderState::Initializing;

        // Database-level PRAGMAs; page_size only takes effect before the
        // first table is written.
        self.conn
            .pragma_update(None, "page_size", self.config.database.page_size)?;
        self.conn.pragma_update(
            None,
            "journal_mode",
            self.config.database.journal_mode.as_str(),
        )?;

        // Connection-level PRAGMAs, re-applied for every new connection.
        self.conn
            .pragma_update(None, "cache_size", self.config.connection.cache_size)?;
        self.conn.pragma_update(
            None,
            "synchronous",
            self.config.connection.synchronous.as_str(),
        )?;
        self.conn.busy_timeout(std::time::Duration::from_millis(
            self.config.connection.busy_timeout_ms,
        ))?;
        self.conn.pragma_update(
            None,
            "foreign_keys",
            if self.config.connection.enable_foreign_keys {
                "ON"
            } else {
                "OFF"
            },
        )?;

        self.conn
            .execute_batch(&self.mapper.create_table_sql(true))?;
        for statement in self.mapper.create_index_sql() {
            self.conn.execute_batch(&statement)?;
        }
        audit::ensure_audit_table(&self.conn, &self.db_key)?;

        self.state = ProviderState::Ready;
        debug!(
            table = self.mapper.schema().table_name(),
            db = %self.db_key,
            "provider initialized"
        );
        Ok(())
    }

    /// Dispose the provider. Further operations fail with
    /// `Misconfiguration`; disposal is idempotent.
    pub fn dispose(&mut self) {
        if self.state == ProviderState::Disposed {
            return;
        }
        self.state = ProviderState::Disposing;
        // Best-effort maintenance before the handle goes away.
        let _ = self.conn.execute_batch("PRAGMA optimize");
        self.state = ProviderState::Disposed;
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state == ProviderState::Ready {
            Ok(())
        } else {
            Err(StrataError::NotReady {
                state: self.state.as_str(),
            })
        }
    }

    // ── writes ─────────────────────────────────────────────────

    /// Insert a new entity.
    ///
    /// Assigns `Version = 1`, `CreatedTime = LastWriteTime = now`, clears
    /// the tombstone flag, and stamps `AbsoluteExpiration` from the
    /// schema's expiry span when unset. Returns the stored entity.
    ///
    /// # Errors
    ///
    /// `EntityAlreadyExists` when the key is taken; `InvalidArgument` when
    /// the key is unset.
    pub fn create(&mut self, entity: &E, caller: &CallerInfo) -> Result<E> {
        self.ensure_ready()?;
        let now = Utc::now();
        let stored = prepare_for_insert(&self.mapper, entity, now)?;
        let key = self.mapper.key_of(&stored)?;

        let retry = self.retry.clone();
        let cancel = self.cancellation.clone();
        let (conn, mapper) = (&mut self.conn, &self.mapper);
        retry.execute(&cancel, || {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            execute_insert(&tx, mapper, &stored)?;
            audit::record(
                &tx,
                "create",
                mapper.schema().table_name(),
                Some(&display_key(&key)),
                caller,
            )?;
            tx.commit()?;
            Ok(())
        })?;

        debug!(
            table = self.mapper.schema().table_name(),
            key = %display_key(&key),
            correlation = %caller.correlation_id,
            "created entity"
        );
        Ok(stored)
    }

    /// Insert a batch of entities, `batch_size` rows per transaction
    /// (default 500). Each batch commits or rolls back as a unit; a failure
    /// aborts that batch and surfaces, leaving earlier batches committed.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::create`].
    pub fn create_many(
        &mut self,
        entities: &[E],
        caller: &CallerInfo,
        batch_size: Option<usize>,
    ) -> Result<()> {
        self.ensure_ready()?;
        if entities.is_empty() {
            return Ok(());
        }
        let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1);

        for chunk in entities.chunks(batch_size) {
            // One timestamp per batch: every row shares it.
            let now = Utc::now();
            let mut stored = Vec::with_capacity(chunk.len());
            for entity in chunk {
                stored.push(prepare_for_insert(&self.mapper, entity, now)?);
            }
            let sql = self.mapper.batch_insert_sql(stored.len());
            let params = self.mapper.batch_parameters(&stored)?;

            let retry = self.retry.clone();
            let cancel = self.cancellation.clone();
            let (conn, mapper) = (&mut self.conn, &self.mapper);
            retry.execute(&cancel, || {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(&sql, bind(&params).as_slice())
                    .map_err(map_insert_error)?;
                audit::record(
                    &tx,
                    "create_many",
                    mapper.schema().table_name(),
                    None,
                    caller,
                )?;
                tx.commit()?;
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Optimistic-concurrency update carrying the expected version in
    /// `entity.Version`. In-place UPDATE without soft-delete; a new
    /// max-version row under soft-delete. Returns the stored entity.
    ///
    /// # Errors
    ///
    /// `EntityNotFound` when no chain exists; `ConcurrencyConflict` on a
    /// stale version or a tombstoned chain.
    pub fn update(&mut self, entity: &E, caller: &CallerInfo) -> Result<E> {
        self.ensure_ready()?;
        let now = Utc::now();

        let retry = self.retry.clone();
        let cancel = self.cancellation.clone();
        let (conn, mapper) = (&mut self.conn, &self.mapper);
        let stored = retry.execute(&cancel, || {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let stored = update_in_tx(&tx, mapper, entity, now)?;
            let key = mapper.key_of(&stored)?;
            audit::record(
                &tx,
                "update",
                mapper.schema().table_name(),
                Some(&display_key(&key)),
                caller,
            )?;
            tx.commit()?;
            Ok(stored)
        })?;

        Ok(stored)
    }

    /// Idempotent delete by key: physical DELETE without soft-delete, a
    /// tombstone write under soft-delete. Absent or already-tombstoned
    /// chains are a no-op.
    ///
    /// # Errors
    ///
    /// Driver failures only; absence is not an error.
    pub fn delete(&mut self, id: &Value, caller: &CallerInfo) -> Result<()> {
        self.ensure_ready()?;
        let now = Utc::now();

        let retry = self.retry.clone();
        let cancel = self.cancellation.clone();
        let (conn, mapper) = (&mut self.conn, &self.mapper);
        let acted = retry.execute(&cancel, || {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let acted = delete_in_tx(&tx, mapper, id, now)?;
            if acted {
                audit::record(
                    &tx,
                    "delete",
                    mapper.schema().table_name(),
                    Some(&display_key(id)),
                    caller,
                )?;
            }
            tx.commit()?;
            Ok(acted)
        })?;

        debug!(
            table = self.mapper.schema().table_name(),
            key = %display_key(id),
            acted,
            correlation = %caller.correlation_id,
            "deleted entity"
        );
        Ok(())
    }

    // ── reads ──────────────────────────────────────────────────

    /// Latest non-deleted row for `id`, or `None`.
    ///
    /// # Errors
    ///
    /// Driver or conversion failures.
    pub fn get(&self, id: &Value, caller: &CallerInfo) -> Result<Option<E>> {
        self.get_with(id, caller, GetOptions::default())
    }

    /// Latest row for `id` honoring [`GetOptions`].
    ///
    /// # Errors
    ///
    /// Driver or conversion failures.
    pub fn get_with(
        &self,
        id: &Value,
        caller: &CallerInfo,
        options: GetOptions,
    ) -> Result<Option<E>> {
        self.ensure_ready()?;
        self.cancellation.checkpoint()?;
        debug!(
            table = self.mapper.schema().table_name(),
            key = %display_key(id),
            correlation = %caller.correlation_id,
            "get"
        );
        read_current(&self.conn, &self.mapper, id, options.include_deleted)
    }

    /// Every row of the key's version chain, oldest first.
    ///
    /// # Errors
    ///
    /// Driver or conversion failures.
    pub fn get_all_versions(&self, id: &Value, caller: &CallerInfo) -> Result<Vec<E>> {
        self.ensure_ready()?;
        self.cancellation.checkpoint()?;
        debug!(
            table = self.mapper.schema().table_name(),
            key = %display_key(id),
            correlation = %caller.correlation_id,
            "get_all_versions"
        );
        let sql = self.mapper.select_versions_sql();
        let params = self.mapper.id_parameters(id)?;
        self.collect(&sql, &params)
    }

    /// Query the current view with an optional predicate, ordering and
    /// paging.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on an untranslatable predicate; driver failures.
    pub fn query(
        &self,
        predicate: Option<&Predicate>,
        options: &SelectOptions,
        caller: &CallerInfo,
    ) -> Result<Vec<E>> {
        self.ensure_ready()?;
        self.cancellation.checkpoint()?;
        let (sql, params) = self.mapper.select_sql(predicate, options)?;
        debug!(
            table = self.mapper.schema().table_name(),
            correlation = %caller.correlation_id,
            sql = %sql,
            "query"
        );
        self.collect(&sql, &params)
    }

    /// Every current entity.
    ///
    /// # Errors
    ///
    /// Driver or conversion failures.
    pub fn get_all(&self, caller: &CallerInfo) -> Result<Vec<E>> {
        self.query(None, &SelectOptions::default(), caller)
    }

    /// Count rows in the current view matching `predicate` (all rows when
    /// `None`).
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on an untranslatable predicate; driver failures.
    pub fn count(&self, predicate: Option<&Predicate>) -> Result<i64> {
        self.ensure_ready()?;
        self.cancellation.checkpoint()?;
        let (sql, params) = self.mapper.count_sql(predicate, false)?;
        let count = self
            .conn
            .query_row(&sql, bind(&params).as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// True when at least one current row matches.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::count`].
    pub fn exists(&self, predicate: &Predicate) -> Result<bool> {
        Ok(self.count(Some(predicate))? > 0)
    }

    /// Physically remove expired or predicate-selected rows. Preview mode
    /// returns the projected count without deleting; otherwise returns the
    /// number of rows removed and optionally VACUUMs.
    ///
    /// # Errors
    ///
    /// `Misconfiguration` for `Expired` mode on a schema without expiry;
    /// `InvalidArgument` for `ByPredicate` without a predicate.
    pub fn purge(
        &mut self,
        predicate: Option<&Predicate>,
        options: &PurgeOptions,
        caller: &CallerInfo,
    ) -> Result<u64> {
        self.ensure_ready()?;
        let schema = self.mapper.schema();

        let (sql, params) = match options.mode {
            PurgeMode::Expired => {
                if schema.expiry().is_none() {
                    return Err(StrataError::Misconfiguration {
                        entity: schema.table_name().to_string(),
                        reason: "purge of expired rows requires an expiry span".to_string(),
                    });
                }
                let sql = dml::purge_expired_sql(schema, options.preview);
                let params = vec![(
                    format!("@{ABSOLUTE_EXPIRATION}"),
                    Value::DateTime(Utc::now()),
                )];
                (sql, params)
            }
            PurgeMode::ByPredicate => {
                if predicate.is_none() {
                    return Err(StrataError::InvalidArgument(
                        "purge by predicate requires a predicate".to_string(),
                    ));
                }
                dml::purge_predicate_sql(schema, predicate, options.preview)?
            }
        };

        if options.preview {
            let projected: i64 = self
                .conn
                .query_row(&sql, bind(&params).as_slice(), |row| row.get(0))?;
            return Ok(u64::try_from(projected).unwrap_or(0));
        }

        let retry = self.retry.clone();
        let cancel = self.cancellation.clone();
        let (conn, mapper) = (&mut self.conn, &self.mapper);
        let removed = retry.execute(&cancel, || {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let removed = tx.execute(&sql, bind(&params).as_slice())?;
            audit::record(&tx, "purge", mapper.schema().table_name(), None, caller)?;
            tx.commit()?;
            Ok(u64::try_from(removed).unwrap_or(0))
        })?;

        if options.vacuum {
            self.conn.execute_batch("VACUUM")?;
        }
        Ok(removed)
    }

    /// Begin an ordered transactional batch borrowing this provider's
    /// connection. Dropping the scope without commit rolls back.
    ///
    /// # Errors
    ///
    /// `Misconfiguration` unless `Ready`; driver failures on BEGIN.
    pub fn begin_transaction(
        &mut self,
        caller: &CallerInfo,
    ) -> Result<super::transaction::TransactionScope<'_, E>> {
        self.ensure_ready()?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(super::transaction::TransactionScope::new(
            tx,
            &self.mapper,
            caller.clone(),
        ))
    }

    fn collect(&self, sql: &str, params: &Parameters) -> Result<Vec<E>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(bind(params).as_slice())?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(self.mapper.entity_from_row(row)?);
        }
        Ok(entities)
    }
}

// ── shared write helpers (also used by the transaction scope) ──

/// Read a lifecycle or data column off an entity by column name.
pub(super) fn field<E: Entity>(schema: &TableSchema, entity: &E, column: &str) -> Option<Value> {
    schema
        .column_by_name(column)
        .and_then(|c| entity.get(&c.property))
}

/// Write a column value onto an entity by column name, when mapped.
pub(super) fn set_column<E: Entity>(
    schema: &TableSchema,
    entity: &mut E,
    column: &str,
    value: Value,
) -> Result<()> {
    match schema.column_by_name(column) {
        Some(c) => entity.set(&c.property, value),
        None => Ok(()),
    }
}

/// Render a key value for error messages and audit rows.
pub(super) fn display_key(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        other => format!("{other:?}"),
    }
}

/// Clone the entity and assign the engine-managed create fields.
pub(super) fn prepare_for_insert<E: Entity>(
    mapper: &Mapper<E>,
    entity: &E,
    now: DateTime<Utc>,
) -> Result<E> {
    let schema = mapper.schema();
    mapper.key_of(entity)?;

    let mut stored = entity.clone();
    set_column(schema, &mut stored, VERSION, Value::Integer(1))?;
    set_column(schema, &mut stored, CREATED_TIME, Value::DateTime(now))?;
    set_column(schema, &mut stored, LAST_WRITE_TIME, Value::DateTime(now))?;
    if schema.soft_delete() {
        set_column(schema, &mut stored, IS_DELETED, Value::Bool(false))?;
    }
    if let Some(span) = schema.expiry() {
        let unset = field(schema, &stored, ABSOLUTE_EXPIRATION)
            .is_none_or(|v| v.is_null());
        if unset {
            let deadline = now
                + chrono::Duration::from_std(span).map_err(|e| {
                    StrataError::InvalidArgument(format!("expiry span out of range: {e}"))
                })?;
            set_column(
                schema,
                &mut stored,
                ABSOLUTE_EXPIRATION,
                Value::DateTime(deadline),
            )?;
        }
    }
    Ok(stored)
}

/// Execute the INSERT for a prepared entity, promoting key conflicts.
pub(super) fn execute_insert<E: Entity>(
    conn: &Connection,
    mapper: &Mapper<E>,
    stored: &E,
) -> Result<()> {
    let schema = mapper.schema();
    let params = mapper.entity_parameters(stored)?;
    let key = mapper.key_of(stored)?;
    conn.execute(&mapper.insert_sql(), bind(&params).as_slice())
        .map_err(|e| {
            // Key conflicts promote to EntityAlreadyExists; every other
            // constraint violation is DataIntegrity.
            let wrapped = StrataError::Database(e).into_create_conflict(
                schema.table_name(),
                &display_key(&key),
                &pk_reference(schema),
            );
            match wrapped {
                StrataError::Database(inner) => map_insert_error(inner),
                promoted => promoted,
            }
        })?;
    Ok(())
}

fn pk_reference(schema: &TableSchema) -> String {
    schema
        .declared_primary_key()
        .first()
        .map_or_else(String::new, |c| {
            format!("{}.{}", schema.table_name(), c.name)
        })
}

/// Wrap non-key constraint violations as `DataIntegrity` with the
/// constraint name when the driver reports one.
pub(super) fn map_insert_error(e: rusqlite::Error) -> StrataError {
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = &e {
        if ffi_err.code == rusqlite::ffi::ErrorCode::ConstraintViolation {
            return StrataError::DataIntegrity {
                detail: e.to_string(),
                constraint: constraint_name(&e),
            };
        }
    }
    StrataError::Database(e)
}

/// Fetch the current row for `id` (max version under soft-delete).
pub(super) fn read_current<E: Entity>(
    conn: &Connection,
    mapper: &Mapper<E>,
    id: &Value,
    include_deleted: bool,
) -> Result<Option<E>> {
    let sql = mapper.select_by_id_sql(include_deleted);
    let params = mapper.id_parameters(id)?;
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(bind(&params).as_slice())?;
    match rows.next()? {
        Some(row) => Ok(Some(mapper.entity_from_row(row)?)),
        None => Ok(None),
    }
}

/// Versioned update inside an open transaction.
pub(super) fn update_in_tx<E: Entity>(
    conn: &Connection,
    mapper: &Mapper<E>,
    entity: &E,
    now: DateTime<Utc>,
) -> Result<E> {
    let schema = mapper.schema();
    let key = mapper.key_of(entity)?;
    let expected = mapper.version_of(entity);

    if schema.soft_delete() {
        let current = read_current(conn, mapper, &key, true)?.ok_or_else(|| {
            StrataError::EntityNotFound {
                entity: schema.table_name().to_string(),
                key: display_key(&key),
            }
        })?;
        let current_version = mapper.version_of(&current);
        let tombstoned = field(schema, &current, IS_DELETED)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if tombstoned {
            return Err(StrataError::ConcurrencyConflict {
                entity: schema.table_name().to_string(),
                key: display_key(&key),
                detail: "the chain is tombstoned".to_string(),
            });
        }
        if current_version != expected {
            return Err(stale_version(schema, &key, expected, current_version));
        }

        let mut stored = entity.clone();
        set_column(schema, &mut stored, VERSION, Value::Integer(current_version + 1))?;
        set_column(schema, &mut stored, IS_DELETED, Value::Bool(false))?;
        set_column(schema, &mut stored, LAST_WRITE_TIME, Value::DateTime(now))?;
        // CreatedTime is never modified after create: carry the chain's.
        if let Some(created) = field(schema, &current, CREATED_TIME) {
            set_column(schema, &mut stored, CREATED_TIME, created)?;
        }
        execute_insert(conn, mapper, &stored)?;
        Ok(stored)
    } else {
        let mut stored = entity.clone();
        set_column(schema, &mut stored, LAST_WRITE_TIME, Value::DateTime(now))?;
        let params = mapper.update_parameters(&stored, expected)?;
        let affected = conn
            .execute(&mapper.update_sql(), bind(&params).as_slice())
            .map_err(map_insert_error)?;
        if affected == 0 {
            return Err(match read_current(conn, mapper, &key, true)? {
                Some(row) => stale_version(schema, &key, expected, mapper.version_of(&row)),
                None => StrataError::EntityNotFound {
                    entity: schema.table_name().to_string(),
                    key: display_key(&key),
                },
            });
        }
        set_column(schema, &mut stored, VERSION, Value::Integer(expected + 1))?;
        Ok(stored)
    }
}

fn stale_version(schema: &TableSchema, key: &Value, expected: i64, actual: i64) -> StrataError {
    StrataError::ConcurrencyConflict {
        entity: schema.table_name().to_string(),
        key: display_key(key),
        detail: format!("expected version {expected}, found {actual}"),
    }
}

/// Idempotent delete inside an open transaction; returns whether a row was
/// affected.
pub(super) fn delete_in_tx<E: Entity>(
    conn: &Connection,
    mapper: &Mapper<E>,
    id: &Value,
    now: DateTime<Utc>,
) -> Result<bool> {
    let schema = mapper.schema();
    if schema.soft_delete() {
        let Some(current) = read_current(conn, mapper, id, true)? else {
            return Ok(false);
        };
        let tombstoned = field(schema, &current, IS_DELETED)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if tombstoned {
            return Ok(false);
        }
        let version = mapper.version_of(&current);
        let mut params = mapper.id_parameters(id)?;
        params.push(("@NextVersion".to_string(), Value::Integer(version + 1)));
        params.push((format!("@{VERSION}"), Value::Integer(version)));
        params.push((format!("@{LAST_WRITE_TIME}"), Value::DateTime(now)));
        conn.execute(&mapper.delete_sql(), bind(&params).as_slice())?;
        Ok(true)
    } else {
        let params = mapper.id_parameters(id)?;
        let affected = conn.execute(&mapper.delete_sql(), bind(&params).as_slice())?;
        Ok(affected > 0)
    }
}

