//! Entity mapper: SQL generation plus entity↔driver value translation.
//!
//! # Submodules
//!
//! - [`ddl`] - CREATE TABLE / CREATE INDEX generation
//! - [`dml`] - parameterized INSERT/UPDATE/DELETE/SELECT generation
//!
//! Rust has no runtime attribute reflection, so entity types register a
//! [`TableSchema`] once (typically in a `OnceLock`) and expose their fields
//! through the property-bag [`Entity`] trait; the mapper needs nothing else.

pub mod ddl;
pub mod dml;

pub use dml::SelectOptions;

use std::marker::PhantomData;

use crate::error::{Result, StrataError};
use crate::predicate::Predicate;
use crate::schema::{ColumnMapping, SqlType, TableSchema, VERSION};
use crate::value::{Parameters, Value};

/// A persistable entity.
///
/// `get`/`set` address fields by property name. A type must model every
/// column its schema declares, including the engine-managed lifecycle
/// columns (`Version`, `CreatedTime`, `LastWriteTime`, and `IsDeleted`
/// under soft-delete): the engine assigns them through `set` before a
/// write and reads them back through `get`. Unknown properties are
/// ignored by `set` and map to SQL NULL from `get`.
pub trait Entity: Clone {
    /// The registered schema. Must return the same value on every call.
    fn schema() -> &'static TableSchema;

    /// Read a property by name.
    fn get(&self, property: &str) -> Option<Value>;

    /// Write a property by name.
    ///
    /// # Errors
    ///
    /// Returns an error when the value cannot be represented in the field.
    fn set(&mut self, property: &str, value: Value) -> Result<()>;

    /// Blank instance populated via `set` during row mapping.
    fn empty() -> Self;
}

/// Translates between entities and driver parameters/rows and generates the
/// SQL for one entity type.
#[derive(Debug)]
pub struct Mapper<E: Entity> {
    schema: &'static TableSchema,
    _entity: PhantomData<E>,
}

impl<E: Entity> Default for Mapper<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Mapper<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            schema: E::schema(),
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &'static TableSchema {
        self.schema
    }

    // ── SQL generation ─────────────────────────────────────────

    #[must_use]
    pub fn create_table_sql(&self, if_not_exists: bool) -> String {
        ddl::create_table_sql(self.schema, if_not_exists)
    }

    #[must_use]
    pub fn create_index_sql(&self) -> Vec<String> {
        ddl::create_index_sql(self.schema)
    }

    #[must_use]
    pub fn insert_sql(&self) -> String {
        dml::insert_sql(self.schema)
    }

    #[must_use]
    pub fn batch_insert_sql(&self, rows: usize) -> String {
        dml::batch_insert_sql(self.schema, rows)
    }

    #[must_use]
    pub fn update_sql(&self) -> String {
        dml::update_sql(self.schema)
    }

    #[must_use]
    pub fn delete_sql(&self) -> String {
        dml::delete_sql(self.schema)
    }

    #[must_use]
    pub fn select_by_id_sql(&self, include_deleted: bool) -> String {
        dml::select_by_id_sql(self.schema, include_deleted)
    }

    #[must_use]
    pub fn select_versions_sql(&self) -> String {
        dml::select_versions_sql(self.schema)
    }

    /// List-shaped SELECT.
    ///
    /// # Errors
    ///
    /// Propagates predicate translation failures.
    pub fn select_sql(
        &self,
        predicate: Option<&Predicate>,
        options: &SelectOptions,
    ) -> Result<(String, Parameters)> {
        dml::select_sql(self.schema, predicate, options)
    }

    /// SELECT of every current row.
    ///
    /// # Errors
    ///
    /// Propagates predicate translation failures.
    pub fn select_all_sql(&self) -> Result<String> {
        dml::select_all_sql(self.schema)
    }

    /// COUNT over the current view.
    ///
    /// # Errors
    ///
    /// Propagates predicate translation failures.
    pub fn count_sql(
        &self,
        predicate: Option<&Predicate>,
        include_all_versions: bool,
    ) -> Result<(String, Parameters)> {
        dml::count_sql(self.schema, predicate, include_all_versions)
    }

    // ── value mapping ──────────────────────────────────────────

    /// Map an entity to its `@ColName` parameter dictionary, one entry per
    /// insertable column in declared order.
    ///
    /// # Errors
    ///
    /// Returns `DataIntegrity`/`Conversion` when a value does not fit its
    /// column (e.g. an enum name outside the allowed set).
    pub fn entity_parameters(&self, entity: &E) -> Result<Parameters> {
        let mut params = Parameters::new();
        for column in self.schema.columns().iter().filter(|c| c.is_insertable()) {
            let value = entity.get(&column.property).unwrap_or(Value::Null);
            let value = outgoing(column, value)?;
            params.push((column.parameter(), value));
        }
        Ok(params)
    }

    /// Batch variant of [`Self::entity_parameters`]: `@ColName_i` per row.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::entity_parameters`].
    pub fn batch_parameters(&self, entities: &[E]) -> Result<Parameters> {
        let mut params = Parameters::new();
        for (row, entity) in entities.iter().enumerate() {
            for column in self.schema.columns().iter().filter(|c| c.is_insertable()) {
                let value = entity.get(&column.property).unwrap_or(Value::Null);
                let value = outgoing(column, value)?;
                params.push((column.batch_parameter(row), value));
            }
        }
        Ok(params)
    }

    /// Parameters for the in-place UPDATE form: business columns,
    /// `@LastWriteTime`, the declared key, and `@ExpectedVersion`.
    /// Soft-delete tables never use this (their update is an insert).
    ///
    /// # Errors
    ///
    /// Same conversion conditions as [`Self::entity_parameters`].
    pub fn update_parameters(&self, entity: &E, expected_version: i64) -> Result<Parameters> {
        let mut params = Parameters::new();
        for column in self.schema.columns().iter().filter(|c| {
            c.is_insertable() && !c.is_primary_key() && c.audit.is_none()
        }) {
            let value = entity.get(&column.property).unwrap_or(Value::Null);
            params.push((column.parameter(), outgoing(column, value)?));
        }
        if let Some(column) = self.schema.column_by_name(crate::schema::LAST_WRITE_TIME) {
            let value = entity.get(&column.property).unwrap_or(Value::Null);
            params.push((column.parameter(), value));
        }
        for column in self.schema.declared_primary_key() {
            let value = entity.get(&column.property).unwrap_or(Value::Null);
            params.push((column.parameter(), value));
        }
        params.push(("@ExpectedVersion".to_string(), Value::Integer(expected_version)));
        Ok(params)
    }

    /// Parameter dictionary for the single natural-key column.
    ///
    /// # Errors
    ///
    /// `Misconfiguration` when the declared key is composite; the id-based
    /// operations require a single key column.
    pub fn id_parameters(&self, id: &Value) -> Result<Parameters> {
        let key = self.single_key()?;
        Ok(vec![(key.parameter(), id.clone())])
    }

    /// Read the entity's natural key value.
    ///
    /// # Errors
    ///
    /// `Misconfiguration` on a composite key; `InvalidArgument` when the key
    /// property is unset or null.
    pub fn key_of(&self, entity: &E) -> Result<Value> {
        let key = self.single_key()?;
        match entity.get(&key.property) {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(StrataError::InvalidArgument(format!(
                "{}.{} must be set before writing",
                self.schema.table_name(),
                key.property
            ))),
        }
    }

    /// Read the entity's version counter, defaulting to 0 when unset.
    #[must_use]
    pub fn version_of(&self, entity: &E) -> i64 {
        self.schema
            .column_by_name(VERSION)
            .and_then(|c| entity.get(&c.property))
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    /// Map a result row back to a new entity, reading each column by name.
    ///
    /// # Errors
    ///
    /// `Conversion` (a `DataIntegrity` kind) with the column name and target
    /// type when a stored value cannot be interpreted.
    pub fn entity_from_row(&self, row: &rusqlite::Row<'_>) -> Result<E> {
        let mut entity = E::empty();
        for column in self.schema.columns() {
            let raw = row
                .get_ref(column.name.as_str())
                .map(Value::from_sql_ref)
                .map_err(StrataError::from)?;
            let value = incoming(column, raw)?;
            entity.set(&column.property, value)?;
        }
        Ok(entity)
    }

    fn single_key(&self) -> Result<&ColumnMapping> {
        self.schema.single_key_column().ok_or_else(|| {
            StrataError::Misconfiguration {
                entity: self.schema.table_name().to_string(),
                reason: "id-based operations require a single-column natural key".to_string(),
            }
        })
    }
}

/// Validate and normalize a value leaving for the driver.
fn outgoing(column: &ColumnMapping, value: Value) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if let Some(names) = &column.enum_names {
        let canonical = value
            .decode_enum(names)
            .ok_or_else(|| conversion_error(column, "enum", &value))?;
        return Ok(Value::Text(canonical.to_string()));
    }
    Ok(value)
}

/// Interpret a raw driver value by the column's declared type.
fn incoming(column: &ColumnMapping, raw: Value) -> Result<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    if let Some(names) = &column.enum_names {
        let canonical = raw
            .decode_enum(names)
            .ok_or_else(|| conversion_error(column, "enum", &raw))?;
        return Ok(Value::Text(canonical.to_string()));
    }
    match column.sql_type {
        SqlType::Boolean => raw
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| conversion_error(column, "bool", &raw)),
        SqlType::DateTime => raw
            .as_datetime()
            .map(Value::DateTime)
            .ok_or_else(|| conversion_error(column, "datetime", &raw)),
        SqlType::Integer => raw
            .as_i64()
            .map(Value::Integer)
            .ok_or_else(|| conversion_error(column, "integer", &raw)),
        SqlType::Real | SqlType::Decimal(..) => raw
            .as_f64()
            .map(Value::Real)
            .ok_or_else(|| conversion_error(column, "real", &raw)),
        SqlType::Text | SqlType::Varchar(_) => match raw {
            Value::Text(_) => Ok(raw),
            other => Err(conversion_error(column, "text", &other)),
        },
        SqlType::Blob => match raw {
            Value::Blob(_) => Ok(raw),
            other => Err(conversion_error(column, "blob", &other)),
        },
    }
}

fn conversion_error(column: &ColumnMapping, target: &'static str, value: &Value) -> StrataError {
    StrataError::Conversion {
        column: column.name.clone(),
        target,
        detail: format!("stored value has shape {}", value.type_name()),
    }
}
