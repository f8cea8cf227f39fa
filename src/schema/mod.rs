//! Schema model: the in-memory description of an entity's table.
//!
//! A [`TableSchema`] is a pure data value registered once per entity type.
//! Construction is idempotent given the same declarations. Identifier
//! escaping is owned here so the DDL and DML generators stay consistent.
//!
//! Lifecycle columns are part of the model, not the generators:
//! every table carries `Version`, `CreatedTime` and `LastWriteTime`;
//! soft-delete adds `IsDeleted` and moves `Version` into the primary key;
//! expiry adds `AbsoluteExpiration`; archive adds `IsArchived`.

use std::time::Duration;

use crate::error::{Result, StrataError};
use crate::sql::token::is_reserved_word;

/// Column name of the monotonic per-key version counter.
pub const VERSION: &str = "Version";
/// Column name of the soft-delete tombstone flag.
pub const IS_DELETED: &str = "IsDeleted";
/// Column name of the creation timestamp (never modified after create).
pub const CREATED_TIME: &str = "CreatedTime";
/// Column name of the last-write timestamp.
pub const LAST_WRITE_TIME: &str = "LastWriteTime";
/// Column name of the expiry deadline.
pub const ABSOLUTE_EXPIRATION: &str = "AbsoluteExpiration";
/// Column name of the archive flag.
pub const IS_ARCHIVED: &str = "IsArchived";

/// SQL column type with optional size/precision/scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Varchar(u32),
    Blob,
    Boolean,
    DateTime,
    Decimal(u8, u8),
}

impl SqlType {
    /// The type name emitted into DDL.
    #[must_use]
    pub fn ddl_name(&self) -> String {
        match self {
            Self::Integer | Self::Boolean => "INTEGER".to_string(),
            Self::Real => "REAL".to_string(),
            Self::Text => "TEXT".to_string(),
            Self::Varchar(size) => format!("VARCHAR({size})"),
            Self::Blob => "BLOB".to_string(),
            Self::DateTime => "DATETIME".to_string(),
            Self::Decimal(precision, scale) => format!("DECIMAL({precision}, {scale})"),
        }
    }
}

/// Lifecycle role of a column, driving engine-managed writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditField {
    Version,
    CreatedTime,
    LastWriteTime,
}

/// A single property→column mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    /// Entity property name.
    pub property: String,
    /// Column name in the table.
    pub name: String,
    pub sql_type: SqlType,
    pub not_null: bool,
    /// Raw SQL default expression.
    pub default: Option<String>,
    /// Primary-key ordinal; `None` for non-key columns.
    pub primary_key: Option<u8>,
    pub unique: bool,
    pub auto_increment: bool,
    /// Raw check expression scoped to this column.
    pub check: Option<String>,
    /// Computed-column expression; computed columns are never inserted.
    pub computed: Option<String>,
    pub audit: Option<AuditField>,
    /// Allowed variant names for enum-as-string columns.
    pub enum_names: Option<Vec<&'static str>>,
}

impl ColumnMapping {
    #[must_use]
    pub const fn is_computed(&self) -> bool {
        self.computed.is_some()
    }

    #[must_use]
    pub const fn is_primary_key(&self) -> bool {
        self.primary_key.is_some()
    }

    /// True for columns that appear in INSERT statements: everything
    /// except computed columns and store-assigned identities.
    #[must_use]
    pub fn is_insertable(&self) -> bool {
        !self.is_computed() && !self.auto_increment
    }

    /// Parameter name for this column (`@ColName`).
    #[must_use]
    pub fn parameter(&self) -> String {
        format!("@{}", self.name)
    }

    /// Parameter name for row `i` of a batch insert (`@ColName_i`).
    #[must_use]
    pub fn batch_parameter(&self, row: usize) -> String {
        format!("@{}_{row}", self.name)
    }
}

/// Declarative column definition consumed by the schema builder.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    mapping: ColumnMapping,
}

impl ColumnDef {
    #[must_use]
    pub fn new(name: &str, sql_type: SqlType) -> Self {
        Self {
            mapping: ColumnMapping {
                property: name.to_string(),
                name: name.to_string(),
                sql_type,
                not_null: false,
                default: None,
                primary_key: None,
                unique: false,
                auto_increment: false,
                check: None,
                computed: None,
                audit: None,
                enum_names: None,
            },
        }
    }

    #[must_use]
    pub fn text(name: &str) -> Self {
        Self::new(name, SqlType::Text)
    }

    #[must_use]
    pub fn integer(name: &str) -> Self {
        Self::new(name, SqlType::Integer)
    }

    #[must_use]
    pub fn real(name: &str) -> Self {
        Self::new(name, SqlType::Real)
    }

    #[must_use]
    pub fn boolean(name: &str) -> Self {
        Self::new(name, SqlType::Boolean)
    }

    #[must_use]
    pub fn datetime(name: &str) -> Self {
        Self::new(name, SqlType::DateTime)
    }

    #[must_use]
    pub fn blob(name: &str) -> Self {
        Self::new(name, SqlType::Blob)
    }

    /// Map a differently named entity property onto this column.
    #[must_use]
    pub fn property(mut self, property: &str) -> Self {
        self.mapping.property = property.to_string();
        self
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.mapping.not_null = true;
        self
    }

    #[must_use]
    pub fn default_sql(mut self, expr: &str) -> Self {
        self.mapping.default = Some(expr.to_string());
        self
    }

    /// Mark as primary key with the given ordinal (0-based).
    #[must_use]
    pub fn primary_key(mut self, order: u8) -> Self {
        self.mapping.primary_key = Some(order);
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.mapping.unique = true;
        self
    }

    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.mapping.auto_increment = true;
        self
    }

    #[must_use]
    pub fn check(mut self, expr: &str) -> Self {
        self.mapping.check = Some(expr.to_string());
        self
    }

    #[must_use]
    pub fn computed(mut self, expr: &str) -> Self {
        self.mapping.computed = Some(expr.to_string());
        self
    }

    #[must_use]
    pub fn audit(mut self, field: AuditField) -> Self {
        self.mapping.audit = Some(field);
        self
    }

    /// Persist an enum column as its variant name; reads also accept the
    /// variant ordinal for rows written by older tooling. Unless one was
    /// declared explicitly, a check constraint enumerating the allowed
    /// names is attached.
    #[must_use]
    pub fn enum_values(mut self, names: &[&'static str]) -> Self {
        if self.mapping.check.is_none() {
            let list = names
                .iter()
                .map(|name| format!("'{name}'"))
                .collect::<Vec<_>>()
                .join(", ");
            self.mapping.check = Some(format!(
                "{} IN ({list})",
                escape_identifier(&self.mapping.name)
            ));
        }
        self.mapping.enum_names = Some(names.to_vec());
        self
    }
}

/// Foreign-key action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkAction {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

impl FkAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
        }
    }
}

/// Table-level foreign key edge, carried by name (no object graph).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: Option<FkAction>,
    pub on_update: Option<FkAction>,
}

/// A single column within an index, with sort direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    pub name: String,
    pub descending: bool,
}

impl IndexColumn {
    #[must_use]
    pub fn asc(name: &str) -> Self {
        Self {
            name: name.to_string(),
            descending: false,
        }
    }

    #[must_use]
    pub fn desc(name: &str) -> Self {
        Self {
            name: name.to_string(),
            descending: true,
        }
    }
}

/// Secondary index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
    /// Partial-index predicate, raw SQL.
    pub where_clause: Option<String>,
}

/// Named table-level check constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckDef {
    pub name: String,
    pub expression: String,
}

/// The derived schema for one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    table: String,
    namespace: Option<String>,
    columns: Vec<ColumnMapping>,
    indexes: Vec<IndexDef>,
    foreign_keys: Vec<ForeignKeyDef>,
    checks: Vec<CheckDef>,
    soft_delete: bool,
    expiry: Option<Duration>,
    archive: bool,
}

impl TableSchema {
    /// Start declaring a schema for `table`.
    #[must_use]
    pub fn builder(table: &str) -> TableSchemaBuilder {
        TableSchemaBuilder {
            table: table.to_string(),
            namespace: None,
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            checks: Vec::new(),
            soft_delete: false,
            expiry: None,
            archive: false,
        }
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Schema-qualified name, escaped for the dialect.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", escape_identifier(ns), escape_identifier(&self.table)),
            None => escape_identifier(&self.table),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    #[must_use]
    pub fn column_by_property(&self, property: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.property == property)
    }

    #[must_use]
    pub fn column_by_name(&self, name: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Declared primary-key columns in PK ordinal order, excluding the
    /// engine-appended `Version` slot.
    #[must_use]
    pub fn declared_primary_key(&self) -> Vec<&ColumnMapping> {
        let mut keys: Vec<&ColumnMapping> = self
            .columns
            .iter()
            .filter(|c| c.is_primary_key() && c.name != VERSION)
            .collect();
        keys.sort_by_key(|c| c.primary_key);
        keys
    }

    /// Full primary key: the declared key, plus `Version` under soft-delete.
    #[must_use]
    pub fn primary_key(&self) -> Vec<&ColumnMapping> {
        let mut keys = self.declared_primary_key();
        if self.soft_delete {
            if let Some(version) = self.column_by_name(VERSION) {
                keys.push(version);
            }
        }
        keys
    }

    /// The single natural-key column, when the declared PK is one field.
    #[must_use]
    pub fn single_key_column(&self) -> Option<&ColumnMapping> {
        let declared = self.declared_primary_key();
        match declared.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    #[must_use]
    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    #[must_use]
    pub fn foreign_keys(&self) -> &[ForeignKeyDef] {
        &self.foreign_keys
    }

    #[must_use]
    pub fn checks(&self) -> &[CheckDef] {
        &self.checks
    }

    #[must_use]
    pub const fn soft_delete(&self) -> bool {
        self.soft_delete
    }

    #[must_use]
    pub const fn expiry(&self) -> Option<Duration> {
        self.expiry
    }

    #[must_use]
    pub const fn archive(&self) -> bool {
        self.archive
    }

    #[must_use]
    pub fn audit_column(&self, field: AuditField) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.audit == Some(field))
    }
}

/// Builder accumulating declarations before validation.
#[derive(Debug)]
pub struct TableSchemaBuilder {
    table: String,
    namespace: Option<String>,
    columns: Vec<ColumnMapping>,
    indexes: Vec<IndexDef>,
    foreign_keys: Vec<ForeignKeyDef>,
    checks: Vec<CheckDef>,
    soft_delete: bool,
    expiry: Option<Duration>,
    archive: bool,
}

impl TableSchemaBuilder {
    #[must_use]
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    #[must_use]
    pub fn column(mut self, def: ColumnDef) -> Self {
        self.columns.push(def.mapping);
        self
    }

    #[must_use]
    pub fn soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    /// Enable expiry with the given retention span.
    #[must_use]
    pub fn expiry(mut self, span: Duration) -> Self {
        self.expiry = Some(span);
        self
    }

    #[must_use]
    pub fn archive(mut self) -> Self {
        self.archive = true;
        self
    }

    #[must_use]
    pub fn index(mut self, mut def: IndexDef) -> Self {
        if def.name.is_empty() {
            let cols: Vec<&str> = def.columns.iter().map(|c| c.name.as_str()).collect();
            def.name = format!("IX_{}_{}", self.table, cols.join("_"));
        }
        self.indexes.push(def);
        self
    }

    #[must_use]
    pub fn foreign_key(mut self, mut def: ForeignKeyDef) -> Self {
        if def.name.is_empty() {
            def.name = format!("FK_{}_{}", self.table, def.referenced_table);
        }
        self.foreign_keys.push(def);
        self
    }

    #[must_use]
    pub fn check(mut self, expression: &str) -> Self {
        let name = format!("CK_{}_{}", self.table, self.checks.len() + 1);
        self.checks.push(CheckDef {
            name,
            expression: expression.to_string(),
        });
        self
    }

    /// Validate the declarations and expand lifecycle columns.
    ///
    /// # Errors
    ///
    /// Returns `Misconfiguration` when the table name is empty, no column is
    /// marked as primary key, a column name repeats, or auto-increment is
    /// declared on anything but a single integer key.
    pub fn build(mut self) -> Result<TableSchema> {
        if self.table.trim().is_empty() {
            return Err(self.misconfigured("entity is not bound to a table"));
        }

        self.ensure_lifecycle_columns();

        let mut seen = std::collections::HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.clone()) {
                return Err(StrataError::Misconfiguration {
                    entity: self.table.clone(),
                    reason: format!("duplicate column '{}'", column.name),
                });
            }
        }

        if !self.columns.iter().any(ColumnMapping::is_primary_key) {
            return Err(self.misconfigured("no primary key column declared"));
        }

        for column in &self.columns {
            if column.auto_increment
                && (column.sql_type != SqlType::Integer || !column.is_primary_key())
            {
                return Err(StrataError::Misconfiguration {
                    entity: self.table.clone(),
                    reason: format!(
                        "auto-increment column '{}' must be a single INTEGER primary key",
                        column.name
                    ),
                });
            }
        }

        Ok(TableSchema {
            table: self.table,
            namespace: self.namespace,
            columns: self.columns,
            indexes: self.indexes,
            foreign_keys: self.foreign_keys,
            checks: self.checks,
            soft_delete: self.soft_delete,
            expiry: self.expiry,
            archive: self.archive,
        })
    }

    fn misconfigured(&self, reason: &str) -> StrataError {
        StrataError::Misconfiguration {
            entity: self.table.clone(),
            reason: reason.to_string(),
        }
    }

    /// Append the engine-managed columns that are missing from the
    /// declaration. Explicitly declared ones are left untouched so callers
    /// can override types or defaults.
    fn ensure_lifecycle_columns(&mut self) {
        if !self.has_column(VERSION) {
            self.columns.push(
                ColumnDef::integer(VERSION)
                    .not_null()
                    .default_sql("1")
                    .audit(AuditField::Version)
                    .mapping,
            );
        }
        if !self.has_column(CREATED_TIME) {
            self.columns.push(
                ColumnDef::datetime(CREATED_TIME)
                    .not_null()
                    .audit(AuditField::CreatedTime)
                    .mapping,
            );
        }
        if !self.has_column(LAST_WRITE_TIME) {
            self.columns.push(
                ColumnDef::datetime(LAST_WRITE_TIME)
                    .not_null()
                    .audit(AuditField::LastWriteTime)
                    .mapping,
            );
        }
        if self.soft_delete && !self.has_column(IS_DELETED) {
            self.columns
                .push(ColumnDef::boolean(IS_DELETED).not_null().default_sql("0").mapping);
        }
        if self.expiry.is_some() && !self.has_column(ABSOLUTE_EXPIRATION) {
            self.columns
                .push(ColumnDef::datetime(ABSOLUTE_EXPIRATION).mapping);
        }
        if self.archive && !self.has_column(IS_ARCHIVED) {
            self.columns
                .push(ColumnDef::boolean(IS_ARCHIVED).not_null().default_sql("0").mapping);
        }
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// Escape an identifier for the SQLite dialect.
///
/// Plain identifiers pass through; reserved words and anything with
/// non-identifier characters are bracketed, the same form in DDL and DML.
/// Brackets rather than double quotes so generated SQL re-parses without
/// the quoted form being read as a string literal.
#[must_use]
pub fn escape_identifier(name: &str) -> String {
    let plain = name
        .chars()
        .enumerate()
        .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    if plain && !is_reserved_word(name) {
        name.to_string()
    } else {
        format!("[{name}]")
    }
}
