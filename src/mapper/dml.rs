//! Parameterized DML generation from a schema model.
//!
//! Parameter names mirror column names (`@ColName`); batch inserts suffix a
//! row index (`@ColName_0`). Column order and parameter order are always
//! identical.
//!
//! Soft-delete tables never update or delete rows in place except for the
//! tombstone write: updates insert a new max-version row, reads filter to
//! the current (max-version, non-deleted) row, and queries go through a
//! `t`-aliased current-view so the predicate and the soft-delete filter are
//! prefixed consistently.

use crate::error::Result;
use crate::predicate::{OrderKey, Predicate, order_by_clause, translate};
use crate::schema::{
    ABSOLUTE_EXPIRATION, ColumnMapping, IS_DELETED, LAST_WRITE_TIME, TableSchema, VERSION,
    escape_identifier,
};
use crate::value::Parameters;

/// Alias used whenever the soft-delete current-view filter needs to
/// correlate with the outer row.
pub const QUERY_ALIAS: &str = "t";

/// Options for list-shaped selects.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    pub order_by: Vec<OrderKey>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    /// Return every row of every chain instead of the current view.
    pub include_all_versions: bool,
}

fn insertable_columns(schema: &TableSchema) -> Vec<&ColumnMapping> {
    schema
        .columns()
        .iter()
        .filter(|c| c.is_insertable())
        .collect()
}

fn select_list(schema: &TableSchema, alias: Option<&str>) -> String {
    schema
        .columns()
        .iter()
        .map(|c| match alias {
            Some(a) => format!("{a}.{}", escape_identifier(&c.name)),
            None => escape_identifier(&c.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn declared_pk_match(schema: &TableSchema) -> String {
    schema
        .declared_primary_key()
        .iter()
        .map(|c| format!("{} = @{}", escape_identifier(&c.name), c.name))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// INSERT listing every non-computed, non-identity column exactly once.
#[must_use]
pub fn insert_sql(schema: &TableSchema) -> String {
    let columns = insertable_columns(schema);
    let names: Vec<String> = columns
        .iter()
        .map(|c| escape_identifier(&c.name))
        .collect();
    let placeholders: Vec<String> = columns.iter().map(|c| c.parameter()).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.qualified_name(),
        names.join(", "),
        placeholders.join(", ")
    )
}

/// Single INSERT carrying `rows` tuples with per-row suffixed parameters.
#[must_use]
pub fn batch_insert_sql(schema: &TableSchema, rows: usize) -> String {
    let columns = insertable_columns(schema);
    let names: Vec<String> = columns
        .iter()
        .map(|c| escape_identifier(&c.name))
        .collect();
    let tuples: Vec<String> = (0..rows)
        .map(|row| {
            let placeholders: Vec<String> =
                columns.iter().map(|c| c.batch_parameter(row)).collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        schema.qualified_name(),
        names.join(", "),
        tuples.join(", ")
    )
}

/// UPDATE for optimistic in-place writes, or the versioned INSERT under
/// soft-delete (a soft-delete update is a new row, never a rewrite).
#[must_use]
pub fn update_sql(schema: &TableSchema) -> String {
    if schema.soft_delete() {
        return insert_sql(schema);
    }

    let mut assignments: Vec<String> = schema
        .columns()
        .iter()
        .filter(|c| c.is_insertable() && !c.is_primary_key() && c.audit.is_none())
        .map(|c| format!("{} = {}", escape_identifier(&c.name), c.parameter()))
        .collect();
    assignments.push(format!("{LAST_WRITE_TIME} = @{LAST_WRITE_TIME}"));
    assignments.push(format!("{VERSION} = {VERSION} + 1"));

    format!(
        "UPDATE {} SET {} WHERE {} AND {VERSION} = @ExpectedVersion",
        schema.qualified_name(),
        assignments.join(", "),
        declared_pk_match(schema)
    )
}

/// DELETE by key, or the tombstone write under soft-delete: the current
/// max-version row is rewritten as `IsDeleted = 1` at version
/// `@NextVersion`, guarded by the expected `@Version`.
#[must_use]
pub fn delete_sql(schema: &TableSchema) -> String {
    if schema.soft_delete() {
        format!(
            "UPDATE {} SET {IS_DELETED} = 1, {VERSION} = @NextVersion, {LAST_WRITE_TIME} = @{LAST_WRITE_TIME} WHERE {} AND {VERSION} = @{VERSION}",
            schema.qualified_name(),
            declared_pk_match(schema)
        )
    } else {
        format!(
            "DELETE FROM {} WHERE {}",
            schema.qualified_name(),
            declared_pk_match(schema)
        )
    }
}

/// Single-row SELECT by key. Under soft-delete this selects the
/// max-version row via a correlated subquery, filtered to non-deleted
/// unless `include_deleted`. No alias on by-id forms.
#[must_use]
pub fn select_by_id_sql(schema: &TableSchema, include_deleted: bool) -> String {
    let table = schema.qualified_name();
    let list = select_list(schema, None);
    let pk_match = declared_pk_match(schema);

    if !schema.soft_delete() {
        return format!("SELECT {list} FROM {table} WHERE {pk_match}");
    }

    let mut sql = format!(
        "SELECT {list} FROM {table} WHERE {pk_match} AND {VERSION} = (SELECT MAX({VERSION}) FROM {table} WHERE {pk_match})"
    );
    if !include_deleted {
        sql.push_str(&format!(" AND {IS_DELETED} = 0"));
    }
    sql
}

/// Every row of one key's chain, oldest version first.
#[must_use]
pub fn select_versions_sql(schema: &TableSchema) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {VERSION} ASC",
        select_list(schema, None),
        schema.qualified_name(),
        declared_pk_match(schema)
    )
}

/// The per-row filter restricting a soft-delete table to its current view:
/// non-deleted rows holding their key's maximum version.
fn current_view_filter(schema: &TableSchema) -> String {
    let correlated: Vec<String> = schema
        .declared_primary_key()
        .iter()
        .map(|c| {
            let name = escape_identifier(&c.name);
            format!("{name} = {QUERY_ALIAS}.{name}")
        })
        .collect();
    format!(
        "{QUERY_ALIAS}.{IS_DELETED} = 0 AND {QUERY_ALIAS}.{VERSION} = (SELECT MAX({VERSION}) FROM {} WHERE {})",
        schema.qualified_name(),
        correlated.join(" AND ")
    )
}

/// List-shaped SELECT with optional predicate, order-by and paging.
///
/// # Errors
///
/// Propagates predicate translation failures.
pub fn select_sql(
    schema: &TableSchema,
    predicate: Option<&Predicate>,
    options: &SelectOptions,
) -> Result<(String, Parameters)> {
    build_listing("SELECT", schema, predicate, options)
}

/// SELECT of every column with the default options.
///
/// # Errors
///
/// Never fails today; kept fallible for parity with [`select_sql`].
pub fn select_all_sql(schema: &TableSchema) -> Result<String> {
    select_sql(schema, None, &SelectOptions::default()).map(|(sql, _)| sql)
}

/// COUNT over the same view [`select_sql`] reads.
///
/// # Errors
///
/// Propagates predicate translation failures.
pub fn count_sql(
    schema: &TableSchema,
    predicate: Option<&Predicate>,
    include_all_versions: bool,
) -> Result<(String, Parameters)> {
    let options = SelectOptions {
        include_all_versions,
        ..SelectOptions::default()
    };
    build_listing("COUNT", schema, predicate, &options)
}

fn build_listing(
    shape: &str,
    schema: &TableSchema,
    predicate: Option<&Predicate>,
    options: &SelectOptions,
) -> Result<(String, Parameters)> {
    let current_view = schema.soft_delete() && !options.include_all_versions;
    let alias = current_view.then_some(QUERY_ALIAS);

    let projection = if shape == "COUNT" {
        "COUNT(*)".to_string()
    } else {
        select_list(schema, alias)
    };
    let mut sql = format!("SELECT {projection} FROM {}", schema.qualified_name());
    if let Some(a) = alias {
        sql.push_str(&format!(" {a}"));
    }

    let mut params = Parameters::new();
    let mut conditions: Vec<String> = Vec::new();
    if let Some(predicate) = predicate {
        let fragment = translate(predicate, alias)?;
        conditions.push(format!("({})", fragment.sql));
        params = fragment.params;
    }
    if current_view {
        conditions.push(current_view_filter(schema));
    }
    if !conditions.is_empty() {
        sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
    }

    if !options.order_by.is_empty() {
        sql.push_str(&format!(
            " ORDER BY {}",
            order_by_clause(&options.order_by, alias)
        ));
    }

    match (options.take, options.skip) {
        (Some(take), Some(skip)) => sql.push_str(&format!(" LIMIT {take} OFFSET {skip}")),
        (Some(take), None) => sql.push_str(&format!(" LIMIT {take}")),
        // SQLite requires a LIMIT before OFFSET; -1 means unbounded.
        (None, Some(skip)) => sql.push_str(&format!(" LIMIT -1 OFFSET {skip}")),
        (None, None) => {}
    }

    Ok((sql, params))
}

/// Purge statement for expired rows (`AbsoluteExpiration <= now`).
/// Preview mode counts instead of deleting.
#[must_use]
pub fn purge_expired_sql(schema: &TableSchema, preview: bool) -> String {
    let head = if preview {
        "SELECT COUNT(*) FROM"
    } else {
        "DELETE FROM"
    };
    format!(
        "{head} {} WHERE {ABSOLUTE_EXPIRATION} IS NOT NULL AND {ABSOLUTE_EXPIRATION} <= @{ABSOLUTE_EXPIRATION}",
        schema.qualified_name()
    )
}

/// Purge statement for predicate-selected rows. Physical removal: this
/// bypasses the soft-delete view on purpose.
///
/// # Errors
///
/// Propagates predicate translation failures.
pub fn purge_predicate_sql(
    schema: &TableSchema,
    predicate: Option<&Predicate>,
    preview: bool,
) -> Result<(String, Parameters)> {
    let head = if preview {
        "SELECT COUNT(*) FROM"
    } else {
        "DELETE FROM"
    };
    let table = schema.qualified_name();
    match predicate {
        None => Ok((format!("{head} {table}"), Parameters::new())),
        Some(predicate) => {
            let fragment = translate(predicate, None)?;
            Ok((
                format!("{head} {table} WHERE {}", fragment.sql),
                fragment.params,
            ))
        }
    }
}
