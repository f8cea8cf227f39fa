//! DDL generation from a schema model.
//!
//! All statements are idempotent (`IF NOT EXISTS`) so initialization can
//! run on every open.

use crate::schema::{
    ABSOLUTE_EXPIRATION, ColumnMapping, IS_DELETED, TableSchema, VERSION, escape_identifier,
};

/// Render `CREATE TABLE` for the schema: columns in declared order,
/// computed columns as `name TYPE AS (expr)`, the primary key as a
/// table-level constraint (declared key then `Version` under soft-delete),
/// then named FOREIGN KEY and CHECK constraints.
#[must_use]
pub fn create_table_sql(schema: &TableSchema, if_not_exists: bool) -> String {
    let mut parts: Vec<String> = Vec::new();

    let inline_pk = schema
        .columns()
        .iter()
        .find(|c| c.auto_increment)
        .map(|c| c.name.clone());

    for column in schema.columns() {
        parts.push(column_definition(column));
    }

    // An AUTOINCREMENT key must be declared inline, so the table-level
    // constraint is omitted for it.
    if inline_pk.is_none() {
        let pk: Vec<String> = schema
            .primary_key()
            .iter()
            .map(|c| escape_identifier(&c.name))
            .collect();
        parts.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }

    for fk in schema.foreign_keys() {
        let columns: Vec<String> = fk.columns.iter().map(|c| escape_identifier(c)).collect();
        let referenced: Vec<String> = fk
            .referenced_columns
            .iter()
            .map(|c| escape_identifier(c))
            .collect();
        let mut clause = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            escape_identifier(&fk.name),
            columns.join(", "),
            escape_identifier(&fk.referenced_table),
            referenced.join(", ")
        );
        if let Some(action) = fk.on_delete {
            clause.push_str(&format!(" ON DELETE {}", action.as_str()));
        }
        if let Some(action) = fk.on_update {
            clause.push_str(&format!(" ON UPDATE {}", action.as_str()));
        }
        parts.push(clause);
    }

    for check in schema.checks() {
        parts.push(format!(
            "CONSTRAINT {} CHECK ({})",
            escape_identifier(&check.name),
            check.expression
        ));
    }

    let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
    format!(
        "CREATE TABLE {guard}{} ({})",
        schema.qualified_name(),
        parts.join(", ")
    )
}

fn column_definition(column: &ColumnMapping) -> String {
    let mut def = format!(
        "{} {}",
        escape_identifier(&column.name),
        column.sql_type.ddl_name()
    );

    if let Some(expr) = &column.computed {
        def.push_str(&format!(" AS ({expr})"));
        return def;
    }

    if column.auto_increment {
        def.push_str(" PRIMARY KEY AUTOINCREMENT");
    }
    if column.not_null {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        def.push_str(&format!(" DEFAULT {default}"));
    }
    if column.unique {
        def.push_str(" UNIQUE");
    }
    if let Some(check) = &column.check {
        def.push_str(&format!(" CHECK ({check})"));
    }
    def
}

/// Render the per-index DDL statements.
///
/// Declared indexes come first, then the synthetic ones: the soft-delete
/// chain index `(pk…, Version DESC) WHERE IsDeleted = 0` and the expiry
/// index on `AbsoluteExpiration`.
#[must_use]
pub fn create_index_sql(schema: &TableSchema) -> Vec<String> {
    let table = schema.qualified_name();
    let mut statements = Vec::new();

    for index in schema.indexes() {
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| {
                if c.descending {
                    format!("{} DESC", escape_identifier(&c.name))
                } else {
                    escape_identifier(&c.name)
                }
            })
            .collect();
        let unique = if index.unique { "UNIQUE " } else { "" };
        let mut sql = format!(
            "CREATE {unique}INDEX IF NOT EXISTS {} ON {table} ({})",
            escape_identifier(&index.name),
            columns.join(", ")
        );
        if let Some(where_clause) = &index.where_clause {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }
        statements.push(sql);
    }

    if schema.soft_delete() {
        let mut columns: Vec<String> = schema
            .declared_primary_key()
            .iter()
            .map(|c| escape_identifier(&c.name))
            .collect();
        columns.push(format!("{VERSION} DESC"));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({}) WHERE {IS_DELETED} = 0",
            escape_identifier(&format!("IX_{}_CurrentVersion", schema.table_name())),
            columns.join(", ")
        ));
    }

    if schema.expiry().is_some() {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({ABSOLUTE_EXPIRATION}) WHERE {ABSOLUTE_EXPIRATION} IS NOT NULL",
            escape_identifier(&format!("IX_{}_Expiration", schema.table_name())),
        ));
    }

    statements
}
