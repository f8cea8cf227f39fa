#![allow(dead_code)]

//! Shared fixtures: registered test entities and provider constructors.

use std::path::Path;
use std::sync::{Once, OnceLock};

use chrono::{DateTime, Utc};
use strata::config::EngineConfig;
use strata::error::Result;
use strata::mapper::Entity;
use strata::provider::Provider;
use strata::schema::{ColumnDef, FkAction, ForeignKeyDef, TableSchema};
use strata::value::Value;
use strata::CallerInfo;
use tempfile::TempDir;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        strata::logging::init_test_logging();
    });
}

pub fn caller() -> CallerInfo {
    CallerInfo::new("tester")
}

/// Initialized provider over a fresh in-memory database.
pub fn memory_provider<E: Entity>() -> Provider<E> {
    init_test_logging();
    let mut provider =
        Provider::open_memory(EngineConfig::default()).expect("open in-memory provider");
    provider.initialize().expect("initialize provider");
    provider
}

/// Initialized provider over a shared database file, so several entity
/// types can live in one database.
pub fn file_provider<E: Entity>(dir: &TempDir) -> Provider<E> {
    init_test_logging();
    let path = dir.path().join("strata.db");
    provider_at(&path)
}

pub fn provider_at<E: Entity>(path: &Path) -> Provider<E> {
    let mut provider = Provider::open(path, EngineConfig::default()).expect("open file provider");
    provider.initialize().expect("initialize provider");
    provider
}

pub fn temp_dir() -> TempDir {
    TempDir::new().expect("create temp dir")
}

// ── SimpleEntity: plain table, optimistic in-place updates ─────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleEntity {
    pub id: String,
    pub name: String,
    pub age: i64,
    pub version: i64,
    pub created: Option<DateTime<Utc>>,
    pub written: Option<DateTime<Utc>>,
}

impl SimpleEntity {
    pub fn new(id: &str, name: &str, age: i64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            age,
            ..Self::default()
        }
    }
}

impl Entity for SimpleEntity {
    fn schema() -> &'static TableSchema {
        static SCHEMA: OnceLock<TableSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            TableSchema::builder("SimpleEntity")
                .column(ColumnDef::text("Id").primary_key(0).not_null())
                .column(ColumnDef::text("Name").not_null())
                .column(ColumnDef::integer("Age").check("Age >= 0"))
                .build()
                .expect("SimpleEntity schema")
        })
    }

    fn get(&self, property: &str) -> Option<Value> {
        match property {
            "Id" => Some(Value::Text(self.id.clone())),
            "Name" => Some(Value::Text(self.name.clone())),
            "Age" => Some(Value::Integer(self.age)),
            "Version" => Some(Value::Integer(self.version)),
            "CreatedTime" => Some(self.created.map_or(Value::Null, Value::DateTime)),
            "LastWriteTime" => Some(self.written.map_or(Value::Null, Value::DateTime)),
            _ => None,
        }
    }

    fn set(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "Id" => self.id = value.as_str().unwrap_or_default().to_string(),
            "Name" => self.name = value.as_str().unwrap_or_default().to_string(),
            "Age" => self.age = value.as_i64().unwrap_or_default(),
            "Version" => self.version = value.as_i64().unwrap_or_default(),
            "CreatedTime" => self.created = value.as_datetime(),
            "LastWriteTime" => self.written = value.as_datetime(),
            _ => {}
        }
        Ok(())
    }

    fn empty() -> Self {
        Self::default()
    }
}

// ── CrudTest: plain table used by predicate queries ────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrudTest {
    pub id: String,
    pub name: String,
    pub status: String,
    pub version: i64,
    pub created: Option<DateTime<Utc>>,
    pub written: Option<DateTime<Utc>>,
}

impl CrudTest {
    pub fn new(id: &str, name: &str, status: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status: status.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for CrudTest {
    fn schema() -> &'static TableSchema {
        static SCHEMA: OnceLock<TableSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            TableSchema::builder("CrudTest")
                .column(ColumnDef::text("Id").primary_key(0).not_null())
                .column(ColumnDef::text("Name").not_null())
                .column(
                    ColumnDef::text("Status")
                        .not_null()
                        .enum_values(&["Active", "Inactive", "Archived"]),
                )
                .build()
                .expect("CrudTest schema")
        })
    }

    fn get(&self, property: &str) -> Option<Value> {
        match property {
            "Id" => Some(Value::Text(self.id.clone())),
            "Name" => Some(Value::Text(self.name.clone())),
            "Status" => Some(Value::Text(self.status.clone())),
            "Version" => Some(Value::Integer(self.version)),
            "CreatedTime" => Some(self.created.map_or(Value::Null, Value::DateTime)),
            "LastWriteTime" => Some(self.written.map_or(Value::Null, Value::DateTime)),
            _ => None,
        }
    }

    fn set(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "Id" => self.id = value.as_str().unwrap_or_default().to_string(),
            "Name" => self.name = value.as_str().unwrap_or_default().to_string(),
            "Status" => self.status = value.as_str().unwrap_or_default().to_string(),
            "Version" => self.version = value.as_i64().unwrap_or_default(),
            "CreatedTime" => self.created = value.as_datetime(),
            "LastWriteTime" => self.written = value.as_datetime(),
            _ => {}
        }
        Ok(())
    }

    fn empty() -> Self {
        Self::default()
    }
}

// ── Article: soft-delete version chains ────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub version: i64,
    pub deleted: bool,
    pub created: Option<DateTime<Utc>>,
    pub written: Option<DateTime<Utc>>,
}

impl Article {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Article {
    fn schema() -> &'static TableSchema {
        static SCHEMA: OnceLock<TableSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            TableSchema::builder("Articles")
                .soft_delete()
                .column(ColumnDef::text("Id").primary_key(0).not_null())
                .column(ColumnDef::text("Title").not_null())
                .build()
                .expect("Articles schema")
        })
    }

    fn get(&self, property: &str) -> Option<Value> {
        match property {
            "Id" => Some(Value::Text(self.id.clone())),
            "Title" => Some(Value::Text(self.title.clone())),
            "Version" => Some(Value::Integer(self.version)),
            "IsDeleted" => Some(Value::Bool(self.deleted)),
            "CreatedTime" => Some(self.created.map_or(Value::Null, Value::DateTime)),
            "LastWriteTime" => Some(self.written.map_or(Value::Null, Value::DateTime)),
            _ => None,
        }
    }

    fn set(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "Id" => self.id = value.as_str().unwrap_or_default().to_string(),
            "Title" => self.title = value.as_str().unwrap_or_default().to_string(),
            "Version" => self.version = value.as_i64().unwrap_or_default(),
            "IsDeleted" => self.deleted = value.as_bool().unwrap_or_default(),
            "CreatedTime" => self.created = value.as_datetime(),
            "LastWriteTime" => self.written = value.as_datetime(),
            _ => {}
        }
        Ok(())
    }

    fn empty() -> Self {
        Self::default()
    }
}

// ── Parent / Child: foreign-key cascade ────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parent {
    pub id: String,
    pub version: i64,
    pub created: Option<DateTime<Utc>>,
    pub written: Option<DateTime<Utc>>,
}

impl Parent {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Parent {
    fn schema() -> &'static TableSchema {
        static SCHEMA: OnceLock<TableSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            TableSchema::builder("Parents")
                .column(ColumnDef::text("Id").primary_key(0).not_null())
                .build()
                .expect("Parents schema")
        })
    }

    fn get(&self, property: &str) -> Option<Value> {
        match property {
            "Id" => Some(Value::Text(self.id.clone())),
            "Version" => Some(Value::Integer(self.version)),
            "CreatedTime" => Some(self.created.map_or(Value::Null, Value::DateTime)),
            "LastWriteTime" => Some(self.written.map_or(Value::Null, Value::DateTime)),
            _ => None,
        }
    }

    fn set(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "Id" => self.id = value.as_str().unwrap_or_default().to_string(),
            "Version" => self.version = value.as_i64().unwrap_or_default(),
            "CreatedTime" => self.created = value.as_datetime(),
            "LastWriteTime" => self.written = value.as_datetime(),
            _ => {}
        }
        Ok(())
    }

    fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Child {
    pub id: String,
    pub parent_id: String,
    pub version: i64,
    pub created: Option<DateTime<Utc>>,
    pub written: Option<DateTime<Utc>>,
}

impl Child {
    pub fn new(id: &str, parent_id: &str) -> Self {
        Self {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Child {
    fn schema() -> &'static TableSchema {
        static SCHEMA: OnceLock<TableSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            TableSchema::builder("Children")
                .column(ColumnDef::text("Id").primary_key(0).not_null())
                .column(ColumnDef::text("ParentId").not_null())
                .foreign_key(ForeignKeyDef {
                    name: String::new(),
                    columns: vec!["ParentId".to_string()],
                    referenced_table: "Parents".to_string(),
                    referenced_columns: vec!["Id".to_string()],
                    on_delete: Some(FkAction::Cascade),
                    on_update: None,
                })
                .build()
                .expect("Children schema")
        })
    }

    fn get(&self, property: &str) -> Option<Value> {
        match property {
            "Id" => Some(Value::Text(self.id.clone())),
            "ParentId" => Some(Value::Text(self.parent_id.clone())),
            "Version" => Some(Value::Integer(self.version)),
            "CreatedTime" => Some(self.created.map_or(Value::Null, Value::DateTime)),
            "LastWriteTime" => Some(self.written.map_or(Value::Null, Value::DateTime)),
            _ => None,
        }
    }

    fn set(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "Id" => self.id = value.as_str().unwrap_or_default().to_string(),
            "ParentId" => self.parent_id = value.as_str().unwrap_or_default().to_string(),
            "Version" => self.version = value.as_i64().unwrap_or_default(),
            "CreatedTime" => self.created = value.as_datetime(),
            "LastWriteTime" => self.written = value.as_datetime(),
            _ => {}
        }
        Ok(())
    }

    fn empty() -> Self {
        Self::default()
    }
}

// ── CacheEntry: expiry-enabled table for purge tests ───────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheEntry {
    pub id: String,
    pub payload: String,
    pub expires: Option<DateTime<Utc>>,
    pub version: i64,
    pub created: Option<DateTime<Utc>>,
    pub written: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn new(id: &str, payload: &str) -> Self {
        Self {
            id: id.to_string(),
            payload: payload.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for CacheEntry {
    fn schema() -> &'static TableSchema {
        static SCHEMA: OnceLock<TableSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            TableSchema::builder("CacheEntries")
                .expiry(std::time::Duration::from_secs(3600))
                .column(ColumnDef::text("Id").primary_key(0).not_null())
                .column(ColumnDef::text("Payload").not_null())
                .build()
                .expect("CacheEntries schema")
        })
    }

    fn get(&self, property: &str) -> Option<Value> {
        match property {
            "Id" => Some(Value::Text(self.id.clone())),
            "Payload" => Some(Value::Text(self.payload.clone())),
            "AbsoluteExpiration" => Some(self.expires.map_or(Value::Null, Value::DateTime)),
            "Version" => Some(Value::Integer(self.version)),
            "CreatedTime" => Some(self.created.map_or(Value::Null, Value::DateTime)),
            "LastWriteTime" => Some(self.written.map_or(Value::Null, Value::DateTime)),
            _ => None,
        }
    }

    fn set(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "Id" => self.id = value.as_str().unwrap_or_default().to_string(),
            "Payload" => self.payload = value.as_str().unwrap_or_default().to_string(),
            "AbsoluteExpiration" => self.expires = value.as_datetime(),
            "Version" => self.version = value.as_i64().unwrap_or_default(),
            "CreatedTime" => self.created = value.as_datetime(),
            "LastWriteTime" => self.written = value.as_datetime(),
            _ => {}
        }
        Ok(())
    }

    fn empty() -> Self {
        Self::default()
    }
}
