//! Persistence provider layer.
//!
//! This module owns all data access:
//! - One short-lived immediate transaction per write
//! - Soft-delete version chains with optimistic concurrency
//! - Transient-fault retry around every write transaction
//! - Audit records committed with the data they describe
//!
//! # Submodules
//!
//! - [`audit`] - shared audit-record table
//! - [`sqlite`] - the provider implementation
//! - [`transaction`] - ordered transactional batch scope

pub mod audit;
pub mod sqlite;
pub mod transaction;

pub use sqlite::{
    DEFAULT_BATCH_SIZE, GetOptions, Provider, ProviderState, PurgeMode, PurgeOptions,
};
pub use transaction::TransactionScope;
