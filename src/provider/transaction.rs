//! Ordered transactional batch scope.
//!
//! A scope borrows the provider's connection under one immediate
//! transaction. Operations are queued and executed in insertion order by
//! [`TransactionScope::commit`]; the first failure aborts everything.
//! Dropping the scope without committing rolls the transaction back.
//! The store has no nested transactions, so scopes never nest.

use chrono::Utc;
use rusqlite::Transaction;

use crate::caller::CallerInfo;
use crate::error::Result;
use crate::mapper::{Entity, Mapper};
use crate::provider::audit;
use crate::provider::sqlite::{
    delete_in_tx, display_key, execute_insert, prepare_for_insert, update_in_tx,
};
use crate::value::Value;

enum ScopeOp<E> {
    Insert(E),
    Update(E),
    Delete(Value),
}

/// An ordered list of operations committed or rolled back as a unit.
pub struct TransactionScope<'a, E: Entity> {
    tx: Transaction<'a>,
    mapper: &'a Mapper<E>,
    caller: CallerInfo,
    ops: Vec<ScopeOp<E>>,
}

impl<'a, E: Entity> TransactionScope<'a, E> {
    pub(super) fn new(tx: Transaction<'a>, mapper: &'a Mapper<E>, caller: CallerInfo) -> Self {
        Self {
            tx,
            mapper,
            caller,
            ops: Vec::new(),
        }
    }

    /// Queue an insert.
    pub fn add_insert(&mut self, entity: E) {
        self.ops.push(ScopeOp::Insert(entity));
    }

    /// Queue a versioned update.
    pub fn add_update(&mut self, entity: E) {
        self.ops.push(ScopeOp::Update(entity));
    }

    /// Queue a delete by key.
    pub fn add_delete(&mut self, id: Value) {
        self.ops.push(ScopeOp::Delete(id));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Execute the queued operations in insertion order and commit.
    ///
    /// All operations share one timestamp. The first failure returns the
    /// error; the transaction rolls back when the scope drops.
    ///
    /// # Errors
    ///
    /// The failing operation's error, or the driver's commit error.
    pub fn commit(self) -> Result<()> {
        let now = Utc::now();
        let table = self.mapper.schema().table_name().to_string();

        for op in &self.ops {
            match op {
                ScopeOp::Insert(entity) => {
                    let stored = prepare_for_insert(self.mapper, entity, now)?;
                    execute_insert(&self.tx, self.mapper, &stored)?;
                    let key = self.mapper.key_of(&stored)?;
                    audit::record(
                        &self.tx,
                        "create",
                        &table,
                        Some(&display_key(&key)),
                        &self.caller,
                    )?;
                }
                ScopeOp::Update(entity) => {
                    let stored = update_in_tx(&self.tx, self.mapper, entity, now)?;
                    let key = self.mapper.key_of(&stored)?;
                    audit::record(
                        &self.tx,
                        "update",
                        &table,
                        Some(&display_key(&key)),
                        &self.caller,
                    )?;
                }
                ScopeOp::Delete(id) => {
                    if delete_in_tx(&self.tx, self.mapper, id, now)? {
                        audit::record(
                            &self.tx,
                            "delete",
                            &table,
                            Some(&display_key(id)),
                            &self.caller,
                        )?;
                    }
                }
            }
        }

        self.tx.commit()?;
        Ok(())
    }
}
