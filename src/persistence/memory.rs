//! In-process storage engine.
//!
//! [`MemoryDatabase`] plays the part of one physical connection: it holds
//! named tables and enforces the `(ptype, v0..v5)` uniqueness constraint.
//! [`MemoryClient`] is a handle on a database with its own default table.
//!
//! A transaction holds the database exclusively until it ends, so commands
//! from clients outside it wait rather than interleave, the way a
//! single-writer engine serializes writers. It keeps a snapshot taken at
//! begin and restores it on rollback or when dropped uncommitted.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::client::{
    DbEngine, RuleClient, TableName, nested_transaction, not_in_transaction, transaction_ended,
};
use super::query::RuleQuery;
use crate::domain::RuleRecord;
use crate::error::AdapterError;

type Tables = BTreeMap<TableName, Vec<RuleRecord>>;

#[derive(Debug, Default)]
struct MemoryState {
    tables: Tables,
    next_id: i64,
}

impl MemoryState {
    fn table(&self, name: &TableName) -> Result<&Vec<RuleRecord>, AdapterError> {
        self.tables
            .get(name)
            .ok_or_else(|| AdapterError::Storage(format!("no such table: {name}")))
    }

    fn table_mut(&mut self, name: &TableName) -> Result<&mut Vec<RuleRecord>, AdapterError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| AdapterError::Storage(format!("no such table: {name}")))
    }
}

/// Exclusive hold on the database for one transaction.
#[derive(Debug)]
struct MemoryTransaction {
    state: OwnedMutexGuard<MemoryState>,
    undo: Option<(Tables, i64)>,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Some((tables, next_id)) = self.undo.take() {
            self.state.tables = tables;
            self.state.next_id = next_id;
        }
    }
}

type TransactionSlot = Arc<Mutex<Option<MemoryTransaction>>>;

/// Shared in-process database.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    /// Creates an empty database with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a client on this database with `table` as its default table.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidTable`] if `table` is not a valid name.
    pub fn client(&self, table: &str) -> Result<MemoryClient, AdapterError> {
        Ok(MemoryClient {
            database: self.clone(),
            table: TableName::parse(table)?,
            tx: None,
        })
    }

    /// Returns the number of rows in `table`, or `None` if it does not
    /// exist. Waits for an open transaction to end.
    pub async fn row_count(&self, table: &TableName) -> Option<usize> {
        self.state.lock().await.tables.get(table).map(Vec::len)
    }

    /// Returns a copy of the rows in `table`. Waits for an open transaction
    /// to end.
    pub async fn rows(&self, table: &TableName) -> Vec<RuleRecord> {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

/// Handle on a [`MemoryDatabase`] with a default table, optionally bound to
/// a transaction.
#[derive(Debug, Clone)]
pub struct MemoryClient {
    database: MemoryDatabase,
    table: TableName,
    tx: Option<TransactionSlot>,
}

impl MemoryClient {
    /// Returns the database this client writes to.
    #[must_use]
    pub fn database(&self) -> &MemoryDatabase {
        &self.database
    }

    /// Opens a transaction and returns a client bound to it. Waits while
    /// another transaction holds the database.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Transaction`] if this client is already
    /// bound to a transaction.
    pub async fn transaction(&self) -> Result<Self, AdapterError> {
        if self.tx.is_some() {
            return Err(nested_transaction());
        }
        let state = Arc::clone(&self.database.state).lock_owned().await;
        let undo = Some((state.tables.clone(), state.next_id));
        Ok(Self {
            database: self.database.clone(),
            table: self.table.clone(),
            tx: Some(Arc::new(Mutex::new(Some(MemoryTransaction { state, undo })))),
        })
    }

    async fn finish(&self, commit: bool) -> Result<(), AdapterError> {
        let slot = self.tx.as_ref().ok_or_else(not_in_transaction)?;
        let mut tx = slot.lock().await.take().ok_or_else(transaction_ended)?;
        if commit {
            tx.undo = None;
        }
        drop(tx);
        Ok(())
    }

    /// Runs `op` on the transaction's state when bound, otherwise on the
    /// database directly.
    async fn with_state<T, F>(&self, op: F) -> Result<T, AdapterError>
    where
        F: FnOnce(&mut MemoryState) -> Result<T, AdapterError> + Send,
        T: Send,
    {
        match &self.tx {
            Some(slot) => {
                let mut slot = slot.lock().await;
                let tx = slot.as_mut().ok_or_else(transaction_ended)?;
                op(&mut *tx.state)
            }
            None => op(&mut *self.database.state.lock().await),
        }
    }

    fn resolve<'a>(&'a self, table: Option<&'a TableName>) -> &'a TableName {
        table.unwrap_or(&self.table)
    }
}

#[async_trait]
impl RuleClient for MemoryClient {
    fn engine(&self) -> DbEngine {
        DbEngine::Memory
    }

    fn default_table(&self) -> &TableName {
        &self.table
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn begin(&self) -> Result<Arc<dyn RuleClient>, AdapterError> {
        Ok(Arc::new(self.transaction().await?))
    }

    async fn commit(&self) -> Result<(), AdapterError> {
        self.finish(true).await
    }

    async fn rollback(&self) -> Result<(), AdapterError> {
        self.finish(false).await
    }

    async fn ensure_table(&self, table: Option<&TableName>) -> Result<(), AdapterError> {
        let name = self.resolve(table).clone();
        self.with_state(|state| {
            state.tables.entry(name).or_default();
            Ok(())
        })
        .await
    }

    async fn select(&self, table: Option<&TableName>) -> Result<Vec<RuleRecord>, AdapterError> {
        let name = self.resolve(table);
        self.with_state(|state| state.table(name).cloned()).await
    }

    async fn exists(
        &self,
        table: Option<&TableName>,
        query: &RuleQuery,
    ) -> Result<bool, AdapterError> {
        let name = self.resolve(table);
        self.with_state(|state| Ok(state.table(name)?.iter().any(|r| query.matches(r))))
            .await
    }

    async fn insert(
        &self,
        table: Option<&TableName>,
        rules: &[RuleRecord],
    ) -> Result<u64, AdapterError> {
        let name = self.resolve(table);
        self.with_state(|state| {
            let mut next_id = state.next_id;
            let rows = state.table_mut(name)?;

            // Statement-level atomicity: validate the whole batch before writing.
            let mut staged: Vec<RuleRecord> = Vec::with_capacity(rules.len());
            for rule in rules {
                let collides = rows
                    .iter()
                    .chain(staged.iter())
                    .any(|r| r.same_identity(rule));
                if collides {
                    return Err(AdapterError::UniqueViolation(format!(
                        "UNIQUE constraint failed: {name}.ptype, {name}.v0..v5 ({rule})"
                    )));
                }
                next_id += 1;
                let mut row = rule.clone();
                row.id = Some(next_id);
                staged.push(row);
            }

            let written = staged.len() as u64;
            rows.extend(staged);
            state.next_id = next_id;
            Ok(written)
        })
        .await
    }

    async fn delete(
        &self,
        table: Option<&TableName>,
        query: &RuleQuery,
    ) -> Result<u64, AdapterError> {
        let name = self.resolve(table);
        self.with_state(|state| {
            let rows = state.table_mut(name)?;
            let before = rows.len();
            rows.retain(|r| !query.matches(r));
            Ok((before - rows.len()) as u64)
        })
        .await
    }
}
