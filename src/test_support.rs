//! Client wrappers for exercising failure paths in unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::domain::RuleRecord;
use crate::error::AdapterError;
use crate::persistence::{DbEngine, MemoryClient, RuleClient, RuleQuery, TableName};

/// Wraps a [`MemoryClient`], optionally reporting another engine and
/// failing selected commands. Clients bound to a transaction keep the same
/// faults and share the insert counter.
#[derive(Debug)]
pub(crate) struct FaultyClient {
    inner: MemoryClient,
    engine: DbEngine,
    failing_insert_table: Option<TableName>,
    failing_select: bool,
    inserts: Arc<AtomicUsize>,
}

impl FaultyClient {
    pub(crate) fn new(inner: MemoryClient) -> Self {
        Self {
            inner,
            engine: DbEngine::Memory,
            failing_insert_table: None,
            failing_select: false,
            inserts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_engine(mut self, engine: DbEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Makes every insert into `table` fail with a storage error.
    pub(crate) fn failing_inserts_into(mut self, table: TableName) -> Self {
        self.failing_insert_table = Some(table);
        self
    }

    pub(crate) fn failing_selects(mut self) -> Self {
        self.failing_select = true;
        self
    }

    pub(crate) fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleClient for FaultyClient {
    fn engine(&self) -> DbEngine {
        self.engine
    }

    fn default_table(&self) -> &TableName {
        self.inner.default_table()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    async fn begin(&self) -> Result<Arc<dyn RuleClient>, AdapterError> {
        Ok(Arc::new(Self {
            inner: self.inner.transaction().await?,
            engine: self.engine,
            failing_insert_table: self.failing_insert_table.clone(),
            failing_select: self.failing_select,
            inserts: Arc::clone(&self.inserts),
        }))
    }

    async fn commit(&self) -> Result<(), AdapterError> {
        self.inner.commit().await
    }

    async fn rollback(&self) -> Result<(), AdapterError> {
        self.inner.rollback().await
    }

    async fn ensure_table(&self, table: Option<&TableName>) -> Result<(), AdapterError> {
        self.inner.ensure_table(table).await
    }

    async fn select(&self, table: Option<&TableName>) -> Result<Vec<RuleRecord>, AdapterError> {
        if self.failing_select {
            return Err(AdapterError::Storage("connection reset".to_string()));
        }
        self.inner.select(table).await
    }

    async fn exists(
        &self,
        table: Option<&TableName>,
        query: &RuleQuery,
    ) -> Result<bool, AdapterError> {
        self.inner.exists(table, query).await
    }

    async fn insert(
        &self,
        table: Option<&TableName>,
        rules: &[RuleRecord],
    ) -> Result<u64, AdapterError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let target = table.unwrap_or_else(|| self.inner.default_table());
        if self.failing_insert_table.as_ref() == Some(target) {
            return Err(AdapterError::Storage(format!("disk I/O error on {target}")));
        }
        self.inner.insert(table, rules).await
    }

    async fn delete(
        &self,
        table: Option<&TableName>,
        query: &RuleQuery,
    ) -> Result<u64, AdapterError> {
        self.inner.delete(table, query).await
    }
}
