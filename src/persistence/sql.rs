//! SQL implementation of [`RuleClient`] over the `sqlx` `Any` driver.
//!
//! [`SqlConnection`] owns an `AnyPool`. A [`SqlClient`] pairs a shared
//! connection with a default table and runs each statement on the pool,
//! unless it was returned by [`RuleClient::begin`]: then it holds its own
//! `sqlx` transaction and every statement runs there.
//!
//! Statements use `$N` placeholders, which both the PostgreSQL and SQLite
//! drivers accept. Table names are spliced in only after [`TableName`]
//! validation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{Any, AnyPoolOptions, install_default_drivers};
use sqlx::{AnyConnection, AnyPool, Transaction};
use tokio::sync::Mutex;

use super::client::{
    DbEngine, RuleClient, TableName, nested_transaction, not_in_transaction, transaction_ended,
};
use super::models::{COLUMNS, RuleRow};
use super::query::{FieldMatch, RuleQuery};
use crate::config::AdapterConfig;
use crate::domain::{IDENTITY_FIELDS, MAX_FIELDS, RuleRecord};
use crate::error::{AdapterError, map_sqlx_error};

/// Rows per multi-row `INSERT`; keeps the bind count under SQLite's
/// historical limit of 999 parameters.
const INSERT_CHUNK: usize = 60;

type TransactionSlot = Arc<Mutex<Option<Transaction<'static, Any>>>>;

/// Pooled database connection.
pub struct SqlConnection {
    pool: AnyPool,
    engine: DbEngine,
}

impl fmt::Debug for SqlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlConnection")
            .field("engine", &self.engine)
            .field("pool", &self.pool)
            .finish()
    }
}

impl SqlConnection {
    /// Opens a pool for `config.database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] for unsupported URL schemes
    /// and [`AdapterError::Storage`] if the pool cannot connect.
    pub async fn connect(config: &AdapterConfig) -> Result<Arc<Self>, AdapterError> {
        install_default_drivers();
        let engine = DbEngine::from_url(&config.database_url)?;
        let pool = AnyPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(map_sqlx_error)?;

        tracing::info!(%engine, "database pool connected");
        Ok(Arc::new(Self::from_pool(pool, engine)))
    }

    /// Opens a pool for `url` with default pool settings.
    ///
    /// # Errors
    ///
    /// See [`SqlConnection::connect`].
    pub async fn connect_url(url: &str) -> Result<Arc<Self>, AdapterError> {
        Self::connect(&AdapterConfig::new(url)).await
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: AnyPool, engine: DbEngine) -> Self {
        Self { pool, engine }
    }

    /// Returns the engine family.
    #[must_use]
    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

/// [`RuleClient`] over a shared [`SqlConnection`].
#[derive(Clone)]
pub struct SqlClient {
    conn: Arc<SqlConnection>,
    table: TableName,
    tx: Option<TransactionSlot>,
}

impl fmt::Debug for SqlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlClient")
            .field("conn", &self.conn)
            .field("table", &self.table)
            .field("in_transaction", &self.tx.is_some())
            .finish()
    }
}

impl SqlClient {
    /// Creates a client on `conn` with `table` as its default table.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidTable`] if `table` is not a valid name.
    pub fn new(conn: Arc<SqlConnection>, table: &str) -> Result<Self, AdapterError> {
        Ok(Self {
            conn,
            table: TableName::parse(table)?,
            tx: None,
        })
    }

    /// Connects with `config` and returns a client on its default table.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`SqlConnection::connect`] and
    /// [`AdapterConfig::table_name`].
    pub async fn connect(config: &AdapterConfig) -> Result<Self, AdapterError> {
        let table = config.table_name()?;
        let conn = SqlConnection::connect(config).await?;
        Ok(Self {
            conn,
            table,
            tx: None,
        })
    }

    /// Returns the shared connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<SqlConnection> {
        &self.conn
    }

    /// Begins a transaction on a pooled connection and returns a client
    /// bound to it.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Transaction`] if this client is already
    /// bound or the database refuses.
    pub async fn transaction(&self) -> Result<Self, AdapterError> {
        if self.tx.is_some() {
            return Err(nested_transaction());
        }
        let tx = self
            .conn
            .pool
            .begin()
            .await
            .map_err(|e| AdapterError::Transaction(e.to_string()))?;
        Ok(Self {
            conn: Arc::clone(&self.conn),
            table: self.table.clone(),
            tx: Some(Arc::new(Mutex::new(Some(tx)))),
        })
    }

    async fn take_transaction(&self) -> Result<Transaction<'static, Any>, AdapterError> {
        let slot = self.tx.as_ref().ok_or_else(not_in_transaction)?;
        slot.lock().await.take().ok_or_else(transaction_ended)
    }

    /// Runs one statement, inside the bound transaction if there is one.
    async fn execute(&self, sql: &str, binds: Vec<String>) -> Result<u64, AdapterError> {
        let mut query = sqlx::query::<Any>(sql);
        for value in binds {
            query = query.bind(value);
        }
        let result = match &self.tx {
            Some(slot) => {
                let mut slot = slot.lock().await;
                let tx = slot.as_mut().ok_or_else(transaction_ended)?;
                query.execute(&mut **tx).await
            }
            None => query.execute(&self.conn.pool).await,
        };
        result.map(|r| r.rows_affected()).map_err(map_sqlx_error)
    }

    fn resolve<'a>(&'a self, table: Option<&'a TableName>) -> &'a TableName {
        table.unwrap_or(&self.table)
    }
}

#[async_trait]
impl RuleClient for SqlClient {
    fn engine(&self) -> DbEngine {
        self.conn.engine
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
        self.take_transaction()
            .await?
            .commit()
            .await
            .map_err(|e| AdapterError::Transaction(e.to_string()))
    }

    async fn rollback(&self) -> Result<(), AdapterError> {
        self.take_transaction()
            .await?
            .rollback()
            .await
            .map_err(|e| AdapterError::Transaction(e.to_string()))
    }

    async fn ensure_table(&self, table: Option<&TableName>) -> Result<(), AdapterError> {
        let name = self.resolve(table);
        let engine = self.conn.engine;
        if engine == DbEngine::Postgres
            && let Some(schema) = name.schema()
        {
            self.execute(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"), Vec::new())
                .await?;
        }
        self.execute(&create_table_sql(engine, name), Vec::new())
            .await?;
        self.execute(&unique_index_sql(engine, name), Vec::new())
            .await?;
        tracing::debug!(table = %name, "rule table ensured");
        Ok(())
    }

    async fn select(&self, table: Option<&TableName>) -> Result<Vec<RuleRecord>, AdapterError> {
        let sql = format!("SELECT {COLUMNS} FROM {} ORDER BY id", self.resolve(table));
        let query = sqlx::query_as::<Any, RuleRow>(&sql);
        let rows = match &self.tx {
            Some(slot) => {
                let mut slot = slot.lock().await;
                let tx = slot.as_mut().ok_or_else(transaction_ended)?;
                query.fetch_all(&mut **tx).await
            }
            None => query.fetch_all(&self.conn.pool).await,
        }
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(RuleRecord::from).collect())
    }

    async fn exists(
        &self,
        table: Option<&TableName>,
        query: &RuleQuery,
    ) -> Result<bool, AdapterError> {
        let (clause, binds) = where_clause(query);
        let sql = format!("SELECT COUNT(*) FROM {}{clause}", self.resolve(table));
        let mut scalar = sqlx::query_scalar::<Any, i64>(&sql);
        for value in binds {
            scalar = scalar.bind(value);
        }
        let count = match &self.tx {
            Some(slot) => {
                let mut slot = slot.lock().await;
                let tx = slot.as_mut().ok_or_else(transaction_ended)?;
                scalar.fetch_one(&mut **tx).await
            }
            None => scalar.fetch_one(&self.conn.pool).await,
        }
        .map_err(map_sqlx_error)?;

        Ok(count > 0)
    }

    async fn insert(
        &self,
        table: Option<&TableName>,
        rules: &[RuleRecord],
    ) -> Result<u64, AdapterError> {
        let name = self.resolve(table);
        if let Some(slot) = &self.tx {
            let mut slot = slot.lock().await;
            let tx = slot.as_mut().ok_or_else(transaction_ended)?;
            return insert_rows(&mut **tx, name, rules).await;
        }
        if rules.len() <= INSERT_CHUNK {
            let mut conn = self.conn.pool.acquire().await.map_err(map_sqlx_error)?;
            return insert_rows(&mut *conn, name, rules).await;
        }

        // Several statements: run them in a private transaction so the batch
        // lands as a whole or not at all.
        let mut tx = self.conn.pool.begin().await.map_err(map_sqlx_error)?;
        let written = insert_rows(&mut *tx, name, rules).await?;
        tx.commit()
            .await
            .map_err(|e| AdapterError::Transaction(e.to_string()))?;
        Ok(written)
    }

    async fn delete(
        &self,
        table: Option<&TableName>,
        query: &RuleQuery,
    ) -> Result<u64, AdapterError> {
        let (clause, binds) = where_clause(query);
        let sql = format!("DELETE FROM {}{clause}", self.resolve(table));
        self.execute(&sql, binds).await
    }
}

async fn insert_rows(
    conn: &mut AnyConnection,
    table: &TableName,
    rules: &[RuleRecord],
) -> Result<u64, AdapterError> {
    let mut written = 0;
    for chunk in rules.chunks(INSERT_CHUNK) {
        let sql = insert_sql(table, chunk.len());
        let mut query = sqlx::query::<Any>(&sql);
        for rule in chunk {
            query = query.bind(rule.ptype.clone());
            for value in &rule.fields {
                query = query.bind(value.clone());
            }
        }
        written += query
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();
    }
    tracing::debug!(%table, rows = written, "rules inserted");
    Ok(written)
}

fn value_columns() -> String {
    (0..MAX_FIELDS)
        .map(|i| format!("v{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_table_sql(engine: DbEngine, table: &TableName) -> String {
    let id = match engine {
        DbEngine::Postgres => "id BIGSERIAL PRIMARY KEY",
        DbEngine::Sqlite | DbEngine::Memory => "id INTEGER PRIMARY KEY AUTOINCREMENT",
    };
    let values: String = (0..MAX_FIELDS)
        .map(|i| format!(", v{i} VARCHAR(254)"))
        .collect();
    format!("CREATE TABLE IF NOT EXISTS {table} ({id}, ptype VARCHAR(254) NOT NULL{values})")
}

/// Unique index over `ptype` and `v0..v5` with absent values folded to `''`.
///
/// A plain `UNIQUE` constraint treats NULLs as distinct, so rules that leave
/// identity columns unset would never collide. PostgreSQL qualifies the
/// table and places the index in its schema; SQLite qualifies the index
/// name instead.
fn unique_index_sql(engine: DbEngine, table: &TableName) -> String {
    let name = format!("ux_{}_identity", table.table());
    let (index, on) = match (engine, table.schema()) {
        (DbEngine::Sqlite, Some(schema)) => (format!("{schema}.{name}"), table.table().to_string()),
        _ => (name, table.to_string()),
    };
    let identity: String = (0..IDENTITY_FIELDS)
        .map(|i| format!(", (COALESCE(v{i}, ''))"))
        .collect();
    format!("CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {on} (ptype{identity})")
}

fn insert_sql(table: &TableName, rows: usize) -> String {
    let width = MAX_FIELDS + 1;
    let tuples = (0..rows)
        .map(|row| {
            let params = (1..=width)
                .map(|col| format!("${}", row * width + col))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({params})")
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} (ptype, {}) VALUES {tuples}",
        value_columns()
    )
}

/// Renders a [`RuleQuery`] to a `WHERE` clause (empty when unconstrained)
/// and its bind values in placeholder order.
fn where_clause(query: &RuleQuery) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();
    if let Some(ptype) = query.ptype() {
        binds.push(ptype.to_string());
        conditions.push(format!("ptype = ${}", binds.len()));
    }
    for (index, test) in query.fields() {
        match test {
            FieldMatch::Equals(value) => {
                binds.push(value.clone());
                conditions.push(format!("v{index} = ${}", binds.len()));
            }
            FieldMatch::IsNull => conditions.push(format!("v{index} IS NULL")),
        }
    }
    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}
