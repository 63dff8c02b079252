//! Storage-client seam consumed by the adapter.
//!
//! A [`RuleClient`] is a handle on one logical connection to a rule table.
//! It can run the four commands the adapter needs against its default table
//! or an explicitly qualified one.
//!
//! Transactions are values. [`RuleClient::begin`] returns a new client bound
//! to a fresh transaction; only commands issued through that client run
//! inside it, and only that client can commit or roll it back. A
//! [`TransactionHandle`] keeps the bound client together with the client it
//! was opened on, which is what a caller hands to the adapter to have it
//! join the transaction.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;

use super::query::RuleQuery;
use crate::domain::RuleRecord;
use crate::error::AdapterError;

/// Storage engine family behind a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbEngine {
    /// Embedded, file-locked, one writer at a time.
    Sqlite,
    /// Client/server PostgreSQL.
    Postgres,
    /// In-process engine from [`super::memory`].
    Memory,
}

impl DbEngine {
    /// Derives the engine from a connection URL scheme.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] for unsupported schemes.
    pub fn from_url(url: &str) -> Result<Self, AdapterError> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(AdapterError::Configuration(format!(
                "unsupported database scheme '{other}'"
            ))),
        }
    }

    /// Returns `true` for engines that cannot take concurrent writers on
    /// independent connections.
    #[must_use]
    pub const fn is_single_writer(self) -> bool {
        matches!(self, Self::Sqlite)
    }
}

impl fmt::Display for DbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// Validated `table` or `schema.table` identifier.
///
/// Each part must start with an ASCII letter or underscore and continue
/// with ASCII alphanumerics or underscores, so the name can be spliced into
/// SQL without quoting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName {
    schema: Option<String>,
    table: String,
}

impl TableName {
    /// Parses a plain or schema-qualified table name.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidTable`] if the name has more than two
    /// parts or a part is not a plain identifier.
    pub fn parse(name: &str) -> Result<Self, AdapterError> {
        let mut parts = name.split('.');
        let (schema, table) = match (parts.next(), parts.next(), parts.next()) {
            (Some(table), None, None) => (None, table),
            (Some(schema), Some(table), None) => (Some(schema), table),
            _ => return Err(AdapterError::InvalidTable(name.to_string())),
        };
        if !is_identifier(table) || schema.is_some_and(|s| !is_identifier(s)) {
            return Err(AdapterError::InvalidTable(name.to_string()));
        }
        Ok(Self {
            schema: schema.map(str::to_string),
            table: table.to_string(),
        })
    }

    /// Returns the schema part, if qualified.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Returns the unqualified table part.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.table),
            None => f.write_str(&self.table),
        }
    }
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Commands and transaction control the adapter issues against storage.
///
/// `table` is an optional override; `None` means the client's default
/// table. A client returned by [`RuleClient::begin`] runs every command
/// inside its transaction; any other client runs each command on its own.
#[async_trait]
pub trait RuleClient: Send + Sync + fmt::Debug {
    /// Returns the engine family of the underlying connection.
    fn engine(&self) -> DbEngine;

    /// Returns the client's default table.
    fn default_table(&self) -> &TableName;

    /// Returns `true` if this client is bound to a transaction.
    fn in_transaction(&self) -> bool;

    /// Opens a transaction and returns a client bound to it, with the same
    /// default table.
    ///
    /// The transaction is rolled back if the bound client is dropped
    /// without [`RuleClient::commit`].
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Transaction`] if this client is itself bound
    /// to a transaction or the engine refuses.
    async fn begin(&self) -> Result<Arc<dyn RuleClient>, AdapterError>;

    /// Commits the transaction this client is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Transaction`] if the client is not bound,
    /// the transaction already ended, or the commit fails.
    async fn commit(&self) -> Result<(), AdapterError>;

    /// Rolls back the transaction this client is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Transaction`] if the client is not bound,
    /// the transaction already ended, or the rollback fails.
    async fn rollback(&self) -> Result<(), AdapterError>;

    /// Creates the rule table and its uniqueness constraint if missing.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Storage`] on engine failure.
    async fn ensure_table(&self, table: Option<&TableName>) -> Result<(), AdapterError>;

    /// Returns every row in the table.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Storage`] on engine failure, including a
    /// missing table.
    async fn select(&self, table: Option<&TableName>) -> Result<Vec<RuleRecord>, AdapterError>;

    /// Returns `true` if any row matches `query`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Storage`] on engine failure.
    async fn exists(&self, table: Option<&TableName>, query: &RuleQuery)
    -> Result<bool, AdapterError>;

    /// Inserts `rules`, returning the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UniqueViolation`] when a row collides with an
    /// existing `(ptype, v0..v5)`, [`AdapterError::Storage`] otherwise.
    async fn insert(&self, table: Option<&TableName>, rules: &[RuleRecord])
    -> Result<u64, AdapterError>;

    /// Deletes rows matching `query`, returning the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Storage`] on engine failure.
    async fn delete(&self, table: Option<&TableName>, query: &RuleQuery)
    -> Result<u64, AdapterError>;
}

/// Shared, identity-compared handle on a [`RuleClient`].
///
/// Two handles are equal when they point at the same client object, which
/// is how routers and the save path tell clients apart.
#[derive(Debug, Clone)]
pub struct ClientHandle(Arc<dyn RuleClient>);

impl ClientHandle {
    /// Wraps a client in a new handle.
    #[must_use]
    pub fn new<C: RuleClient + 'static>(client: C) -> Self {
        Self(Arc::new(client))
    }

    /// Wraps an already shared client.
    #[must_use]
    pub fn from_arc(client: Arc<dyn RuleClient>) -> Self {
        Self(client)
    }

    /// Returns an address-based key identifying the client object.
    #[must_use]
    pub fn key(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl Deref for ClientHandle {
    type Target = dyn RuleClient;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for ClientHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ClientHandle {}

impl Hash for ClientHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// A transaction opened by a caller on one client.
///
/// Clones share the transaction. Its owner ends it with
/// [`TransactionHandle::commit`] or [`TransactionHandle::rollback`]; the
/// adapter only ever joins it.
#[derive(Debug, Clone)]
pub struct TransactionHandle {
    origin: ClientHandle,
    bound: ClientHandle,
}

impl TransactionHandle {
    /// Opens a transaction on `client`.
    ///
    /// # Errors
    ///
    /// See [`RuleClient::begin`].
    pub async fn begin(client: &ClientHandle) -> Result<Self, AdapterError> {
        let bound = ClientHandle::from_arc(client.begin().await?);
        Ok(Self {
            origin: client.clone(),
            bound,
        })
    }

    /// Returns the client the transaction was opened on.
    #[must_use]
    pub fn origin(&self) -> &ClientHandle {
        &self.origin
    }

    /// Returns the client bound to the transaction.
    #[must_use]
    pub fn client(&self) -> &ClientHandle {
        &self.bound
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// See [`RuleClient::commit`].
    pub async fn commit(&self) -> Result<(), AdapterError> {
        self.bound.commit().await
    }

    /// Rolls the transaction back.
    ///
    /// # Errors
    ///
    /// See [`RuleClient::rollback`].
    pub async fn rollback(&self) -> Result<(), AdapterError> {
        self.bound.rollback().await
    }
}

pub(crate) fn nested_transaction() -> AdapterError {
    AdapterError::Transaction("nested transactions are not supported".to_string())
}

pub(crate) fn not_in_transaction() -> AdapterError {
    AdapterError::Transaction("client is not bound to a transaction".to_string())
}

pub(crate) fn transaction_ended() -> AdapterError {
    AdapterError::Transaction("transaction already ended".to_string())
}
