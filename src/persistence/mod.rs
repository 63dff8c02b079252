//! Persistence layer: the storage-client seam and its backends.
//!
//! Provides the [`RuleClient`] trait through which the adapter reads and
//! writes rule tables, the [`RuleQuery`] predicates it issues, and two
//! implementations: [`SqlClient`] over `sqlx` (SQLite and PostgreSQL) and
//! the in-process [`MemoryClient`].

pub mod client;
pub mod memory;
pub mod models;
pub mod query;
pub mod sql;

pub use client::{ClientHandle, DbEngine, RuleClient, TableName, TransactionHandle};
pub use memory::{MemoryClient, MemoryDatabase};
pub use models::RuleRow;
pub use query::{FieldMatch, RuleQuery};
pub use sql::{SqlClient, SqlConnection};
