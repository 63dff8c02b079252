//! # casbin-rule-store
//!
//! Policy storage adapter for Casbin-style enforcers. Rules are kept in
//! `casbin_rule`-shaped tables (`ptype`, `v0`..`v14`) behind a narrow
//! storage-client trait, and each rule category can be routed to its own
//! client and table.
//!
//! The adapter never evaluates rules. It loads them into the enforcer's
//! model, saves the model back as a full replace, and applies incremental
//! changes, with transaction handling that:
//!
//! - commits or rolls back only transactions it opened itself,
//! - joins a caller's transaction only when handed one explicitly,
//! - refuses to write through several clients to a single-writer engine.
//!
//! ## Architecture
//!
//! ```text
//! Enforcer
//!     │
//!     ├── PolicyAdapter / BlockingAdapter (service/)
//!     │       ├── mutation: add / remove / update, batches
//!     │       └── guard: transaction scopes, single-writer check
//!     │
//!     ├── ClientProvider (routing/)
//!     │
//!     ├── codec, RuleRecord, PolicyStore (domain/)
//!     │
//!     └── RuleClient (persistence/)
//!             ├── SqlClient (SQLite, PostgreSQL via sqlx)
//!             └── MemoryClient
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod routing;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{AdapterConfig, AdapterOptions};
pub use error::AdapterError;
pub use persistence::TransactionHandle;
pub use service::{BlockingAdapter, PolicyAdapter};
