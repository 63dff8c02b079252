//! Transaction safety: single-writer rejection and scoped transactions that
//! never commit or roll back a transaction they did not open.
//!
//! A scope hands out the client its work must go through. When it opened
//! the transaction, that is the bound client it owns; when the caller's
//! client is already bound, it is that client, left for the caller to end.

use crate::error::AdapterError;
use crate::persistence::{ClientHandle, TransactionHandle};
use crate::routing::Target;
use crate::routing::provider::dedup_first_seen;

/// Returns `true` if `client` is bound to a transaction its caller opened.
#[must_use]
pub fn is_in_external_transaction(client: &ClientHandle) -> bool {
    client.in_transaction()
}

/// Rejects writes that would need independent connections to a
/// single-writer engine.
///
/// # Errors
///
/// Returns [`AdapterError::Configuration`] when `clients` holds more than
/// one distinct client and any of them runs on a single-writer engine.
pub fn ensure_single_writer_safe(clients: &[ClientHandle]) -> Result<(), AdapterError> {
    let distinct = dedup_first_seen(clients.iter());
    if distinct.len() < 2 {
        return Ok(());
    }
    if let Some(client) = distinct.iter().find(|c| c.engine().is_single_writer()) {
        return Err(AdapterError::Configuration(format!(
            "{} allows one writer at a time; {} separate clients cannot write in one \
             operation, route every category through a single client",
            client.engine(),
            distinct.len()
        )));
    }
    Ok(())
}

/// A transaction on one client that remembers whether it opened it.
///
/// A scope that joined a caller's transaction leaves it alone on both
/// commit and rollback.
#[derive(Debug)]
pub struct TransactionScope {
    client: ClientHandle,
    owned: Option<TransactionHandle>,
}

impl TransactionScope {
    /// Joins `client` if it is bound to a transaction, or begins one on it.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Transaction`] if a new transaction cannot be
    /// started.
    pub async fn begin(client: &ClientHandle) -> Result<Self, AdapterError> {
        let scope = if is_in_external_transaction(client) {
            Self {
                client: client.clone(),
                owned: None,
            }
        } else {
            let tx = TransactionHandle::begin(client).await?;
            Self {
                client: tx.client().clone(),
                owned: Some(tx),
            }
        };
        tracing::debug!(engine = %client.engine(), owned = scope.is_owned(), "transaction scope opened");
        Ok(scope)
    }

    /// Returns the client bound to the scope's transaction.
    #[must_use]
    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    /// Redirects `target` to this scope's client, keeping its table.
    #[must_use]
    pub fn bind(&self, target: &Target) -> Target {
        Target::with_table(self.client.clone(), Some(target.resolved_table().clone()))
    }

    /// Returns `true` if this scope began the transaction.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.owned.is_some()
    }

    /// Commits the transaction if this scope owns it.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Transaction`] if the commit fails.
    pub async fn commit(self) -> Result<(), AdapterError> {
        if let Some(tx) = self.owned {
            tx.commit().await?;
        }
        Ok(())
    }

    /// Rolls the transaction back if this scope owns it.
    ///
    /// A failed rollback is logged rather than returned so the error that
    /// caused it is the one the caller sees.
    pub async fn rollback(self) {
        let Some(tx) = self.owned else {
            return;
        };
        if let Err(e) = tx.rollback().await {
            tracing::warn!(engine = %self.client.engine(), error = %e, "rollback failed");
        }
    }

    /// Commits on `Ok`, rolls back on `Err`, and passes `result` through.
    ///
    /// # Errors
    ///
    /// Returns the error in `result`, or the commit error.
    pub async fn finish<T>(self, result: Result<T, AdapterError>) -> Result<T, AdapterError> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                self.rollback().await;
                Err(e)
            }
        }
    }
}
