//! The routing seam and the resolved storage target.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::persistence::{ClientHandle, TableName};

/// Resolved storage location for a category: a client plus an optional
/// table override.
#[derive(Debug, Clone)]
pub struct Target {
    /// Client that owns the rows.
    pub client: ClientHandle,
    /// Table override; `None` means the client's default table.
    pub table: Option<TableName>,
}

impl Target {
    /// Creates a target on the client's default table.
    #[must_use]
    pub fn new(client: ClientHandle) -> Self {
        Self {
            client,
            table: None,
        }
    }

    /// Creates a target with an explicit table.
    #[must_use]
    pub fn with_table(client: ClientHandle, table: Option<TableName>) -> Self {
        Self { client, table }
    }

    /// Returns the table rows actually live in.
    #[must_use]
    pub fn resolved_table(&self) -> &TableName {
        self.table
            .as_ref()
            .unwrap_or_else(|| self.client.default_table())
    }
}

// Two targets are the same when they name the same client object and the
// same physical table, whether the table came from an override or not.
impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.client == other.client && self.resolved_table() == other.resolved_table()
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.client.hash(state);
        self.resolved_table().hash(state);
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resolved_table(), self.client.engine())
    }
}

/// Maps rule categories to storage clients and tables.
pub trait ClientProvider: Send + Sync + fmt::Debug {
    /// Returns the client that stores `category`.
    fn client_for(&self, category: &str) -> ClientHandle;

    /// Returns the table override for `category`, if any.
    fn table_for(&self, _category: &str) -> Option<TableName> {
        None
    }

    /// Returns every distinct client, in first-seen order.
    fn all_clients(&self) -> Vec<ClientHandle>;

    /// Returns `true` if every client rides on one physical connection, so
    /// one transaction spans all of them.
    fn shares_connection(&self) -> bool;

    /// Returns the targets of every table override the provider knows of.
    fn table_overrides(&self) -> Vec<Target> {
        Vec::new()
    }

    /// Resolves `category` to its target.
    fn target_for(&self, category: &str) -> Target {
        Target::with_table(self.client_for(category), self.table_for(category))
    }
}

/// Returns every distinct target of `provider`: each client's default table
/// followed by the known table overrides, in first-seen order.
#[must_use]
pub fn distinct_targets(provider: &dyn ClientProvider) -> Vec<Target> {
    let candidates = provider
        .all_clients()
        .into_iter()
        .map(Target::new)
        .chain(provider.table_overrides());
    dedup_first_seen(candidates)
}

/// Removes later duplicates while keeping first-seen order.
pub(crate) fn dedup_first_seen<T: PartialEq>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut unique: Vec<T> = Vec::new();
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    unique
}
