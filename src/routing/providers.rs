//! Bundled [`ClientProvider`] implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::provider::{ClientProvider, Target, dedup_first_seen};
use crate::domain::is_grouping;
use crate::persistence::{ClientHandle, TableName, TransactionHandle};

/// Routes every category to one client.
#[derive(Debug, Clone)]
pub struct SingleClientProvider {
    client: ClientHandle,
}

impl SingleClientProvider {
    /// Creates a provider around `client`.
    #[must_use]
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

impl ClientProvider for SingleClientProvider {
    fn client_for(&self, _category: &str) -> ClientHandle {
        self.client.clone()
    }

    fn all_clients(&self) -> Vec<ClientHandle> {
        vec![self.client.clone()]
    }

    fn shares_connection(&self) -> bool {
        true
    }
}

/// Splits policy categories (`p*`) from grouping categories (`g*`).
///
/// Categories starting with `g`, in either case, go to the grouping client;
/// everything else goes to the policy client. Each side may carry a table
/// override.
#[derive(Debug, Clone)]
pub struct PolicyTypeProvider {
    policy: ClientHandle,
    grouping: ClientHandle,
    policy_table: Option<TableName>,
    grouping_table: Option<TableName>,
    shares_connection: bool,
}

impl PolicyTypeProvider {
    /// Creates a provider with separate policy and grouping clients. The
    /// clients are assumed to use separate connections.
    #[must_use]
    pub fn new(policy: ClientHandle, grouping: ClientHandle) -> Self {
        Self {
            policy,
            grouping,
            policy_table: None,
            grouping_table: None,
            shares_connection: false,
        }
    }

    /// Declares whether both clients ride on one physical connection.
    #[must_use]
    pub fn sharing_connection(mut self, shares: bool) -> Self {
        self.shares_connection = shares;
        self
    }

    /// Sets table overrides for the policy and grouping sides.
    #[must_use]
    pub fn with_tables(
        mut self,
        policy_table: Option<TableName>,
        grouping_table: Option<TableName>,
    ) -> Self {
        self.policy_table = policy_table;
        self.grouping_table = grouping_table;
        self
    }
}

impl ClientProvider for PolicyTypeProvider {
    fn client_for(&self, category: &str) -> ClientHandle {
        if is_grouping(category) {
            self.grouping.clone()
        } else {
            self.policy.clone()
        }
    }

    fn table_for(&self, category: &str) -> Option<TableName> {
        if is_grouping(category) {
            self.grouping_table.clone()
        } else {
            self.policy_table.clone()
        }
    }

    fn all_clients(&self) -> Vec<ClientHandle> {
        dedup_first_seen([self.policy.clone(), self.grouping.clone()])
    }

    fn shares_connection(&self) -> bool {
        self.shares_connection
    }

    fn table_overrides(&self) -> Vec<Target> {
        let policy = self
            .policy_table
            .clone()
            .map(|t| Target::with_table(self.policy.clone(), Some(t)));
        let grouping = self
            .grouping_table
            .clone()
            .map(|t| Target::with_table(self.grouping.clone(), Some(t)));
        policy.into_iter().chain(grouping).collect()
    }
}

/// Explicit category-to-client map with a fallback client.
#[derive(Debug, Clone)]
pub struct CustomMappingProvider {
    default: ClientHandle,
    clients: BTreeMap<String, ClientHandle>,
    tables: BTreeMap<String, TableName>,
    shares_connection: bool,
}

impl CustomMappingProvider {
    /// Creates a provider that sends unmapped categories to `default`.
    #[must_use]
    pub fn new(default: ClientHandle) -> Self {
        Self {
            default,
            clients: BTreeMap::new(),
            tables: BTreeMap::new(),
            shares_connection: false,
        }
    }

    /// Routes `category` to `client`.
    #[must_use]
    pub fn route(mut self, category: &str, client: ClientHandle) -> Self {
        self.clients.insert(category.to_string(), client);
        self
    }

    /// Stores `category` in `table` on whichever client it routes to.
    #[must_use]
    pub fn route_table(mut self, category: &str, table: TableName) -> Self {
        self.tables.insert(category.to_string(), table);
        self
    }

    /// Declares whether all clients ride on one physical connection.
    #[must_use]
    pub fn sharing_connection(mut self, shares: bool) -> Self {
        self.shares_connection = shares;
        self
    }
}

impl ClientProvider for CustomMappingProvider {
    fn client_for(&self, category: &str) -> ClientHandle {
        self.clients
            .get(category)
            .unwrap_or(&self.default)
            .clone()
    }

    fn table_for(&self, category: &str) -> Option<TableName> {
        self.tables.get(category).cloned()
    }

    fn all_clients(&self) -> Vec<ClientHandle> {
        dedup_first_seen(
            std::iter::once(self.default.clone()).chain(self.clients.values().cloned()),
        )
    }

    fn shares_connection(&self) -> bool {
        self.shares_connection
    }

    fn table_overrides(&self) -> Vec<Target> {
        self.tables
            .iter()
            .map(|(category, table)| {
                Target::with_table(self.client_for(category), Some(table.clone()))
            })
            .collect()
    }
}

/// Routes like another provider, but hands out a caller's transaction in
/// place of the client it was opened on.
///
/// Categories routed elsewhere keep their own clients.
#[derive(Debug, Clone)]
pub struct TransactionProvider {
    inner: Arc<dyn ClientProvider>,
    transaction: TransactionHandle,
}

impl TransactionProvider {
    /// Wraps `inner` so its routes to `transaction.origin()` run inside
    /// `transaction`.
    #[must_use]
    pub fn new(inner: Arc<dyn ClientProvider>, transaction: TransactionHandle) -> Self {
        Self { inner, transaction }
    }

    fn swap(&self, client: ClientHandle) -> ClientHandle {
        if client == *self.transaction.origin() {
            self.transaction.client().clone()
        } else {
            client
        }
    }
}

impl ClientProvider for TransactionProvider {
    fn client_for(&self, category: &str) -> ClientHandle {
        self.swap(self.inner.client_for(category))
    }

    fn table_for(&self, category: &str) -> Option<TableName> {
        self.inner.table_for(category)
    }

    fn all_clients(&self) -> Vec<ClientHandle> {
        dedup_first_seen(self.inner.all_clients().into_iter().map(|c| self.swap(c)))
    }

    fn shares_connection(&self) -> bool {
        self.inner.shares_connection()
    }

    fn table_overrides(&self) -> Vec<Target> {
        self.inner
            .table_overrides()
            .into_iter()
            .map(|t| Target::with_table(self.swap(t.client), t.table))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryDatabase;
    use crate::routing::distinct_targets;

    fn handle(db: &MemoryDatabase, table: &str) -> ClientHandle {
        let Ok(client) = db.client(table) else {
            panic!("valid table name");
        };
        ClientHandle::new(client)
    }

    fn table(name: &str) -> TableName {
        let Ok(table) = TableName::parse(name) else {
            panic!("valid table name");
        };
        table
    }

    #[test]
    fn single_client_routes_everything_to_one_client() {
        let db = MemoryDatabase::new();
        let client = handle(&db, "casbin_rule");
        let provider = SingleClientProvider::new(client.clone());

        assert_eq!(provider.client_for("p"), client);
        assert_eq!(provider.client_for("g2"), client);
        assert_eq!(provider.table_for("p"), None);
        assert_eq!(provider.all_clients(), vec![client]);
        assert!(provider.shares_connection());
    }

    #[test]
    fn policy_type_splits_on_leading_g() {
        let db = MemoryDatabase::new();
        let policy = handle(&db, "policies");
        let grouping = handle(&db, "groupings");
        let provider = PolicyTypeProvider::new(policy.clone(), grouping.clone());

        assert_eq!(provider.client_for("p"), policy);
        assert_eq!(provider.client_for("p2"), policy);
        assert_eq!(provider.client_for("g"), grouping);
        assert_eq!(provider.client_for("G3"), grouping);
        assert_eq!(provider.client_for(""), policy);
        assert_eq!(provider.all_clients(), vec![policy, grouping]);
        assert!(!provider.shares_connection());
        assert!(provider.sharing_connection(true).shares_connection());
    }

    #[test]
    fn policy_type_with_one_client_lists_it_once() {
        let db = MemoryDatabase::new();
        let client = handle(&db, "casbin_rule");
        let provider = PolicyTypeProvider::new(client.clone(), client.clone());
        assert_eq!(provider.all_clients(), vec![client]);
    }

    #[test]
    fn policy_type_table_overrides() {
        let db = MemoryDatabase::new();
        let client = handle(&db, "casbin_rule");
        let provider = PolicyTypeProvider::new(client.clone(), client)
            .with_tables(Some(table("authz.policies")), Some(table("authz.groupings")));

        assert_eq!(provider.table_for("p2"), Some(table("authz.policies")));
        assert_eq!(provider.table_for("g"), Some(table("authz.groupings")));
        assert_eq!(provider.table_overrides().len(), 2);
        assert_eq!(distinct_targets(&provider).len(), 3);
    }

    #[test]
    fn custom_mapping_falls_back_to_default() {
        let db = MemoryDatabase::new();
        let default = handle(&db, "casbin_rule");
        let audit = handle(&db, "audit_rules");
        let provider = CustomMappingProvider::new(default.clone())
            .route("p2", audit.clone())
            .route("g2", audit.clone())
            .route_table("g2", table("audit_groupings"));

        assert_eq!(provider.client_for("p"), default);
        assert_eq!(provider.client_for("p2"), audit);
        assert_eq!(provider.table_for("g2"), Some(table("audit_groupings")));
        assert_eq!(provider.table_for("p2"), None);
        assert_eq!(provider.all_clients(), vec![default, audit.clone()]);

        let overrides = provider.table_overrides();
        assert_eq!(overrides.len(), 1);
        assert!(overrides.first().is_some_and(|t| t.client == audit));
    }

    #[tokio::test]
    async fn transaction_replaces_only_its_origin() {
        let db = MemoryDatabase::new();
        let policy = handle(&db, "policies");
        let grouping = handle(&db, "groupings");
        let inner: Arc<dyn ClientProvider> = Arc::new(
            PolicyTypeProvider::new(policy.clone(), grouping.clone())
                .with_tables(None, Some(table("authz.groupings"))),
        );
        let Ok(tx) = TransactionHandle::begin(&grouping).await else {
            panic!("begin failed");
        };
        let provider = TransactionProvider::new(inner, tx.clone());

        assert_eq!(provider.client_for("p"), policy);
        assert_eq!(provider.client_for("g2"), *tx.client());
        assert_eq!(provider.table_for("g"), Some(table("authz.groupings")));
        assert_eq!(provider.all_clients(), vec![policy, tx.client().clone()]);
        assert!(
            provider
                .table_overrides()
                .iter()
                .all(|t| t.client == *tx.client())
        );
        assert!(!provider.shares_connection());
        assert!(tx.rollback().await.is_ok());
    }
}
