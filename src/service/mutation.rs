//! Incremental rule changes: single-rule primitives and batches.
//!
//! Every change resolves its target through the [`ClientProvider`]. Batches
//! are grouped by client in first-seen order and each group runs inside one
//! [`TransactionScope`], through the client the scope hands out, so a
//! failing change undoes the rest of its group. Single adds and removes run
//! as one statement each and need no scope.

use super::guard::TransactionScope;
use crate::domain::{RuleRecord, encode};
use crate::error::AdapterError;
use crate::persistence::{ClientHandle, RuleQuery};
use crate::routing::{ClientProvider, Target};

/// One change in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert a rule unless an equal one exists.
    Add {
        /// Rule category.
        category: String,
        /// Rule values.
        values: Vec<String>,
    },
    /// Delete rules matching the bound values among `v0..v5`.
    Remove {
        /// Rule category.
        category: String,
        /// Rule values; blank entries match anything.
        values: Vec<String>,
    },
    /// Replace `old` with `new`.
    Update {
        /// Rule category.
        category: String,
        /// Values of the rule to remove.
        old: Vec<String>,
        /// Values of the rule to add.
        new: Vec<String>,
    },
}

impl Mutation {
    /// Returns the category the change applies to.
    #[must_use]
    pub fn category(&self) -> &str {
        match self {
            Self::Add { category, .. }
            | Self::Remove { category, .. }
            | Self::Update { category, .. } => category,
        }
    }
}

async fn add_on_target(target: &Target, record: &RuleRecord) -> Result<bool, AdapterError> {
    let table = target.table.as_ref();
    if target
        .client
        .exists(table, &RuleQuery::identity(record))
        .await?
    {
        tracing::debug!(rule = %record, %target, "rule already stored");
        return Ok(false);
    }
    match target.client.insert(table, std::slice::from_ref(record)).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_unique_violation() => {
            tracing::debug!(rule = %record, %target, "concurrent insert won, keeping stored rule");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

async fn remove_on_target<S: AsRef<str> + Sync>(
    target: &Target,
    category: &str,
    values: &[S],
) -> Result<bool, AdapterError> {
    if values.is_empty() {
        return Ok(false);
    }
    let removed = target
        .client
        .delete(
            target.table.as_ref(),
            &RuleQuery::bound_identity(category, values),
        )
        .await?;
    tracing::debug!(category, %target, removed, "rules removed");
    Ok(removed > 0)
}

async fn update_on_target(
    target: &Target,
    category: &str,
    old: &[String],
    new: &[String],
) -> Result<bool, AdapterError> {
    let removed = remove_on_target(target, category, old).await?;
    let added = add_on_target(target, &encode(category, new)).await?;
    Ok(removed || added)
}

async fn apply_one(target: &Target, mutation: &Mutation) -> Result<bool, AdapterError> {
    match mutation {
        Mutation::Add { category, values } => {
            if values.is_empty() {
                return Ok(false);
            }
            add_on_target(target, &encode(category, values)).await
        }
        Mutation::Remove { category, values } => remove_on_target(target, category, values).await,
        Mutation::Update { category, old, new } => {
            if new.is_empty() {
                return Ok(false);
            }
            update_on_target(target, category, old, new).await
        }
    }
}

/// Stores one rule unless an equal rule is already stored.
///
/// Returns `true` if a row was written. A unique-constraint failure from a
/// concurrent equal insert counts as already stored.
///
/// # Errors
///
/// Returns [`AdapterError::Storage`] on engine failure.
pub async fn add_policy<S: AsRef<str> + Sync>(
    provider: &dyn ClientProvider,
    section: &str,
    category: &str,
    values: &[S],
) -> Result<bool, AdapterError> {
    if values.is_empty() {
        return Ok(false);
    }
    let target = provider.target_for(category);
    let added = add_on_target(&target, &encode(category, values)).await?;
    tracing::debug!(section, category, added, "add_policy");
    Ok(added)
}

/// Deletes rules of `category` whose bound values among `v0..v5` match.
///
/// Blank values are wildcards, so several rows may go.
///
/// # Errors
///
/// Returns [`AdapterError::Storage`] on engine failure.
pub async fn remove_policy<S: AsRef<str> + Sync>(
    provider: &dyn ClientProvider,
    section: &str,
    category: &str,
    values: &[S],
) -> Result<bool, AdapterError> {
    tracing::debug!(section, category, "remove_policy");
    remove_on_target(&provider.target_for(category), category, values).await
}

/// Deletes rules of `category` whose fields from `field_index` on match
/// the non-blank entries of `field_values`.
///
/// # Errors
///
/// Returns [`AdapterError::Storage`] on engine failure.
pub async fn remove_filtered_policy<S: AsRef<str> + Sync>(
    provider: &dyn ClientProvider,
    section: &str,
    category: &str,
    field_index: usize,
    field_values: &[S],
) -> Result<bool, AdapterError> {
    if field_values.is_empty() {
        return Ok(false);
    }
    let target = provider.target_for(category);
    let removed = target
        .client
        .delete(
            target.table.as_ref(),
            &RuleQuery::filtered(category, field_index, field_values),
        )
        .await?;
    tracing::debug!(section, category, field_index, removed, %target, "remove_filtered_policy");
    Ok(removed > 0)
}

/// Replaces the rule `old` with `new` inside one transaction scope.
///
/// # Errors
///
/// Returns the first storage error; both halves are rolled back when the
/// scope owns the transaction.
pub async fn update_policy(
    provider: &dyn ClientProvider,
    section: &str,
    category: &str,
    old: &[String],
    new: &[String],
) -> Result<bool, AdapterError> {
    if new.is_empty() {
        return Ok(false);
    }
    let target = provider.target_for(category);
    let scope = TransactionScope::begin(&target.client).await?;
    let result = update_on_target(&scope.bind(&target), category, old, new).await;
    let updated = scope.finish(result).await?;
    tracing::debug!(section, category, updated, "update_policy");
    Ok(updated)
}

/// Applies `mutations`, one transaction scope per distinct client.
///
/// Groups run in the order their client first appears. A failure rolls back
/// the failing group and stops; groups already committed stay committed.
///
/// # Errors
///
/// Returns the first storage or transaction error.
pub async fn apply_mutations(
    provider: &dyn ClientProvider,
    mutations: &[Mutation],
) -> Result<bool, AdapterError> {
    let mut groups: Vec<(ClientHandle, Vec<&Mutation>)> = Vec::new();
    for mutation in mutations {
        let client = provider.client_for(mutation.category());
        match groups.iter_mut().find(|(c, _)| *c == client) {
            Some((_, group)) => group.push(mutation),
            None => groups.push((client, vec![mutation])),
        }
    }

    let mut changed = false;
    for (client, group) in groups {
        let scope = TransactionScope::begin(&client).await?;
        let result = async {
            let mut any = false;
            for mutation in &group {
                let target = scope.bind(&provider.target_for(mutation.category()));
                any |= apply_one(&target, mutation).await?;
            }
            Ok::<bool, AdapterError>(any)
        }
        .await;
        changed |= scope.finish(result).await?;
        tracing::debug!(engine = %client.engine(), changes = group.len(), "mutation group applied");
    }
    Ok(changed)
}

/// Adds every rule in `rules` to `category`.
///
/// # Errors
///
/// See [`apply_mutations`].
pub async fn add_policies(
    provider: &dyn ClientProvider,
    section: &str,
    category: &str,
    rules: &[Vec<String>],
) -> Result<bool, AdapterError> {
    tracing::debug!(section, category, rules = rules.len(), "add_policies");
    let mutations: Vec<Mutation> = rules
        .iter()
        .map(|values| Mutation::Add {
            category: category.to_string(),
            values: values.clone(),
        })
        .collect();
    apply_mutations(provider, &mutations).await
}

/// Removes every rule in `rules` from `category`.
///
/// # Errors
///
/// See [`apply_mutations`].
pub async fn remove_policies(
    provider: &dyn ClientProvider,
    section: &str,
    category: &str,
    rules: &[Vec<String>],
) -> Result<bool, AdapterError> {
    tracing::debug!(section, category, rules = rules.len(), "remove_policies");
    let mutations: Vec<Mutation> = rules
        .iter()
        .map(|values| Mutation::Remove {
            category: category.to_string(),
            values: values.clone(),
        })
        .collect();
    apply_mutations(provider, &mutations).await
}

/// Replaces `old[i]` with `new[i]` for every `i`.
///
/// # Errors
///
/// Returns [`AdapterError::InvalidArgument`] before touching storage if the
/// lists differ in length, otherwise see [`apply_mutations`].
pub async fn update_policies(
    provider: &dyn ClientProvider,
    section: &str,
    category: &str,
    old: &[Vec<String>],
    new: &[Vec<String>],
) -> Result<bool, AdapterError> {
    if old.len() != new.len() {
        return Err(AdapterError::InvalidArgument(format!(
            "update_policies needs equal lists, got {} old and {} new rules",
            old.len(),
            new.len()
        )));
    }
    tracing::debug!(section, category, rules = old.len(), "update_policies");
    let mutations: Vec<Mutation> = old
        .iter()
        .zip(new)
        .map(|(old, new)| Mutation::Update {
            category: category.to_string(),
            old: old.clone(),
            new: new.clone(),
        })
        .collect();
    apply_mutations(provider, &mutations).await
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::persistence::{MemoryDatabase, RuleClient, TableName, TransactionHandle};
    use crate::routing::{PolicyTypeProvider, SingleClientProvider, TransactionProvider};
    use crate::test_support::FaultyClient;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    async fn single(db: &MemoryDatabase) -> (ClientHandle, SingleClientProvider) {
        let Ok(client) = db.client("casbin_rule") else {
            panic!("valid table name");
        };
        let Ok(()) = client.ensure_table(None).await else {
            panic!("table creation failed");
        };
        let handle = ClientHandle::new(client);
        (handle.clone(), SingleClientProvider::new(handle))
    }

    async fn rows(client: &ClientHandle) -> Vec<RuleRecord> {
        let Ok(rows) = client.select(None).await else {
            panic!("select failed");
        };
        rows
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let db = MemoryDatabase::new();
        let (client, provider) = single(&db).await;
        let rule = ["alice", "data1", "read"];

        assert_eq!(add_policy(&provider, "p", "p", &rule).await.ok(), Some(true));
        assert_eq!(add_policy(&provider, "p", "p", &rule).await.ok(), Some(false));
        assert_eq!(rows(&client).await.len(), 1);
    }

    #[tokio::test]
    async fn empty_values_are_ignored() {
        let db = MemoryDatabase::new();
        let (client, provider) = single(&db).await;
        let _ = add_policy(&provider, "p", "p", &["alice", "data1", "read"]).await;
        let empty: [&str; 0] = [];

        assert_eq!(add_policy(&provider, "p", "p", &empty).await.ok(), Some(false));
        assert_eq!(remove_policy(&provider, "p", "p", &empty).await.ok(), Some(false));
        assert_eq!(
            remove_filtered_policy(&provider, "p", "p", 0, &empty).await.ok(),
            Some(false)
        );
        assert_eq!(
            update_policy(&provider, "p", "p", &strings(&["alice"]), &[]).await.ok(),
            Some(false)
        );
        assert_eq!(rows(&client).await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_adds_store_one_row() {
        let db = MemoryDatabase::new();
        let (client, provider) = single(&db).await;
        let provider = Arc::new(provider);

        let adds = (0..16).map(|_| {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move {
                add_policy(provider.as_ref(), "p", "p", &["alice", "data1", "read"]).await
            })
        });
        let results = futures_util::future::join_all(adds).await;

        assert!(results.iter().all(|r| matches!(r, Ok(Ok(_)))));
        assert_eq!(rows(&client).await.len(), 1);
    }

    #[tokio::test]
    async fn remove_treats_blank_as_wildcard() {
        let db = MemoryDatabase::new();
        let (client, provider) = single(&db).await;
        let _ = add_policy(&provider, "p", "p", &["alice", "data1", "read"]).await;
        let _ = add_policy(&provider, "p", "p", &["alice", "data1", "write"]).await;
        let _ = add_policy(&provider, "p", "p", &["bob", "data1", "read"]).await;

        let removed = remove_policy(&provider, "p", "p", &["alice", "data1", ""]).await;
        assert_eq!(removed.ok(), Some(true));
        let left = rows(&client).await;
        assert_eq!(left.len(), 1);
        assert!(left.first().is_some_and(|r| r.field(0) == Some("bob")));
    }

    #[tokio::test]
    async fn remove_filtered_matches_from_field_index() {
        let db = MemoryDatabase::new();
        let (client, provider) = single(&db).await;
        let _ = add_policy(&provider, "p", "p", &["alice", "data1", "read"]).await;
        let _ = add_policy(&provider, "p", "p", &["bob", "data2", "read"]).await;
        let _ = add_policy(&provider, "p", "p", &["carol", "data2", "write"]).await;

        let removed = remove_filtered_policy(&provider, "p", "p", 1, &["data2", "read"]).await;
        assert_eq!(removed.ok(), Some(true));
        assert_eq!(rows(&client).await.len(), 2);
    }

    #[tokio::test]
    async fn update_replaces_rule() {
        let db = MemoryDatabase::new();
        let (client, provider) = single(&db).await;
        let _ = add_policy(&provider, "p", "p", &["alice", "data1", "read"]).await;
        let _ = add_policy(&provider, "p", "p", &["bob", "data2", "write"]).await;

        let updated = update_policy(
            &provider,
            "p",
            "p",
            &strings(&["alice", "data1", "read"]),
            &strings(&["alice", "data1", "write"]),
        )
        .await;
        assert_eq!(updated.ok(), Some(true));

        let stored = rows(&client).await;
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().any(|r| r.field(2) == Some("write") && r.field(0) == Some("alice")));
        assert!(!stored.iter().any(|r| r.field(2) == Some("read")));
        assert!(!client.in_transaction());
    }

    #[tokio::test]
    async fn failed_update_restores_old_rule() {
        let db = MemoryDatabase::new();
        let Ok(inner) = db.client("casbin_rule") else {
            panic!("valid table name");
        };
        let _ = inner.ensure_table(None).await;
        let _ = inner.insert(None, &[encode("p", &["alice", "data1", "read"])]).await;
        let table = inner.default_table().clone();
        let client = ClientHandle::new(FaultyClient::new(inner).failing_inserts_into(table));
        let provider = SingleClientProvider::new(client.clone());

        let result = update_policy(
            &provider,
            "p",
            "p",
            &strings(&["alice", "data1", "read"]),
            &strings(&["alice", "data1", "write"]),
        )
        .await;
        assert!(matches!(result, Err(AdapterError::Storage(_))));

        let stored = rows(&client).await;
        assert_eq!(stored.len(), 1);
        assert!(stored.first().is_some_and(|r| r.field(2) == Some("read")));
        assert!(!client.in_transaction());
    }

    #[tokio::test]
    async fn changes_join_a_callers_transaction() {
        let db = MemoryDatabase::new();
        let (client, provider) = single(&db).await;
        let Ok(tx) = TransactionHandle::begin(&client).await else {
            panic!("outer begin failed");
        };
        let joined = TransactionProvider::new(Arc::new(provider), tx.clone());

        let _ = add_policy(&joined, "p", "p", &["alice", "data1", "read"]).await;
        let _ = add_policies(&joined, "g", "g", &[strings(&["alice", "admin"])]).await;
        let _ = update_policy(
            &joined,
            "p",
            "p",
            &strings(&["alice", "data1", "read"]),
            &strings(&["alice", "data1", "write"]),
        )
        .await;
        assert_eq!(rows(tx.client()).await.len(), 2);

        let Ok(()) = tx.rollback().await else {
            panic!("outer rollback failed");
        };
        assert!(rows(&client).await.is_empty());
    }

    #[tokio::test]
    async fn update_policies_rejects_mismatched_lists() {
        let db = MemoryDatabase::new();
        let (client, provider) = single(&db).await;
        let _ = add_policy(&provider, "p", "p", &["alice", "data1", "read"]).await;

        let result = update_policies(
            &provider,
            "p",
            "p",
            &[strings(&["alice", "data1", "read"])],
            &[],
        )
        .await;
        assert!(matches!(result, Err(AdapterError::InvalidArgument(_))));
        assert_eq!(rows(&client).await.len(), 1);
        assert!(!client.in_transaction());
    }

    #[tokio::test]
    async fn batch_groups_by_client_and_fails_per_group() {
        let policy_db = MemoryDatabase::new();
        let grouping_db = MemoryDatabase::new();
        let (Ok(policy), Ok(grouping)) = (
            policy_db.client("casbin_rule"),
            grouping_db.client("casbin_rule"),
        ) else {
            panic!("valid table names");
        };
        let _ = policy.ensure_table(None).await;
        let _ = grouping.ensure_table(None).await;
        let Ok(table) = TableName::parse("casbin_rule") else {
            panic!("valid table name");
        };
        let policy = ClientHandle::new(policy);
        let grouping = ClientHandle::new(FaultyClient::new(grouping).failing_inserts_into(table));
        let provider = PolicyTypeProvider::new(policy.clone(), grouping.clone());

        let mutations = vec![
            Mutation::Add {
                category: "p".to_string(),
                values: strings(&["alice", "data1", "read"]),
            },
            Mutation::Add {
                category: "g".to_string(),
                values: strings(&["alice", "admin"]),
            },
            Mutation::Add {
                category: "p".to_string(),
                values: strings(&["bob", "data2", "write"]),
            },
        ];
        let result = apply_mutations(&provider, &mutations).await;

        assert!(matches!(result, Err(AdapterError::Storage(_))));
        assert_eq!(rows(&policy).await.len(), 2);
        assert!(rows(&grouping).await.is_empty());
        assert!(!grouping.in_transaction());
    }

    #[tokio::test]
    async fn batch_add_and_remove() {
        let db = MemoryDatabase::new();
        let (client, provider) = single(&db).await;
        let rules = vec![
            strings(&["alice", "data1", "read"]),
            strings(&["bob", "data2", "write"]),
            strings(&["alice", "data1", "read"]),
        ];

        assert_eq!(add_policies(&provider, "p", "p", &rules).await.ok(), Some(true));
        assert_eq!(rows(&client).await.len(), 2);

        let removed = remove_policies(&provider, "p", "p", rules.get(..1).unwrap_or_default()).await;
        assert_eq!(removed.ok(), Some(true));
        assert_eq!(rows(&client).await.len(), 1);
    }
}
