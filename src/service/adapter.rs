//! The policy adapter: full load, filtered load, full-replace save and the
//! incremental operations, over whatever clients the provider routes to.
//!
//! # Save strategies
//!
//! A save snapshots the model, groups the rows by [`Target`] and checks the
//! single-writer guard before any write. Then:
//!
//! - **Shared connection** ([`ClientProvider::shares_connection`]): one
//!   transaction scope on the first group's client spans every group, so the
//!   whole save commits or rolls back as a unit.
//! - **Separate connections**: one scope per client, committed once that
//!   client's groups are written. A failure rolls back only the failing
//!   client; clients committed before it keep the new rules.
//!
//! In both cases the writes go through the client the scope hands out, with
//! each group's table named explicitly. A caller's transaction is joined
//! only when it is passed in through [`PolicyAdapter::joining`], and it is
//! left open.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::guard::{TransactionScope, ensure_single_writer_safe};
use super::hooks::{DefaultHooks, PolicyHooks};
use super::mutation::{self, Mutation};
use crate::config::{AdapterConfig, AdapterOptions};
use crate::domain::{PolicyFilter, PolicyStore, RuleRecord, codec, encode};
use crate::error::AdapterError;
use crate::persistence::{ClientHandle, RuleQuery, SqlClient, TransactionHandle};
use crate::routing::provider::dedup_first_seen;
use crate::routing::{
    ClientProvider, SingleClientProvider, Target, TransactionProvider, distinct_targets,
};

/// Categories read by a full load.
pub const KNOWN_CATEGORIES: [&str; 7] = ["p", "p2", "p3", "g", "g2", "g3", "g4"];

/// Persists an enforcer's policy model through routed storage clients.
#[derive(Debug)]
pub struct PolicyAdapter {
    provider: Arc<dyn ClientProvider>,
    hooks: Arc<dyn PolicyHooks>,
    options: AdapterOptions,
    filtered: AtomicBool,
}

impl PolicyAdapter {
    /// Creates an adapter with default options and hooks. No table is
    /// created; see [`PolicyAdapter::connect`].
    #[must_use]
    pub fn new(provider: Arc<dyn ClientProvider>) -> Self {
        Self {
            provider,
            hooks: Arc::new(DefaultHooks),
            options: AdapterOptions::default(),
            filtered: AtomicBool::new(false),
        }
    }

    /// Creates an adapter and, if `options.auto_create_table` is set,
    /// creates every table it may read or write.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Storage`] if a table cannot be created.
    pub async fn connect(
        provider: Arc<dyn ClientProvider>,
        options: AdapterOptions,
    ) -> Result<Self, AdapterError> {
        let adapter = Self::new(provider).with_options(options);
        if options.auto_create_table {
            adapter.ensure_tables().await?;
        }
        Ok(adapter)
    }

    /// Connects a single SQL client described by `config`.
    ///
    /// # Errors
    ///
    /// Returns configuration, connection and table-creation errors.
    pub async fn from_config(config: &AdapterConfig) -> Result<Self, AdapterError> {
        let client = ClientHandle::new(SqlClient::connect(config).await?);
        let provider: Arc<dyn ClientProvider> = Arc::new(SingleClientProvider::new(client));
        Self::connect(provider, config.options()).await
    }

    /// Replaces the adapter options.
    #[must_use]
    pub fn with_options(mut self, options: AdapterOptions) -> Self {
        self.options = options;
        self
    }

    /// Installs load/save hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn PolicyHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Returns a view of this adapter that runs its work for
    /// `transaction.origin()` inside `transaction`.
    ///
    /// The view never commits or rolls back `transaction`; its owner does.
    /// Categories routed to other clients are unaffected. The view starts
    /// with this adapter's filtered flag and tracks its own from there.
    #[must_use]
    pub fn joining(&self, transaction: &TransactionHandle) -> Self {
        let provider = TransactionProvider::new(Arc::clone(&self.provider), transaction.clone());
        Self {
            provider: Arc::new(provider),
            hooks: Arc::clone(&self.hooks),
            options: self.options,
            filtered: AtomicBool::new(self.is_filtered()),
        }
    }

    /// Returns the routing provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ClientProvider> {
        &self.provider
    }

    /// Returns the adapter options.
    #[must_use]
    pub fn options(&self) -> AdapterOptions {
        self.options
    }

    /// Returns `true` if the last load applied a filter.
    #[must_use]
    pub fn is_filtered(&self) -> bool {
        self.filtered.load(Ordering::Acquire)
    }

    /// Creates each client's default table and every table a known
    /// category is routed to.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Storage`] if a table cannot be created.
    pub async fn ensure_tables(&self) -> Result<(), AdapterError> {
        let routed = KNOWN_CATEGORIES
            .iter()
            .map(|category| self.provider.target_for(category));
        let targets = dedup_first_seen(distinct_targets(self.provider.as_ref()).into_iter().chain(routed));
        for target in &targets {
            target.client.ensure_table(target.table.as_ref()).await?;
        }
        tracing::debug!(tables = targets.len(), "rule tables ready");
        Ok(())
    }

    /// Reads every rule of the known categories into `store`.
    ///
    /// A target that cannot be read is logged and skipped unless
    /// `strict_load` is set.
    ///
    /// # Errors
    ///
    /// Returns the read error of the first failing target under
    /// `strict_load`.
    pub async fn load_policy(&self, store: &mut dyn PolicyStore) -> Result<(), AdapterError> {
        let targets = dedup_first_seen(
            KNOWN_CATEGORIES
                .iter()
                .map(|category| self.provider.target_for(category)),
        );
        let rows = self.read_targets(&targets).await?;
        let loaded = self.apply_rows(store, rows);
        self.filtered.store(false, Ordering::Release);
        tracing::info!(rules = loaded, targets = targets.len(), "policy loaded");
        Ok(())
    }

    /// Reads every target's rules, keeps those `filter` accepts and adds
    /// them to `store`.
    ///
    /// Saving after a filtered load replaces storage with the filtered
    /// model, dropping rules the filter excluded.
    ///
    /// # Errors
    ///
    /// Returns the read error of the first failing target under
    /// `strict_load`.
    pub async fn load_filtered_policy(
        &self,
        store: &mut dyn PolicyStore,
        filter: Option<&dyn PolicyFilter>,
    ) -> Result<(), AdapterError> {
        let targets = distinct_targets(self.provider.as_ref());
        let rows = self.read_targets(&targets).await?;
        let rows = match filter {
            Some(filter) => filter.apply(rows),
            None => rows,
        };
        let loaded = self.apply_rows(store, rows);
        self.filtered.store(filter.is_some(), Ordering::Release);
        tracing::info!(
            rules = loaded,
            targets = targets.len(),
            filtered = filter.is_some(),
            "filtered policy loaded"
        );
        Ok(())
    }

    async fn read_targets(&self, targets: &[Target]) -> Result<Vec<RuleRecord>, AdapterError> {
        let mut rows = Vec::new();
        for target in targets {
            match target.client.select(target.table.as_ref()).await {
                Ok(mut read) => {
                    tracing::debug!(%target, rows = read.len(), "target read");
                    rows.append(&mut read);
                }
                Err(e) if !self.options.strict_load => {
                    tracing::warn!(%target, error = %e, "skipping unreadable rule table");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(rows)
    }

    fn apply_rows(&self, store: &mut dyn PolicyStore, rows: Vec<RuleRecord>) -> usize {
        let rows = self.hooks.on_load(&*store, rows);
        for row in &rows {
            codec::load_into(row, store);
        }
        rows.len()
    }

    /// Replaces the stored rules with the contents of `store`.
    ///
    /// An empty model writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] before any write when the
    /// rows span several clients on a single-writer engine, and the first
    /// storage or transaction error otherwise.
    pub async fn save_policy(&self, store: &dyn PolicyStore) -> Result<(), AdapterError> {
        let records = snapshot(store);
        if records.is_empty() {
            tracing::debug!("empty model, nothing to save");
            return Ok(());
        }

        let mut groups: Vec<(Target, Vec<RuleRecord>)> = Vec::new();
        for record in records {
            let target = self.provider.target_for(&record.ptype);
            match groups.iter_mut().find(|(t, _)| *t == target) {
                Some((_, group)) => group.push(record),
                None => groups.push((target, vec![record])),
            }
        }

        let clients: Vec<ClientHandle> = groups.iter().map(|(t, _)| t.client.clone()).collect();
        ensure_single_writer_safe(&clients)?;

        let shared = self.provider.shares_connection();
        if shared {
            self.save_shared(store, groups).await?;
        } else {
            self.save_separate(store, groups, &clients).await?;
        }
        tracing::info!(shared, clients = dedup_first_seen(clients.iter()).len(), "policy saved");
        Ok(())
    }

    async fn save_shared(
        &self,
        store: &dyn PolicyStore,
        groups: Vec<(Target, Vec<RuleRecord>)>,
    ) -> Result<(), AdapterError> {
        let Some(primary) = groups.first().map(|(t, _)| t.client.clone()) else {
            return Ok(());
        };
        let scope = TransactionScope::begin(&primary).await?;
        let result = async {
            for (target, rows) in groups {
                self.replace_rows(store, &scope.bind(&target), rows).await?;
            }
            Ok::<(), AdapterError>(())
        }
        .await;
        scope.finish(result).await
    }

    async fn save_separate(
        &self,
        store: &dyn PolicyStore,
        groups: Vec<(Target, Vec<RuleRecord>)>,
        clients: &[ClientHandle],
    ) -> Result<(), AdapterError> {
        let mut pending = groups;
        for client in dedup_first_seen(clients.iter().cloned()) {
            let (mine, rest): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|(t, _)| t.client == client);
            pending = rest;

            let scope = TransactionScope::begin(&client).await?;
            let result = async {
                for (target, rows) in mine {
                    self.replace_rows(store, &scope.bind(&target), rows).await?;
                }
                Ok::<(), AdapterError>(())
            }
            .await;
            scope.finish(result).await?;
        }
        Ok(())
    }

    async fn replace_rows(
        &self,
        store: &dyn PolicyStore,
        target: &Target,
        rows: Vec<RuleRecord>,
    ) -> Result<(), AdapterError> {
        let table = target.table.as_ref();
        let deleted = target.client.delete(table, &RuleQuery::all()).await?;
        let rows = self.hooks.on_save(store, rows);
        let inserted = target.client.insert(table, &rows).await?;
        tracing::debug!(%target, deleted, inserted, "target replaced");
        Ok(())
    }

    /// See [`mutation::add_policy`].
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Storage`] on engine failure.
    pub async fn add_policy<S: AsRef<str> + Sync>(
        &self,
        section: &str,
        category: &str,
        values: &[S],
    ) -> Result<bool, AdapterError> {
        mutation::add_policy(self.provider.as_ref(), section, category, values).await
    }

    /// See [`mutation::add_policies`].
    ///
    /// # Errors
    ///
    /// Returns the first storage or transaction error.
    pub async fn add_policies(
        &self,
        section: &str,
        category: &str,
        rules: &[Vec<String>],
    ) -> Result<bool, AdapterError> {
        mutation::add_policies(self.provider.as_ref(), section, category, rules).await
    }

    /// See [`mutation::remove_policy`].
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Storage`] on engine failure.
    pub async fn remove_policy<S: AsRef<str> + Sync>(
        &self,
        section: &str,
        category: &str,
        values: &[S],
    ) -> Result<bool, AdapterError> {
        mutation::remove_policy(self.provider.as_ref(), section, category, values).await
    }

    /// See [`mutation::remove_policies`].
    ///
    /// # Errors
    ///
    /// Returns the first storage or transaction error.
    pub async fn remove_policies(
        &self,
        section: &str,
        category: &str,
        rules: &[Vec<String>],
    ) -> Result<bool, AdapterError> {
        mutation::remove_policies(self.provider.as_ref(), section, category, rules).await
    }

    /// See [`mutation::remove_filtered_policy`].
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Storage`] on engine failure.
    pub async fn remove_filtered_policy<S: AsRef<str> + Sync>(
        &self,
        section: &str,
        category: &str,
        field_index: usize,
        field_values: &[S],
    ) -> Result<bool, AdapterError> {
        mutation::remove_filtered_policy(
            self.provider.as_ref(),
            section,
            category,
            field_index,
            field_values,
        )
        .await
    }

    /// See [`mutation::update_policy`].
    ///
    /// # Errors
    ///
    /// Returns the first storage or transaction error.
    pub async fn update_policy(
        &self,
        section: &str,
        category: &str,
        old: &[String],
        new: &[String],
    ) -> Result<bool, AdapterError> {
        mutation::update_policy(self.provider.as_ref(), section, category, old, new).await
    }

    /// See [`mutation::update_policies`].
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidArgument`] for lists of different
    /// lengths, otherwise the first storage or transaction error.
    pub async fn update_policies(
        &self,
        section: &str,
        category: &str,
        old: &[Vec<String>],
        new: &[Vec<String>],
    ) -> Result<bool, AdapterError> {
        mutation::update_policies(self.provider.as_ref(), section, category, old, new).await
    }

    /// See [`mutation::apply_mutations`].
    ///
    /// # Errors
    ///
    /// Returns the first storage or transaction error.
    pub async fn apply_mutations(&self, mutations: &[Mutation]) -> Result<bool, AdapterError> {
        mutation::apply_mutations(self.provider.as_ref(), mutations).await
    }
}

/// Encodes every rule the model holds, section by section.
fn snapshot(store: &dyn PolicyStore) -> Vec<RuleRecord> {
    let mut records = Vec::new();
    for (section, categories) in store.sections() {
        for category in categories {
            for values in store.rules(&section, &category) {
                records.push(encode(&category, &values));
            }
        }
    }
    records
}
