//! Synchronous mirror of [`PolicyAdapter`] for callers without a runtime.

use tokio::runtime::{Builder, Runtime};

use super::adapter::PolicyAdapter;
use super::mutation::Mutation;
use crate::config::AdapterConfig;
use crate::domain::{PolicyFilter, PolicyStore};
use crate::error::AdapterError;

/// Runs every [`PolicyAdapter`] operation to completion on an owned
/// current-thread runtime.
///
/// Must not be used from inside another tokio runtime.
#[derive(Debug)]
pub struct BlockingAdapter {
    inner: PolicyAdapter,
    runtime: Runtime,
}

fn build_runtime() -> Result<Runtime, AdapterError> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AdapterError::Configuration(format!("cannot start runtime: {e}")))
}

impl BlockingAdapter {
    /// Wraps `adapter` with a new runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the runtime cannot start.
    pub fn new(adapter: PolicyAdapter) -> Result<Self, AdapterError> {
        Ok(Self::with_runtime(adapter, build_runtime()?))
    }

    /// Wraps `adapter` with the given runtime.
    #[must_use]
    pub fn with_runtime(adapter: PolicyAdapter, runtime: Runtime) -> Self {
        Self {
            inner: adapter,
            runtime,
        }
    }

    /// Connects a single SQL client described by `config`.
    ///
    /// # Errors
    ///
    /// See [`PolicyAdapter::from_config`].
    pub fn connect(config: &AdapterConfig) -> Result<Self, AdapterError> {
        let runtime = build_runtime()?;
        let adapter = runtime.block_on(PolicyAdapter::from_config(config))?;
        Ok(Self::with_runtime(adapter, runtime))
    }

    /// Returns the wrapped async adapter.
    #[must_use]
    pub fn inner(&self) -> &PolicyAdapter {
        &self.inner
    }

    /// See [`PolicyAdapter::is_filtered`].
    #[must_use]
    pub fn is_filtered(&self) -> bool {
        self.inner.is_filtered()
    }

    /// See [`PolicyAdapter::load_policy`].
    ///
    /// # Errors
    ///
    /// See [`PolicyAdapter::load_policy`].
    pub fn load_policy(&self, store: &mut dyn PolicyStore) -> Result<(), AdapterError> {
        self.runtime.block_on(self.inner.load_policy(store))
    }

    /// See [`PolicyAdapter::load_filtered_policy`].
    ///
    /// # Errors
    ///
    /// See [`PolicyAdapter::load_filtered_policy`].
    pub fn load_filtered_policy(
        &self,
        store: &mut dyn PolicyStore,
        filter: Option<&dyn PolicyFilter>,
    ) -> Result<(), AdapterError> {
        self.runtime
            .block_on(self.inner.load_filtered_policy(store, filter))
    }

    /// See [`PolicyAdapter::save_policy`].
    ///
    /// # Errors
    ///
    /// See [`PolicyAdapter::save_policy`].
    pub fn save_policy(&self, store: &dyn PolicyStore) -> Result<(), AdapterError> {
        self.runtime.block_on(self.inner.save_policy(store))
    }

    /// See [`PolicyAdapter::add_policy`].
    ///
    /// # Errors
    ///
    /// See [`PolicyAdapter::add_policy`].
    pub fn add_policy<S: AsRef<str> + Sync>(
        &self,
        section: &str,
        category: &str,
        values: &[S],
    ) -> Result<bool, AdapterError> {
        self.runtime
            .block_on(self.inner.add_policy(section, category, values))
    }

    /// See [`PolicyAdapter::add_policies`].
    ///
    /// # Errors
    ///
    /// See [`PolicyAdapter::add_policies`].
    pub fn add_policies(
        &self,
        section: &str,
        category: &str,
        rules: &[Vec<String>],
    ) -> Result<bool, AdapterError> {
        self.runtime
            .block_on(self.inner.add_policies(section, category, rules))
    }

    /// See [`PolicyAdapter::remove_policy`].
    ///
    /// # Errors
    ///
    /// See [`PolicyAdapter::remove_policy`].
    pub fn remove_policy<S: AsRef<str> + Sync>(
        &self,
        section: &str,
        category: &str,
        values: &[S],
    ) -> Result<bool, AdapterError> {
        self.runtime
            .block_on(self.inner.remove_policy(section, category, values))
    }

    /// See [`PolicyAdapter::remove_policies`].
    ///
    /// # Errors
    ///
    /// See [`PolicyAdapter::remove_policies`].
    pub fn remove_policies(
        &self,
        section: &str,
        category: &str,
        rules: &[Vec<String>],
    ) -> Result<bool, AdapterError> {
        self.runtime
            .block_on(self.inner.remove_policies(section, category, rules))
    }

    /// See [`PolicyAdapter::remove_filtered_policy`].
    ///
    /// # Errors
    ///
    /// See [`PolicyAdapter::remove_filtered_policy`].
    pub fn remove_filtered_policy<S: AsRef<str> + Sync>(
        &self,
        section: &str,
        category: &str,
        field_index: usize,
        field_values: &[S],
    ) -> Result<bool, AdapterError> {
        self.runtime.block_on(self.inner.remove_filtered_policy(
            section,
            category,
            field_index,
            field_values,
        ))
    }

    /// See [`PolicyAdapter::update_policy`].
    ///
    /// # Errors
    ///
    /// See [`PolicyAdapter::update_policy`].
    pub fn update_policy(
        &self,
        section: &str,
        category: &str,
        old: &[String],
        new: &[String],
    ) -> Result<bool, AdapterError> {
        self.runtime
            .block_on(self.inner.update_policy(section, category, old, new))
    }

    /// See [`PolicyAdapter::update_policies`].
    ///
    /// # Errors
    ///
    /// See [`PolicyAdapter::update_policies`].
    pub fn update_policies(
        &self,
        section: &str,
        category: &str,
        old: &[Vec<String>],
        new: &[Vec<String>],
    ) -> Result<bool, AdapterError> {
        self.runtime
            .block_on(self.inner.update_policies(section, category, old, new))
    }

    /// See [`PolicyAdapter::apply_mutations`].
    ///
    /// # Errors
    ///
    /// See [`PolicyAdapter::apply_mutations`].
    pub fn apply_mutations(&self, mutations: &[Mutation]) -> Result<bool, AdapterError> {
        self.runtime.block_on(self.inner.apply_mutations(mutations))
    }
}
