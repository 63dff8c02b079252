//! Client routing: which client and table each rule category is stored in.
//!
//! A [`ClientProvider`] is injected into the adapter at construction and
//! consulted for every read and write. Routing is pure: the same category
//! always resolves to the same [`Target`] for the adapter's lifetime.

pub mod provider;
pub mod providers;

pub use provider::{ClientProvider, Target, distinct_targets};
pub use providers::{
    CustomMappingProvider, PolicyTypeProvider, SingleClientProvider, TransactionProvider,
};
