//! Service layer: the adapter and the protocols it runs.
//!
//! [`PolicyAdapter`] is the entry point the enforcer talks to. It resolves
//! targets through the injected router, passes every write through the
//! [`guard`] and delegates incremental changes to [`mutation`].
//! [`BlockingAdapter`] offers the same operations without async.

pub mod adapter;
pub mod blocking;
pub mod guard;
pub mod hooks;
pub mod mutation;

pub use adapter::{KNOWN_CATEGORIES, PolicyAdapter};
pub use blocking::BlockingAdapter;
pub use guard::{TransactionScope, ensure_single_writer_safe, is_in_external_transaction};
pub use hooks::{DefaultHooks, PolicyHooks};
pub use mutation::Mutation;
