//! Domain layer: rule records, the codec, filters and the policy model seam.
//!
//! This module contains the adapter's data model: the persisted
//! [`RuleRecord`], its conversion to and from enforcer value lists, the
//! [`PolicyStore`] trait through which the enforcer's in-memory model is
//! read and filled, and the predicates used by filtered loads.

pub mod codec;
pub mod filter;
pub mod policy_store;
pub mod rule_record;

pub use codec::{DecodedRule, decode, encode, normalize};
pub use filter::{FieldFilter, PolicyFilter};
pub use policy_store::{MemoryPolicyStore, PolicyStore};
pub use rule_record::{
    GROUPING_SECTION, IDENTITY_FIELDS, MAX_FIELDS, POLICY_SECTION, RuleRecord, is_grouping,
    section_of,
};
