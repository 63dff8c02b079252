//! Persisted policy rule row.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::codec::normalize;

/// Number of positional value columns (`v0`..`v14`) in the rule table.
pub const MAX_FIELDS: usize = 15;

/// Number of leading value columns covered by the uniqueness constraint and
/// by the existence check.
pub const IDENTITY_FIELDS: usize = 6;

/// Section name for policy statements (`p`, `p2`, ...).
pub const POLICY_SECTION: &str = "p";

/// Section name for grouping/role statements (`g`, `g2`, ...).
pub const GROUPING_SECTION: &str = "g";

/// Returns `true` for grouping categories: those starting with `g` in
/// either case.
#[must_use]
pub fn is_grouping(category: &str) -> bool {
    category
        .get(..1)
        .is_some_and(|head| head.eq_ignore_ascii_case(GROUPING_SECTION))
}

/// Returns the in-memory section a category belongs to.
///
/// Grouping categories (see [`is_grouping`]) map to `g`, all others to `p`.
#[must_use]
pub fn section_of(category: &str) -> &'static str {
    if is_grouping(category) {
        GROUPING_SECTION
    } else {
        POLICY_SECTION
    }
}

/// One stored policy or grouping statement.
///
/// Business identity is `(ptype, v0..v5)`; `id` is a synthetic key assigned
/// by the storage engine and is `None` until the row has been persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    /// Synthetic auto-increment key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Category tag (`p`, `p2`, `g`, `g2`, ...).
    pub ptype: String,
    /// Positional rule arguments; `None` means the field is not present.
    pub fields: [Option<String>; MAX_FIELDS],
}

impl RuleRecord {
    /// Creates an empty record for the given category.
    #[must_use]
    pub fn new(ptype: impl Into<String>) -> Self {
        Self {
            id: None,
            ptype: ptype.into(),
            fields: Default::default(),
        }
    }

    /// Returns the section this record belongs to.
    #[must_use]
    pub fn section(&self) -> &'static str {
        section_of(&self.ptype)
    }

    /// Returns field `index`, or `None` when absent or out of range.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).and_then(|f| f.as_deref())
    }

    /// Returns the fields that make up the record's business identity.
    #[must_use]
    pub fn identity_fields(&self) -> &[Option<String>] {
        self.fields.get(..IDENTITY_FIELDS).unwrap_or(&[])
    }

    /// Returns `true` if both records share category and `v0..v5`.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.ptype == other.ptype && self.identity_fields() == other.identity_fields()
    }

    /// Returns the present fields in order, skipping absent and blank ones.
    #[must_use]
    pub fn present_values(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter_map(|f| f.as_deref().and_then(normalize))
            .collect()
    }
}

impl fmt::Display for RuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ptype)?;
        for field in self.identity_fields() {
            write!(f, ", {}", field.as_deref().unwrap_or(""))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn record(ptype: &str, values: &[&str]) -> RuleRecord {
        let mut rec = RuleRecord::new(ptype);
        for (slot, v) in rec.fields.iter_mut().zip(values) {
            *slot = Some((*v).to_string());
        }
        rec
    }

    #[test]
    fn section_follows_first_letter() {
        assert_eq!(section_of("p"), "p");
        assert_eq!(section_of("p2"), "p");
        assert_eq!(section_of("g"), "g");
        assert_eq!(section_of("g4"), "g");
        assert_eq!(section_of("G2"), "g");
        assert_eq!(section_of(""), "p");
    }

    #[test]
    fn grouping_predicate_ignores_case() {
        assert!(is_grouping("g"));
        assert!(is_grouping("G3"));
        assert!(!is_grouping("p"));
        assert!(!is_grouping(""));
    }

    #[test]
    fn identity_ignores_trailing_fields() {
        let mut a = record("p", &["a", "b", "c", "d", "e", "f", "x"]);
        let b = record("p", &["a", "b", "c", "d", "e", "f", "y"]);
        assert!(a.same_identity(&b));

        if let Some(slot) = a.fields.get_mut(0) {
            *slot = Some("z".to_string());
        }
        assert!(!a.same_identity(&b));
    }

    #[test]
    fn identity_distinguishes_category() {
        let a = record("p", &["alice", "data1"]);
        let b = record("p2", &["alice", "data1"]);
        assert!(!a.same_identity(&b));
    }

    #[test]
    fn present_values_skip_gaps() {
        let mut rec = record("p", &["alice"]);
        if let Some(slot) = rec.fields.get_mut(2) {
            *slot = Some("read".to_string());
        }
        assert_eq!(rec.present_values(), vec!["alice", "read"]);
    }

    #[test]
    fn present_values_skip_stored_blanks() {
        let mut rec = record("p", &["alice", "", "read", "  "]);
        if let Some(slot) = rec.fields.get_mut(4) {
            *slot = Some("allow".to_string());
        }
        assert_eq!(rec.present_values(), vec!["alice", "read", "allow"]);
    }

    #[test]
    fn display_lists_identity_fields() {
        let rec = record("g", &["alice", "admin"]);
        assert_eq!(rec.to_string(), "g, alice, admin, , , , ");
    }

    #[test]
    fn serde_skips_missing_id() {
        let rec = record("p", &["alice"]);
        let Ok(json) = serde_json::to_string(&rec) else {
            panic!("serialization failed");
        };
        assert!(!json.contains("\"id\""));
        let Ok(back) = serde_json::from_str::<RuleRecord>(&json) else {
            panic!("deserialization failed");
        };
        assert_eq!(back, rec);
    }
}
