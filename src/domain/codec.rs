//! Conversion between enforcer value lists and [`RuleRecord`]s.
//!
//! Blank and whitespace-only values are stored as absent. On the way back,
//! absent fields are dropped and the list is padded to the arity the
//! enforcer's model declares for the category.

use super::policy_store::PolicyStore;
use super::rule_record::{RuleRecord, section_of};

/// Maps blank or whitespace-only values to `None`.
#[must_use]
pub fn normalize(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Builds a record from a category and its positional values.
///
/// Values beyond the table's column count are dropped.
#[must_use]
pub fn encode<S: AsRef<str>>(category: &str, values: &[S]) -> RuleRecord {
    let mut record = RuleRecord::new(category);
    for (slot, value) in record.fields.iter_mut().zip(values) {
        *slot = normalize(value.as_ref());
    }
    record
}

/// A rule ready to be handed to the enforcer's in-memory model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRule {
    /// `"p"` or `"g"`.
    pub section: &'static str,
    /// Category tag of the rule.
    pub category: String,
    /// Positional values, padded to the declared arity.
    pub values: Vec<String>,
}

/// Reconstructs the enforcer's view of a stored record.
///
/// `required` is the number of values the model declares for the
/// category; shorter lists are padded with empty strings and longer ones
/// are kept whole.
#[must_use]
pub fn decode(record: &RuleRecord, required: Option<usize>) -> DecodedRule {
    let mut values = record.present_values();
    if let Some(required) = required
        && values.len() < required
    {
        values.resize(required, String::new());
    }
    DecodedRule {
        section: section_of(&record.ptype),
        category: record.ptype.clone(),
        values,
    }
}

/// Decodes `record` and adds it to `store`, using the store's declared
/// arity for the category.
pub fn load_into(record: &RuleRecord, store: &mut dyn PolicyStore) {
    let section = section_of(&record.ptype);
    let required = store.required_values(section, &record.ptype);
    let rule = decode(record, required);
    store.add_policy(rule.section, &rule.category, rule.values);
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::MemoryPolicyStore;

    #[test]
    fn encode_normalizes_blank_values() {
        let rec = encode("p", &["alice", "  ", "", "read"]);
        assert_eq!(rec.field(0), Some("alice"));
        assert_eq!(rec.field(1), None);
        assert_eq!(rec.field(2), None);
        assert_eq!(rec.field(3), Some("read"));
        assert_eq!(rec.id, None);
    }

    #[test]
    fn encode_keeps_values_past_identity_columns() {
        let values: Vec<String> = (0..8).map(|i| format!("v{i}")).collect();
        let rec = encode("p", &values);
        assert_eq!(rec.field(6), Some("v6"));
        assert_eq!(rec.field(7), Some("v7"));
        assert_eq!(rec.field(8), None);
    }

    #[test]
    fn round_trip_reproduces_section_category_and_values() {
        let cases: [(&str, &[&str]); 4] = [
            ("p", &["alice", "data1", "read"]),
            ("p2", &["bob", "data2", "write", "allow"]),
            ("g", &["alice", "data2_admin"]),
            ("g2", &["a", "b", "c", "d", "e", "f"]),
        ];
        for (category, values) in cases {
            let decoded = decode(&encode(category, values), None);
            assert_eq!(decoded.section, section_of(category));
            assert_eq!(decoded.category, category);
            assert_eq!(decoded.values, values);
        }
    }

    #[test]
    fn decode_pads_to_required_arity() {
        let rec = encode("p", &["alice", "data1"]);
        let decoded = decode(&rec, Some(4));
        assert_eq!(decoded.values, vec!["alice", "data1", "", ""]);
    }

    #[test]
    fn decode_keeps_values_beyond_required() {
        let rec = encode("p", &["alice", "data1", "read", "allow"]);
        let decoded = decode(&rec, Some(3));
        assert_eq!(decoded.values.len(), 4);
    }

    #[test]
    fn embedded_blank_is_not_preserved() {
        let rec = encode("p", &["alice", "", "read"]);
        let decoded = decode(&rec, None);
        assert_eq!(decoded.values, vec!["alice", "read"]);
    }

    #[test]
    fn decode_treats_stored_blank_as_absent() {
        let mut rec = RuleRecord::new("p");
        let stored = ["alice", "", "read"];
        for (slot, value) in rec.fields.iter_mut().zip(stored) {
            *slot = Some(value.to_string());
        }
        let decoded = decode(&rec, Some(2));
        assert_eq!(decoded.values, vec!["alice", "read"]);
    }

    #[test]
    fn load_into_uses_store_arity() {
        let mut store = MemoryPolicyStore::new().with_definition("p", 3);
        load_into(&encode("p", &["alice", "data1"]), &mut store);
        assert_eq!(
            store.rules("p", "p"),
            vec![vec!["alice".to_string(), "data1".to_string(), String::new()]]
        );
    }
}
