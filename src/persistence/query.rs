//! Row predicates shared by the storage backends.
//!
//! A [`RuleQuery`] is a conjunction of an optional category test and
//! per-field tests. The SQL backend renders it to a `WHERE` clause, the
//! in-memory backend evaluates it directly.

use crate::domain::{IDENTITY_FIELDS, MAX_FIELDS, RuleRecord, normalize};

/// Test applied to one value column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMatch {
    /// Column equals the value.
    Equals(String),
    /// Column is absent.
    IsNull,
}

/// Conjunctive row predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleQuery {
    ptype: Option<String>,
    fields: Vec<(usize, FieldMatch)>,
}

impl RuleQuery {
    /// Matches every row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches rows of one category.
    #[must_use]
    pub fn category(ptype: &str) -> Self {
        Self {
            ptype: Some(ptype.to_string()),
            fields: Vec::new(),
        }
    }

    /// Exact identity match: category plus every field of `v0..v5`, with an
    /// absent field matching only absent.
    #[must_use]
    pub fn identity(record: &RuleRecord) -> Self {
        let fields = record
            .identity_fields()
            .iter()
            .enumerate()
            .map(|(index, value)| {
                let test = match value {
                    Some(v) => FieldMatch::Equals(v.clone()),
                    None => FieldMatch::IsNull,
                };
                (index, test)
            })
            .collect();
        Self {
            ptype: Some(record.ptype.clone()),
            fields,
        }
    }

    /// Wildcard match over `v0..v5`: bound values must be equal, blank
    /// values match anything.
    #[must_use]
    pub fn bound_identity<S: AsRef<str>>(ptype: &str, values: &[S]) -> Self {
        let bound = values.iter().take(IDENTITY_FIELDS);
        Self::category(ptype).with_bound_fields(0, bound)
    }

    /// Wildcard match starting at `field_index`: each non-blank value must
    /// equal the field at `field_index + offset`.
    #[must_use]
    pub fn filtered<S: AsRef<str>>(ptype: &str, field_index: usize, values: &[S]) -> Self {
        Self::category(ptype).with_bound_fields(field_index, values.iter())
    }

    fn with_bound_fields<'a, S, I>(mut self, start: usize, values: I) -> Self
    where
        S: AsRef<str> + 'a,
        I: Iterator<Item = &'a S>,
    {
        for (offset, value) in values.enumerate() {
            let index = start + offset;
            if index >= MAX_FIELDS {
                break;
            }
            if let Some(v) = normalize(value.as_ref()) {
                self.fields.push((index, FieldMatch::Equals(v)));
            }
        }
        self
    }

    /// Returns the category test, if any.
    #[must_use]
    pub fn ptype(&self) -> Option<&str> {
        self.ptype.as_deref()
    }

    /// Returns the per-field tests as `(column index, test)` pairs.
    #[must_use]
    pub fn fields(&self) -> &[(usize, FieldMatch)] {
        &self.fields
    }

    /// Evaluates the predicate against a row.
    #[must_use]
    pub fn matches(&self, record: &RuleRecord) -> bool {
        if let Some(ptype) = &self.ptype
            && record.ptype != *ptype
        {
            return false;
        }
        self.fields.iter().all(|(index, test)| match test {
            FieldMatch::Equals(v) => record.field(*index) == Some(v.as_str()),
            FieldMatch::IsNull => record.field(*index).is_none(),
        })
    }
}
