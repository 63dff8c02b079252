//! Predicates for filtered loads.

use super::codec::normalize;
use super::rule_record::RuleRecord;

/// Narrows the rows read by a filtered load before they reach the model.
///
/// Any `Fn(&RuleRecord) -> bool` is a filter that keeps matching rows.
pub trait PolicyFilter: Send + Sync {
    /// Returns the rows to keep.
    fn apply(&self, rules: Vec<RuleRecord>) -> Vec<RuleRecord>;
}

impl<F> PolicyFilter for F
where
    F: Fn(&RuleRecord) -> bool + Send + Sync,
{
    fn apply(&self, mut rules: Vec<RuleRecord>) -> Vec<RuleRecord> {
        rules.retain(|r| self(r));
        rules
    }
}

/// Field-position filter.
///
/// Keeps rows of `category` (any category when `None`) whose fields,
/// starting at `field_index`, equal the given values. Blank values place no
/// constraint on their position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    category: Option<String>,
    field_index: usize,
    values: Vec<Option<String>>,
}

impl FieldFilter {
    /// Creates a filter on `category` starting at `field_index`.
    #[must_use]
    pub fn new<S: AsRef<str>>(category: Option<&str>, field_index: usize, values: &[S]) -> Self {
        Self {
            category: category.and_then(normalize),
            field_index,
            values: values.iter().map(|v| normalize(v.as_ref())).collect(),
        }
    }

    /// Returns `true` if `rule` passes the filter.
    #[must_use]
    pub fn matches(&self, rule: &RuleRecord) -> bool {
        if let Some(category) = &self.category
            && rule.ptype != *category
        {
            return false;
        }
        self.values.iter().enumerate().all(|(offset, value)| {
            value.as_deref().is_none_or(|v| {
                self.field_index
                    .checked_add(offset)
                    .is_some_and(|index| rule.field(index) == Some(v))
            })
        })
    }
}

impl PolicyFilter for FieldFilter {
    fn apply(&self, mut rules: Vec<RuleRecord>) -> Vec<RuleRecord> {
        rules.retain(|r| self.matches(r));
        rules
    }
}
