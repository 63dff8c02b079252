//! The enforcer's in-memory policy model, as seen by the adapter.
//!
//! The adapter never evaluates rules. It only needs to enumerate what the
//! model holds (for save), add rules to it (for load) and ask how many
//! values a category declares. [`PolicyStore`] captures exactly that, and
//! [`MemoryPolicyStore`] is a plain ordered implementation.

use std::collections::{BTreeMap, HashMap};

/// Read/write access to an enforcer's in-memory rule set.
pub trait PolicyStore: Send {
    /// Returns every section with the categories it currently holds, in a
    /// stable order.
    fn sections(&self) -> Vec<(String, Vec<String>)>;

    /// Returns the rules stored for `category` in `section`.
    fn rules(&self, section: &str, category: &str) -> Vec<Vec<String>>;

    /// Returns the number of values the model declares for `category`, if
    /// the category is declared at all.
    fn required_values(&self, section: &str, category: &str) -> Option<usize>;

    /// Adds a rule; returns `false` if an identical rule was already held.
    fn add_policy(&mut self, section: &str, category: &str, values: Vec<String>) -> bool;
}

/// Ordered in-memory [`PolicyStore`].
///
/// Categories are kept per section in a `BTreeMap`, rules in insertion
/// order with duplicates rejected. Arity is declared per category with
/// [`MemoryPolicyStore::with_definition`].
#[derive(Debug, Clone, Default)]
pub struct MemoryPolicyStore {
    sections: BTreeMap<String, BTreeMap<String, Vec<Vec<String>>>>,
    arity: HashMap<String, usize>,
}

impl MemoryPolicyStore {
    /// Creates an empty store with no declared categories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `category` with `count` required values.
    #[must_use]
    pub fn with_definition(mut self, category: &str, count: usize) -> Self {
        self.arity.insert(category.to_string(), count);
        self
    }

    /// Returns the total number of rules across all sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Returns `true` if the store holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the exact rule is held.
    #[must_use]
    pub fn has_policy(&self, section: &str, category: &str, values: &[&str]) -> bool {
        self.sections
            .get(section)
            .and_then(|cats| cats.get(category))
            .is_some_and(|rules| rules.iter().any(|r| r == values))
    }

    /// Removes every rule while keeping declared arities.
    pub fn clear(&mut self) {
        self.sections.clear();
    }
}

impl PolicyStore for MemoryPolicyStore {
    fn sections(&self) -> Vec<(String, Vec<String>)> {
        self.sections
            .iter()
            .map(|(section, cats)| (section.clone(), cats.keys().cloned().collect()))
            .collect()
    }

    fn rules(&self, section: &str, category: &str) -> Vec<Vec<String>> {
        self.sections
            .get(section)
            .and_then(|cats| cats.get(category))
            .cloned()
            .unwrap_or_default()
    }

    fn required_values(&self, _section: &str, category: &str) -> Option<usize> {
        self.arity.get(category).copied()
    }

    fn add_policy(&mut self, section: &str, category: &str, values: Vec<String>) -> bool {
        let rules = self
            .sections
            .entry(section.to_string())
            .or_default()
            .entry(category.to_string())
            .or_default();
        if rules.contains(&values) {
            return false;
        }
        rules.push(values);
        true
    }
}
