//! The rule language.
//!
//! Rules form a fixed three-level shape. At the bottom are
//! [`SimpleRule`] literals: threshold comparisons on ordinal columns,
//! (in)equalities on nominal columns, and the two constants. Literals
//! combine into canonically ordered conjunctions ([`And`]), those into
//! disjunctions ([`Or`]), and a whole classifier is a [`RuleSet`]: a
//! default label plus an ordered list of exceptions whose conditions
//! are disjunctions. Arbitrary nesting is deliberately impossible so
//! that every reachable rule stays human-readable.
//!
//! [`RulePattern`] matches families of conjunctions for rejection
//! bookkeeping, and [`RuleSetParser`] turns the textual forms back
//! into values.

mod composite;
mod parser;
mod pattern;
mod rule_set;
mod simple;

pub use composite::{And, Or};
pub use parser::RuleSetParser;
pub use pattern::{PatternSlot, RulePattern};
pub use rule_set::{Exception, RuleSet};
pub use simple::{Operator, SimpleRule};

use std::collections::BTreeMap;
use std::sync::Arc;

/// Multiset of column names used by a rule. Iteration order is sorted
/// by name so renderings and canonical orderings are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureMultiset {
    counts: BTreeMap<Arc<str>, usize>,
}

impl FeatureMultiset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(name: Arc<str>) -> Self {
        let mut ret = Self::new();
        ret.add(name);
        ret
    }

    pub fn add(&mut self, name: Arc<str>) {
        *self.counts.entry(name).or_insert(0) += 1;
    }

    pub fn add_all(&mut self, other: &FeatureMultiset) {
        for (name, count) in &other.counts {
            *self.counts.entry(Arc::clone(name)).or_insert(0) += count;
        }
    }

    /// Occurrences of one column name, with multiplicity.
    pub fn count(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// Number of distinct column names.
    pub fn distinct_count(&self) -> usize {
        self.counts.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.counts.contains_key(name)
    }

    pub fn distinct(&self) -> impl Iterator<Item = &Arc<str>> {
        self.counts.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiset_counts_with_multiplicity() {
        let mut m = FeatureMultiset::new();
        m.add(Arc::from("a"));
        m.add(Arc::from("b"));
        m.add(Arc::from("a"));
        assert_eq!(m.count("a"), 2);
        assert_eq!(m.count("b"), 1);
        assert_eq!(m.count("c"), 0);
        assert_eq!(m.distinct_count(), 2);
        let names: Vec<&str> = m.distinct().map(|n| n.as_ref()).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
