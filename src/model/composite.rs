//! Conjunctions and disjunctions of literals.

use std::fmt;
use std::sync::Arc;

use crate::data::Record;
use crate::model::{FeatureMultiset, SimpleRule};

/// A conjunction of literals in canonical order.
///
/// Children are kept sorted and deduplicated, so two conjunctions
/// built from the same literals in any order compare equal. The empty
/// conjunction renders as `()` and matches every record; it only
/// appears transiently during editing and is removed by rule-set
/// simplification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct And {
    children: Vec<SimpleRule>,
}

impl And {
    pub fn new(mut children: Vec<SimpleRule>) -> Self {
        children.sort();
        children.dedup();
        Self { children }
    }

    pub fn single(rule: SimpleRule) -> Self {
        Self::new(vec![rule])
    }

    pub fn empty() -> Self {
        Self { children: Vec::new() }
    }

    pub fn children(&self) -> &[SimpleRule] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn test(&self, record: &Record) -> bool {
        self.children.iter().all(|c| c.test(record))
    }

    /// This conjunction with one more literal.
    pub fn and(&self, rule: SimpleRule) -> And {
        let mut children = self.children.clone();
        children.push(rule);
        And::new(children)
    }

    pub fn without_child(&self, child: &SimpleRule) -> And {
        And::new(
            self.children
                .iter()
                .filter(|c| *c != child)
                .cloned()
                .collect(),
        )
    }

    pub fn with_replaced_child(&self, old: &SimpleRule, new: SimpleRule) -> And {
        let mut children: Vec<SimpleRule> = self
            .children
            .iter()
            .filter(|c| *c != old)
            .cloned()
            .collect();
        children.push(new);
        And::new(children)
    }

    pub fn used_features(&self) -> FeatureMultiset {
        let mut ret = FeatureMultiset::new();
        for c in &self.children {
            ret.add_all(&c.used_features());
        }
        ret
    }

    pub fn complexity(&self) -> u64 {
        self.children.iter().map(SimpleRule::complexity).sum()
    }
}

impl fmt::Display for And {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, c) in self.children.iter().enumerate() {
            if i > 0 {
                write!(f, " and ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, ")")
    }
}

/// A disjunction of conjunctions in canonical order.
///
/// Children are shared via [`Arc`]: the edit operations reuse the
/// untouched conjunctions of the original, so derived rule sets share
/// structure instead of deep-copying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Or {
    children: Vec<Arc<And>>,
}

impl Or {
    pub fn new(mut children: Vec<Arc<And>>) -> Self {
        children.sort();
        Self { children }
    }

    pub fn children(&self) -> &[Arc<And>] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn test(&self, record: &Record) -> bool {
        self.children.iter().any(|c| c.test(record))
    }

    /// This disjunction with one more conjunction.
    pub fn or(&self, rule: Arc<And>) -> Or {
        let mut children = self.children.clone();
        children.push(rule);
        Or::new(children)
    }

    pub fn or_all(&self, other: &Or) -> Or {
        let mut children = self.children.clone();
        children.extend(other.children.iter().cloned());
        Or::new(children)
    }

    pub fn without_child(&self, child: &And) -> Or {
        Or::new(
            self.children
                .iter()
                .filter(|c| c.as_ref() != child)
                .cloned()
                .collect(),
        )
    }

    pub fn with_replaced_child(&self, old: &And, new: Arc<And>) -> Or {
        let mut children: Vec<Arc<And>> = self
            .children
            .iter()
            .filter(|c| c.as_ref() != old)
            .cloned()
            .collect();
        children.push(new);
        Or::new(children)
    }

    pub fn contains(&self, rule: &And) -> bool {
        self.children.iter().any(|c| c.as_ref() == rule)
    }

    pub fn used_features(&self) -> FeatureMultiset {
        let mut ret = FeatureMultiset::new();
        for c in &self.children {
            ret.add_all(&c.used_features());
        }
        ret
    }

    /// Total literal count plus one per conjunction.
    pub fn complexity(&self) -> u64 {
        self.children.len() as u64 + self.children.iter().map(|c| c.complexity()).sum::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RecordScheme;

    fn scheme() -> RecordScheme {
        RecordScheme::new(vec![Arc::from("size")], vec![Arc::from("color")])
    }

    fn record(size: f64, color: &str) -> Record {
        Record::new(0, vec![size], vec![Some(Arc::from(color))], Arc::from("a"))
    }

    #[test]
    fn and_canonicalizes_child_order_and_duplicates() {
        let s = scheme();
        let a = And::new(vec![
            SimpleRule::equals(s.column(1), Arc::from("red")),
            SimpleRule::leq(s.column(0), 1.0),
            SimpleRule::leq(s.column(0), 1.0),
        ]);
        let b = And::new(vec![
            SimpleRule::leq(s.column(0), 1.0),
            SimpleRule::equals(s.column(1), Arc::from("red")),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.to_string(), "(color == 'red' and size<=1)");
    }

    #[test]
    fn and_requires_all_children() {
        let s = scheme();
        let a = And::new(vec![
            SimpleRule::leq(s.column(0), 2.0),
            SimpleRule::equals(s.column(1), Arc::from("red")),
        ]);
        assert!(a.test(&record(1.0, "red")));
        assert!(!a.test(&record(1.0, "blue")));
        assert!(!a.test(&record(3.0, "red")));
    }

    #[test]
    fn empty_and_matches_everything() {
        assert!(And::empty().test(&record(1.0, "red")));
        assert_eq!(And::empty().to_string(), "()");
    }

    #[test]
    fn or_requires_any_child() {
        let s = scheme();
        let o = Or::new(vec![
            Arc::new(And::single(SimpleRule::leq(s.column(0), 1.0))),
            Arc::new(And::single(SimpleRule::equals(s.column(1), Arc::from("red")))),
        ]);
        assert!(o.test(&record(0.5, "blue")));
        assert!(o.test(&record(5.0, "red")));
        assert!(!o.test(&record(5.0, "blue")));
        assert!(!Or::default().test(&record(0.5, "red")));
    }

    #[test]
    fn edits_preserve_untouched_children() {
        let s = scheme();
        let keep = Arc::new(And::single(SimpleRule::leq(s.column(0), 1.0)));
        let drop = Arc::new(And::single(SimpleRule::geq(s.column(0), 9.0)));
        let o = Or::new(vec![Arc::clone(&keep), Arc::clone(&drop)]);
        let edited = o.without_child(&drop);
        assert_eq!(edited.len(), 1);
        assert!(Arc::ptr_eq(&edited.children()[0], &keep));
    }

    #[test]
    fn complexity_counts_literals_and_conjunctions() {
        let s = scheme();
        let a = And::new(vec![
            SimpleRule::leq(s.column(0), 1.0),
            SimpleRule::True,
            SimpleRule::equals(s.column(1), Arc::from("red")),
        ]);
        assert_eq!(a.complexity(), 2);
        let o = Or::new(vec![Arc::new(a), Arc::new(And::empty())]);
        assert_eq!(o.complexity(), 4);
    }
}
