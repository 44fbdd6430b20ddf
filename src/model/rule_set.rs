//! Whole classifiers: default label plus exception list.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::data::{Record, RecordSet};
use crate::model::{And, FeatureMultiset, Or, RulePattern, SimpleRule};

/// One exception of a rule set: records matching `condition` get
/// `label` instead of the default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Exception {
    label: Arc<str>,
    condition: Or,
}

impl Exception {
    pub fn label(&self) -> &Arc<str> {
        &self.label
    }

    pub fn condition(&self) -> &Or {
        &self.condition
    }
}

/// An immutable classifier: a default label and an ordered list of
/// exceptions. [`RuleSet::apply`] returns the label of the first
/// exception whose condition matches, else the default.
///
/// All edit operations return a new rule set; untouched conditions
/// are shared with the original. The hash is precomputed because rule
/// sets are the keys of the evaluation cache.
#[derive(Debug, Clone)]
pub struct RuleSet {
    default_label: Arc<str>,
    exceptions: Vec<Exception>,
    hash: u64,
}

impl RuleSet {
    /// A rule set that maps everything to `default_label`.
    pub fn create(default_label: Arc<str>) -> Self {
        Self::build(default_label, Vec::new())
    }

    fn build(default_label: Arc<str>, exceptions: Vec<Exception>) -> Self {
        let mut hasher = DefaultHasher::new();
        default_label.hash(&mut hasher);
        exceptions.hash(&mut hasher);
        let hash = hasher.finish();
        Self {
            default_label,
            exceptions,
            hash,
        }
    }

    pub fn default_label(&self) -> &Arc<str> {
        &self.default_label
    }

    pub fn exceptions(&self) -> &[Exception] {
        &self.exceptions
    }

    pub fn exception_count(&self) -> usize {
        self.exceptions.len()
    }

    pub fn apply(&self, record: &Record) -> &Arc<str> {
        for ex in &self.exceptions {
            if ex.condition.test(record) {
                return &ex.label;
            }
        }
        &self.default_label
    }

    pub fn change_default(&self, default_label: Arc<str>) -> RuleSet {
        Self::build(default_label, self.exceptions.clone())
    }

    /// Appends a new exception block.
    pub fn add_exception(&self, label: Arc<str>, condition: Or) -> RuleSet {
        let mut exceptions = self.exceptions.clone();
        exceptions.push(Exception { label, condition });
        Self::build(Arc::clone(&self.default_label), exceptions)
    }

    /// Adds one conjunction under `label`, extending the existing
    /// exception for that label or appending a new one.
    pub fn add_rule(&self, label: &Arc<str>, rule: Arc<And>) -> RuleSet {
        match self.exceptions.iter().position(|ex| &ex.label == label) {
            Some(i) => {
                let mut exceptions = self.exceptions.clone();
                exceptions[i].condition = exceptions[i].condition.or(rule);
                Self::build(Arc::clone(&self.default_label), exceptions)
            }
            None => self.add_exception(Arc::clone(label), Or::new(vec![rule])),
        }
    }

    /// Removes one conjunction wherever it occurs under `label`.
    pub fn remove_rule(&self, label: &str, rule: &And) -> RuleSet {
        let exceptions = self
            .exceptions
            .iter()
            .map(|ex| {
                if ex.label.as_ref() == label {
                    Exception {
                        label: Arc::clone(&ex.label),
                        condition: ex.condition.without_child(rule),
                    }
                } else {
                    ex.clone()
                }
            })
            .collect();
        Self::build(Arc::clone(&self.default_label), exceptions)
    }

    /// Removes one conjunction from the exception at `index`.
    pub fn remove_rule_at(&self, index: usize, rule: &And) -> RuleSet {
        let mut exceptions = self.exceptions.clone();
        exceptions[index].condition = exceptions[index].condition.without_child(rule);
        Self::build(Arc::clone(&self.default_label), exceptions)
    }

    /// Replaces one conjunction under `label`.
    pub fn replace_rule(&self, label: &str, old: &And, new: Arc<And>) -> RuleSet {
        let exceptions = self
            .exceptions
            .iter()
            .map(|ex| {
                if ex.label.as_ref() == label && ex.condition.contains(old) {
                    Exception {
                        label: Arc::clone(&ex.label),
                        condition: ex.condition.with_replaced_child(old, Arc::clone(&new)),
                    }
                } else {
                    ex.clone()
                }
            })
            .collect();
        Self::build(Arc::clone(&self.default_label), exceptions)
    }

    /// Removes every conjunction under `index` that matches `pattern`,
    /// except the explicitly whitelisted ones.
    pub fn remove_matching(
        &self,
        index: usize,
        pattern: &RulePattern,
        whitelist: &[Arc<And>],
    ) -> RuleSet {
        let mut exceptions = self.exceptions.clone();
        let kept: Vec<Arc<And>> = exceptions[index]
            .condition
            .children()
            .iter()
            .filter(|c| !pattern.matches(c) || whitelist.iter().any(|w| w == *c))
            .cloned()
            .collect();
        exceptions[index].condition = Or::new(kept);
        Self::build(Arc::clone(&self.default_label), exceptions)
    }

    /// Merges every exception rule of `other` into this rule set.
    pub fn add_all(&self, other: &RuleSet) -> RuleSet {
        let mut ret = self.clone();
        for ex in &other.exceptions {
            for rule in ex.condition.children() {
                ret = ret.add_rule(&ex.label, Arc::clone(rule));
            }
        }
        ret
    }

    /// All conjunctions currently filed under `label`.
    pub fn rules_for(&self, label: &str) -> Vec<Arc<And>> {
        self.exceptions
            .iter()
            .filter(|ex| ex.label.as_ref() == label)
            .flat_map(|ex| ex.condition.children().iter().cloned())
            .collect()
    }

    /// Canonicalizes the rule set: deduplicates conjunctions, drops
    /// constant-true literals, merges ordinal bounds per column into
    /// an interval, rewrites `!=` on two-valued nominal columns to
    /// `==` of the other value, and drops conjunctions that can never
    /// match. Exceptions that end up empty disappear, as does a
    /// leading exception carrying the default label.
    pub fn simplify(&self, data: &RecordSet) -> RuleSet {
        let mut ret = RuleSet::create(Arc::clone(&self.default_label));
        for ex in &self.exceptions {
            let mut new_rules: Vec<Arc<And>> = Vec::new();
            for rule in ex.condition.children() {
                if let Some(simplified) = simplify_single_rule(rule, data) {
                    let simplified = Arc::new(simplified);
                    if !new_rules.contains(&simplified) {
                        new_rules.push(simplified);
                    }
                }
            }
            if !new_rules.is_empty()
                && (ret.exception_count() > 0 || self.default_label != ex.label)
            {
                ret = ret.add_exception(Arc::clone(&ex.label), Or::new(new_rules));
            }
        }
        ret
    }

    /// Exception count plus the complexity of every condition.
    pub fn complexity(&self) -> u64 {
        self.exceptions
            .iter()
            .map(|ex| 1 + ex.condition.complexity())
            .sum()
    }

    pub fn used_features(&self) -> FeatureMultiset {
        let mut ret = FeatureMultiset::new();
        for ex in &self.exceptions {
            ret.add_all(&ex.condition.used_features());
        }
        ret
    }

    /// Number of distinct columns referenced anywhere in the rule set.
    pub fn feature_count(&self) -> u64 {
        self.used_features().distinct_count() as u64
    }
}

/// `None` when the conjunction can never match.
fn simplify_single_rule(rule: &And, data: &RecordSet) -> Option<And> {
    let mut nominal: Vec<SimpleRule> = Vec::new();
    // One (lower, upper) interval per ordinal column.
    let mut intervals: Vec<(crate::data::Column, f64, f64)> = Vec::new();
    for child in rule.children() {
        match child {
            SimpleRule::False => return None,
            SimpleRule::True => {}
            SimpleRule::Leq { column, value } | SimpleRule::Geq { column, value } => {
                let (lower, upper) = match child {
                    SimpleRule::Leq { .. } => (f64::NEG_INFINITY, *value),
                    _ => (*value, f64::INFINITY),
                };
                match intervals.iter_mut().find(|(c, _, _)| c == column) {
                    Some((_, l, u)) => {
                        *l = l.max(lower);
                        *u = u.min(upper);
                    }
                    None => intervals.push((column.clone(), lower, upper)),
                }
            }
            SimpleRule::Equals { .. } => nominal.push(child.clone()),
            SimpleRule::NotEquals { column, value } => {
                nominal.push(binary_not_equals_to_equals(column, value, data));
            }
        }
    }

    let mut children = nominal;
    for (column, lower, upper) in intervals {
        if lower > upper {
            return None;
        }
        if lower > f64::NEG_INFINITY {
            children.push(SimpleRule::geq(column.clone(), lower));
        }
        if upper < f64::INFINITY {
            children.push(SimpleRule::leq(column, upper));
        }
    }

    if children.is_empty() {
        None
    } else {
        Some(And::new(children))
    }
}

/// `!=` on a column with exactly two observed values is the same as
/// `==` of the other value, which reads better.
fn binary_not_equals_to_equals(
    column: &crate::data::Column,
    value: &Arc<str>,
    data: &RecordSet,
) -> SimpleRule {
    let values = data.nominal_values(column.typed_index());
    if values.len() == 2 {
        if let Some(other) = values.iter().find(|v| *v != value) {
            return SimpleRule::equals(column.clone(), Arc::clone(other));
        }
    }
    SimpleRule::not_equals(column.clone(), Arc::clone(value))
}

impl PartialEq for RuleSet {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.default_label == other.default_label
            && self.exceptions == other.exceptions
    }
}

impl Eq for RuleSet {}

impl Hash for RuleSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "normally use {}", self.default_label)?;
        for ex in &self.exceptions {
            writeln!(f, "but use {} when", ex.label)?;
            for (i, rule) in ex.condition.children().iter().enumerate() {
                if i == 0 {
                    writeln!(f, "  {rule}")?;
                } else {
                    writeln!(f, "  or {rule}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Record, RecordScheme};

    fn scheme() -> Arc<RecordScheme> {
        Arc::new(RecordScheme::new(
            vec![Arc::from("size")],
            vec![Arc::from("color")],
        ))
    }

    fn record(size: f64, color: &str) -> Record {
        Record::new(0, vec![size], vec![Some(Arc::from(color))], Arc::from("a"))
    }

    fn data() -> RecordSet {
        RecordSet::new(
            scheme(),
            vec![
                Record::new(0, vec![1.0], vec![Some(Arc::from("red"))], Arc::from("a")),
                Record::new(1, vec![2.0], vec![Some(Arc::from("blue"))], Arc::from("b")),
            ],
        )
    }

    fn leq(v: f64) -> SimpleRule {
        SimpleRule::leq(scheme().column(0), v)
    }

    fn geq(v: f64) -> SimpleRule {
        SimpleRule::geq(scheme().column(0), v)
    }

    #[test]
    fn first_matching_exception_wins() {
        let rs = RuleSet::create(Arc::from("a"))
            .add_rule(&Arc::from("b"), Arc::new(And::single(leq(5.0))))
            .add_rule(&Arc::from("c"), Arc::new(And::single(leq(10.0))));
        assert_eq!(rs.apply(&record(3.0, "red")).as_ref(), "b");
        assert_eq!(rs.apply(&record(7.0, "red")).as_ref(), "c");
        assert_eq!(rs.apply(&record(20.0, "red")).as_ref(), "a");
    }

    #[test]
    fn add_rule_extends_existing_exception() {
        let label: Arc<str> = Arc::from("b");
        let rs = RuleSet::create(Arc::from("a"))
            .add_rule(&label, Arc::new(And::single(leq(1.0))))
            .add_rule(&label, Arc::new(And::single(geq(9.0))));
        assert_eq!(rs.exception_count(), 1);
        assert_eq!(rs.rules_for("b").len(), 2);
    }

    #[test]
    fn equal_rule_sets_share_hash_and_compare_equal() {
        let make = || {
            RuleSet::create(Arc::from("a")).add_rule(&Arc::from("b"), Arc::new(And::single(leq(1.0))))
        };
        assert_eq!(make(), make());
        let mut set = std::collections::HashSet::new();
        set.insert(make());
        assert!(set.contains(&make()));
    }

    #[test]
    fn simplify_merges_duplicate_conjunctions() {
        let label: Arc<str> = Arc::from("b");
        let rule = Arc::new(And::single(leq(1.5)));
        let dup = RuleSet::create(Arc::from("a"))
            .add_rule(&label, Arc::clone(&rule))
            .add_rule(&label, Arc::clone(&rule));
        let single = RuleSet::create(Arc::from("a")).add_rule(&label, rule);
        assert_eq!(dup.simplify(&data()), single.simplify(&data()));
    }

    #[test]
    fn simplify_merges_interval_bounds() {
        let and = And::new(vec![leq(5.0), leq(3.0), geq(1.0), geq(2.0)]);
        let rs = RuleSet::create(Arc::from("a")).add_rule(&Arc::from("b"), Arc::new(and));
        let simplified = rs.simplify(&data());
        let rules = simplified.rules_for("b");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].as_ref(), &And::new(vec![geq(2.0), leq(3.0)]));
    }

    #[test]
    fn simplify_drops_impossible_conjunctions() {
        let and = And::new(vec![leq(1.0), geq(2.0)]);
        let rs = RuleSet::create(Arc::from("a")).add_rule(&Arc::from("b"), Arc::new(and));
        assert_eq!(rs.simplify(&data()).exception_count(), 0);
    }

    #[test]
    fn simplify_rewrites_not_equals_on_binary_columns() {
        let and = And::single(SimpleRule::not_equals(scheme().column(1), Arc::from("red")));
        let rs = RuleSet::create(Arc::from("a")).add_rule(&Arc::from("b"), Arc::new(and));
        let rules = rs.simplify(&data()).rules_for("b");
        assert_eq!(
            rules[0].as_ref(),
            &And::single(SimpleRule::equals(scheme().column(1), Arc::from("blue")))
        );
    }

    #[test]
    fn simplify_drops_leading_default_label_exception() {
        let rs = RuleSet::create(Arc::from("a"))
            .add_rule(&Arc::from("a"), Arc::new(And::single(leq(1.5))))
            .add_rule(&Arc::from("b"), Arc::new(And::single(geq(9.0))));
        let simplified = rs.simplify(&data());
        assert_eq!(simplified.exception_count(), 1);
        assert!(simplified.rules_for("a").is_empty());
    }

    #[test]
    fn simplify_is_idempotent() {
        let and = And::new(vec![
            leq(5.0),
            geq(1.0),
            SimpleRule::not_equals(scheme().column(1), Arc::from("red")),
            SimpleRule::True,
        ]);
        let rs = RuleSet::create(Arc::from("a")).add_rule(&Arc::from("b"), Arc::new(and));
        let once = rs.simplify(&data());
        assert_eq!(once.simplify(&data()), once);
    }

    #[test]
    fn display_renders_exception_blocks() {
        let label: Arc<str> = Arc::from("b");
        let rs = RuleSet::create(Arc::from("a"))
            .add_rule(&label, Arc::new(And::single(leq(1.5))))
            .add_rule(&label, Arc::new(And::single(geq(9.0))));
        assert_eq!(
            rs.to_string(),
            "normally use a\nbut use b when\n  (size<=1.5)\n  or (size>=9)\n"
        );
    }

    #[test]
    fn complexity_and_feature_count() {
        let rs = RuleSet::create(Arc::from("a"))
            .add_rule(&Arc::from("b"), Arc::new(And::new(vec![leq(1.0), geq(0.0)])));
        // 1 per exception + 1 per conjunction + 1 per literal.
        assert_eq!(rs.complexity(), 4);
        assert_eq!(rs.feature_count(), 1);
    }
}
