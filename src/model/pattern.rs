//! Wildcard patterns over conjunctions, used to reject whole families
//! of rules at once.

use std::fmt;

use crate::data::Column;
use crate::model::{And, Operator, SimpleRule};

/// A `column op *` wildcard matching any literal with that column and
/// operator, regardless of the compared value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternSlot {
    column: Column,
    operator: Operator,
}

impl PatternSlot {
    pub fn new(column: Column, operator: Operator) -> Self {
        Self { column, operator }
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn matches(&self, rule: &SimpleRule) -> bool {
        rule.column() == Some(&self.column) && rule.operator() == Some(self.operator)
    }
}

impl fmt::Display for PatternSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} *", self.column, self.operator)
    }
}

/// A pattern over conjunctions: exact literals that must all occur,
/// value wildcards that must each consume one further literal, and
/// optionally a trailing `*` that allows any remaining literals.
///
/// Without the trailing `*` the pattern must account for every literal
/// of the conjunction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RulePattern {
    exact: Vec<SimpleRule>,
    wildcards: Vec<PatternSlot>,
    allow_remaining: bool,
}

impl RulePattern {
    pub fn new(exact: Vec<SimpleRule>, wildcards: Vec<PatternSlot>, allow_remaining: bool) -> Self {
        Self {
            exact,
            wildcards,
            allow_remaining,
        }
    }

    /// The pattern matching exactly this conjunction and nothing else.
    pub fn exact(rule: &And) -> Self {
        Self::new(rule.children().to_vec(), Vec::new(), false)
    }

    pub fn matches(&self, rule: &And) -> bool {
        let mut unmatched: Vec<&SimpleRule> = rule.children().iter().collect();
        for r in &self.exact {
            match unmatched.iter().position(|c| *c == r) {
                Some(i) => {
                    unmatched.swap_remove(i);
                }
                None => return false,
            }
        }
        for slot in &self.wildcards {
            match unmatched.iter().position(|c| slot.matches(c)) {
                Some(i) => {
                    unmatched.swap_remove(i);
                }
                None => return false,
            }
        }
        self.allow_remaining || unmatched.is_empty()
    }

    /// If adding exactly one more literal to `prior` could make this
    /// pattern match, reports that literal (or wildcard slot) so rule
    /// creation can avoid proposing it. Patterns without the trailing
    /// `*` never trigger: more literals can always be added to escape
    /// them again.
    pub fn find_completion_to_invalid(
        &self,
        prior: &And,
        rule_buffer: &mut Vec<SimpleRule>,
        slot_buffer: &mut Vec<PatternSlot>,
    ) {
        if !self.allow_remaining {
            return;
        }
        let mut unmatched: Vec<&SimpleRule> = prior.children().iter().collect();
        let mut missing_rule = None;
        let mut missing_slot = None;
        let mut missing_count = 0;
        for r in &self.exact {
            match unmatched.iter().position(|c| *c == r) {
                Some(i) => {
                    unmatched.swap_remove(i);
                }
                None => {
                    missing_count += 1;
                    if missing_count > 1 {
                        return;
                    }
                    missing_rule = Some(r);
                }
            }
        }
        for slot in &self.wildcards {
            match unmatched.iter().position(|c| slot.matches(c)) {
                Some(i) => {
                    unmatched.swap_remove(i);
                }
                None => {
                    missing_count += 1;
                    if missing_count > 1 {
                        return;
                    }
                    missing_slot = Some(slot);
                }
            }
        }
        if missing_count == 1 {
            if let Some(slot) = missing_slot {
                slot_buffer.push(slot.clone());
            } else if let Some(rule) = missing_rule {
                rule_buffer.push(rule.clone());
            }
        }
    }
}

impl fmt::Display for RulePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for r in &self.exact {
            if !first {
                write!(f, " and ")?;
            }
            first = false;
            write!(f, "{r}")?;
        }
        for slot in &self.wildcards {
            if !first {
                write!(f, " and ")?;
            }
            first = false;
            write!(f, "{slot}")?;
        }
        if self.allow_remaining {
            if !first {
                write!(f, " and ")?;
            }
            write!(f, "*")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RecordScheme;
    use std::sync::Arc;

    fn scheme() -> RecordScheme {
        RecordScheme::new(vec![Arc::from("size")], vec![Arc::from("color")])
    }

    fn leq(v: f64) -> SimpleRule {
        SimpleRule::leq(scheme().column(0), v)
    }

    fn red() -> SimpleRule {
        SimpleRule::equals(scheme().column(1), Arc::from("red"))
    }

    #[test]
    fn exact_pattern_matches_only_the_same_conjunction() {
        let p = RulePattern::exact(&And::new(vec![leq(1.0), red()]));
        assert!(p.matches(&And::new(vec![red(), leq(1.0)])));
        assert!(!p.matches(&And::new(vec![leq(1.0)])));
        assert!(!p.matches(&And::new(vec![leq(1.0), red(), leq(2.0)])));
    }

    #[test]
    fn value_wildcard_matches_any_threshold() {
        let slot = PatternSlot::new(scheme().column(0), Operator::Leq);
        let p = RulePattern::new(vec![red()], vec![slot], false);
        assert!(p.matches(&And::new(vec![leq(1.0), red()])));
        assert!(p.matches(&And::new(vec![leq(99.0), red()])));
        assert!(!p.matches(&And::new(vec![red()])));
        assert!(!p.matches(&And::new(vec![
            SimpleRule::geq(scheme().column(0), 1.0),
            red()
        ])));
    }

    #[test]
    fn trailing_wildcard_allows_extra_literals() {
        let p = RulePattern::new(vec![red()], vec![], true);
        assert!(p.matches(&And::new(vec![red(), leq(1.0), leq(2.0)])));
        assert!(p.matches(&And::new(vec![red()])));
        assert!(!p.matches(&And::new(vec![leq(1.0)])));
    }

    #[test]
    fn completion_probe_reports_single_missing_literal() {
        let p = RulePattern::new(vec![red(), leq(1.0)], vec![], true);
        let mut rules = Vec::new();
        let mut slots = Vec::new();
        p.find_completion_to_invalid(&And::new(vec![red()]), &mut rules, &mut slots);
        assert_eq!(rules, vec![leq(1.0)]);
        assert!(slots.is_empty());
    }

    #[test]
    fn completion_probe_ignores_patterns_missing_two_literals() {
        let p = RulePattern::new(vec![red(), leq(1.0)], vec![], true);
        let mut rules = Vec::new();
        let mut slots = Vec::new();
        p.find_completion_to_invalid(&And::empty(), &mut rules, &mut slots);
        assert!(rules.is_empty() && slots.is_empty());
    }

    #[test]
    fn completion_probe_ignores_patterns_without_trailing_wildcard() {
        let p = RulePattern::new(vec![red(), leq(1.0)], vec![], false);
        let mut rules = Vec::new();
        let mut slots = Vec::new();
        p.find_completion_to_invalid(&And::new(vec![red()]), &mut rules, &mut slots);
        assert!(rules.is_empty());
    }

    #[test]
    fn display_renders_wildcards_last() {
        let slot = PatternSlot::new(scheme().column(0), Operator::Geq);
        let p = RulePattern::new(vec![red()], vec![slot], true);
        assert_eq!(p.to_string(), "color == 'red' and size >= * and *");
    }
}
