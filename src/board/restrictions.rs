//! Standing user decisions about rules, per classification label.

use std::collections::HashSet;
use std::sync::Arc;

use crate::model::{And, PatternSlot, RulePattern, SimpleRule};

/// How the restrictions of one label judge a conjunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictionClassification {
    Accepted,
    Rejected,
    Candidate,
    Unknown,
}

/// The user's standing decisions for one label: accepted conjunctions
/// are injected into every rule set, rejected patterns are stripped,
/// candidates are neutral but shield matching conjunctions from
/// pattern stripping.
///
/// Owned exclusively by the coordination hub; no interior locking.
#[derive(Debug, Default)]
pub struct RuleRestrictions {
    accepted: Vec<Arc<And>>,
    rejected: Vec<RulePattern>,
    candidates: Vec<Arc<And>>,
}

impl RuleRestrictions {
    pub fn accept(&mut self, rules: Vec<Arc<And>>) {
        self.candidates.retain(|c| !rules.contains(c));
        for rule in rules {
            if !self.accepted.contains(&rule) {
                self.accepted.push(rule);
            }
        }
    }

    /// Rejects the exact form of each given conjunction.
    pub fn reject_rules(&mut self, rules: Vec<Arc<And>>) {
        self.accepted.retain(|a| !rules.contains(a));
        self.candidates.retain(|c| !rules.contains(c));
        for rule in rules {
            let pattern = RulePattern::exact(&rule);
            if !self.rejected.contains(&pattern) {
                self.rejected.push(pattern);
            }
        }
    }

    pub fn reject_pattern(&mut self, pattern: RulePattern) {
        if !self.rejected.contains(&pattern) {
            self.rejected.push(pattern);
        }
    }

    pub fn keep_as_candidate(&mut self, rules: Vec<Arc<And>>) {
        self.accepted.retain(|a| !rules.contains(a));
        for rule in rules {
            if !self.candidates.contains(&rule) {
                self.candidates.push(rule);
            }
        }
    }

    /// Forgets accept/candidate decisions about the given rules.
    pub fn remove(&mut self, rules: &[Arc<And>]) {
        self.accepted.retain(|a| !rules.contains(a));
        self.candidates.retain(|c| !rules.contains(c));
    }

    pub fn remove_pattern(&mut self, pattern: &RulePattern) {
        self.rejected.retain(|p| p != pattern);
    }

    pub fn accepted(&self) -> &[Arc<And>] {
        &self.accepted
    }

    pub fn candidates(&self) -> &[Arc<And>] {
        &self.candidates
    }

    pub fn rejected(&self) -> &[RulePattern] {
        &self.rejected
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.rejected.is_empty() && self.candidates.is_empty()
    }

    pub fn classify(&self, rule: &And) -> RestrictionClassification {
        if self.accepted.iter().any(|a| a.as_ref() == rule) {
            return RestrictionClassification::Accepted;
        }
        if self.candidates.iter().any(|c| c.as_ref() == rule) {
            return RestrictionClassification::Candidate;
        }
        if self.rejected.iter().any(|p| p.matches(rule)) {
            return RestrictionClassification::Rejected;
        }
        RestrictionClassification::Unknown
    }

    /// Distills the rejected patterns into the literals and wildcard
    /// slots that must not be appended to `prior` during greedy rule
    /// growth.
    pub fn to_creation_restriction(&self, prior: &And) -> CreationRestriction {
        let mut invalid_rules = Vec::new();
        let mut invalid_slots = Vec::new();
        for pattern in &self.rejected {
            pattern.find_completion_to_invalid(prior, &mut invalid_rules, &mut invalid_slots);
        }
        CreationRestriction {
            invalid_rules: invalid_rules.into_iter().collect(),
            invalid_slots: invalid_slots.into_iter().collect(),
        }
    }
}

/// A snapshot of what rule creation must not propose next, checked
/// once per candidate literal without further hub round-trips.
#[derive(Debug, Default, Clone)]
pub struct CreationRestriction {
    invalid_rules: HashSet<SimpleRule>,
    invalid_slots: HashSet<PatternSlot>,
}

impl CreationRestriction {
    pub fn slot_can_be_valid(&self, slot: &PatternSlot) -> bool {
        !self.invalid_slots.contains(slot)
    }

    pub fn can_be_valid(&self, rule: &SimpleRule) -> bool {
        if self.invalid_rules.contains(rule) {
            return false;
        }
        match (rule.column(), rule.operator()) {
            (Some(column), Some(operator)) => {
                self.slot_can_be_valid(&PatternSlot::new(column.clone(), operator))
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RecordScheme;
    use crate::model::Operator;

    fn scheme() -> RecordScheme {
        RecordScheme::new(vec![Arc::from("size")], vec![Arc::from("color")])
    }

    fn leq(v: f64) -> SimpleRule {
        SimpleRule::leq(scheme().column(0), v)
    }

    fn red() -> Arc<And> {
        Arc::new(And::single(SimpleRule::equals(
            scheme().column(1),
            Arc::from("red"),
        )))
    }

    #[test]
    fn accept_overrides_candidate_status() {
        let mut r = RuleRestrictions::default();
        r.keep_as_candidate(vec![red()]);
        assert_eq!(r.classify(&red()), RestrictionClassification::Candidate);
        r.accept(vec![red()]);
        assert_eq!(r.classify(&red()), RestrictionClassification::Accepted);
        assert!(r.candidates().is_empty());
    }

    #[test]
    fn reject_converts_rules_to_exact_patterns() {
        let mut r = RuleRestrictions::default();
        r.accept(vec![red()]);
        r.reject_rules(vec![red()]);
        assert!(r.accepted().is_empty());
        assert_eq!(r.classify(&red()), RestrictionClassification::Rejected);
        // A longer conjunction escapes the exact pattern.
        assert_eq!(
            r.classify(&red().and(leq(1.0))),
            RestrictionClassification::Unknown
        );
    }

    #[test]
    fn remove_forgets_decisions() {
        let mut r = RuleRestrictions::default();
        r.accept(vec![red()]);
        r.remove(&[red()]);
        assert_eq!(r.classify(&red()), RestrictionClassification::Unknown);
        let p = RulePattern::exact(&red());
        r.reject_pattern(p.clone());
        r.remove_pattern(&p);
        assert!(r.is_empty());
    }

    #[test]
    fn creation_restriction_blocks_one_step_completions() {
        let mut r = RuleRestrictions::default();
        // Reject "anything red": proposing red() while growing any
        // prior rule would immediately match the pattern.
        r.reject_pattern(RulePattern::new(
            red().children().to_vec(),
            vec![],
            true,
        ));
        r.reject_pattern(RulePattern::new(
            vec![leq(2.0)],
            vec![PatternSlot::new(scheme().column(0), Operator::Geq)],
            true,
        ));
        let cr = r.to_creation_restriction(&And::empty());
        assert!(!cr.can_be_valid(&red().children()[0]));
        assert!(cr.can_be_valid(&leq(1.0)));

        // With leq(2.0) already present, any size >= literal completes
        // the second pattern.
        let cr = r.to_creation_restriction(&And::single(leq(2.0)));
        assert!(!cr.can_be_valid(&SimpleRule::geq(scheme().column(0), 5.0)));
        assert!(cr.can_be_valid(&leq(1.0)));
    }
}
