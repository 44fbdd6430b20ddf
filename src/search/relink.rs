//! Path relinking between two archive solutions.
//!
//! The symmetric difference of two rule sets is turned into a list of
//! edit actions. Walking from the better endpoint, each step applies
//! the action whose result scores best under the current target
//! function, publishing every intermediate solution to the archive.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::archive::{TargetFunction, ValuedResult};
use crate::board::Blackboard;
use crate::model::{And, RuleSet};

/// One edit on the path between the two endpoints.
#[derive(Debug, Clone)]
enum EditAction {
    ChangeDefault(Arc<str>),
    Remove { label: Arc<str>, rule: Arc<And> },
    Add { label: Arc<str>, rule: Arc<And> },
}

impl EditAction {
    fn apply(&self, rule_set: &RuleSet) -> RuleSet {
        match self {
            EditAction::ChangeDefault(label) => rule_set.change_default(Arc::clone(label)),
            EditAction::Remove { label, rule } => rule_set.remove_rule(label, rule),
            EditAction::Add { label, rule } => rule_set.add_rule(label, Arc::clone(rule)),
        }
    }
}

/// Connects a solution to the current best and to a random archive
/// member by walking the edit path between them.
pub struct PathRelinking {
    board: Blackboard,
}

impl PathRelinking {
    pub fn new(board: Blackboard) -> Self {
        Self { board }
    }

    /// Relinks `result` against the best solution within the
    /// navigation limits and against a random archive member.
    pub fn perform_with(&self, rng: &mut impl Rng, result: &ValuedResult<RuleSet>) {
        let target = self.board.current_target_function();
        if let Some(best) = self.board.best_result_in_limits(rng) {
            self.relink(rng, result, &best, &target);
        }
        if let Some(other) = self.board.random_result(rng) {
            self.relink(rng, result, &other, &target);
        }
    }

    fn relink(
        &self,
        rng: &mut impl Rng,
        a: &ValuedResult<RuleSet>,
        b: &ValuedResult<RuleSet>,
        target: &TargetFunction,
    ) {
        let a = self.board.simplify_evaluate_and_add(a.item());
        let b = self.board.simplify_evaluate_and_add(b.item());
        if a.item() == b.item() {
            return;
        }
        // Walk from the better endpoint toward the worse one.
        let (start, end) = if target.apply(&a) <= target.apply(&b) {
            (a, b)
        } else {
            (b, a)
        };

        let mut actions = diff_actions(start.item(), end.item());
        actions.shuffle(rng);
        debug!(steps = actions.len(), "relinking");

        let mut cur = start;
        while !actions.is_empty() {
            let cur_value = target.apply(&cur);
            let (index, candidate) = self.choose_step(&actions, &cur, cur_value, target);
            actions.swap_remove(index);
            cur = candidate;
        }
    }

    /// The first action improving on the current value, else the least
    /// bad one, with dominance as tie breaker. `actions` must not be
    /// empty.
    fn choose_step(
        &self,
        actions: &[EditAction],
        cur: &ValuedResult<RuleSet>,
        cur_value: f64,
        target: &TargetFunction,
    ) -> (usize, ValuedResult<RuleSet>) {
        let mut best_index = 0;
        let mut best: Option<ValuedResult<RuleSet>> = None;
        let mut best_value = f64::INFINITY;
        for (i, action) in actions.iter().enumerate() {
            let candidate = self
                .board
                .simplify_evaluate_and_add(&action.apply(cur.item()));
            let value = target.apply(&candidate);
            if value < cur_value {
                return (i, candidate);
            }
            let better = match &best {
                None => true,
                Some(current_best) => {
                    value < best_value
                        || (value == best_value && candidate.dominates(current_best))
                }
            };
            if better {
                best_index = i;
                best_value = value;
                best = Some(candidate);
            }
        }
        match best {
            Some(candidate) => (best_index, candidate),
            None => (0, cur.clone()),
        }
    }
}

/// The edits turning `start` into `end`: a default-label change plus
/// the symmetric difference of the per-label conjunction sets.
fn diff_actions(start: &RuleSet, end: &RuleSet) -> Vec<EditAction> {
    let mut actions = Vec::new();
    if start.default_label() != end.default_label() {
        actions.push(EditAction::ChangeDefault(Arc::clone(end.default_label())));
    }
    let labels: BTreeSet<Arc<str>> = start
        .exceptions()
        .iter()
        .chain(end.exceptions())
        .map(|ex| Arc::clone(ex.label()))
        .collect();
    for label in labels {
        let in_start = start.rules_for(&label);
        let in_end = end.rules_for(&label);
        for rule in &in_start {
            if !in_end.contains(rule) {
                actions.push(EditAction::Remove {
                    label: Arc::clone(&label),
                    rule: Arc::clone(rule),
                });
            }
        }
        for rule in in_end {
            if !in_start.contains(&rule) {
                actions.push(EditAction::Add {
                    label: Arc::clone(&label),
                    rule,
                });
            }
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Record, RecordScheme, RecordSet};
    use crate::eval::StandardObjectives;
    use crate::model::SimpleRule;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_records() -> Arc<RecordSet> {
        let scheme = Arc::new(RecordScheme::new(
            vec![Arc::from("size")],
            vec![Arc::from("color")],
        ));
        let records = (0..8)
            .map(|i| {
                Record::new(
                    i,
                    vec![f64::from(i)],
                    vec![Some(Arc::from(if i % 2 == 0 { "red" } else { "blue" }))],
                    Arc::from(if i < 4 { "keep" } else { "drop" }),
                )
            })
            .collect();
        Arc::new(RecordSet::new(scheme, records))
    }

    fn sample_board() -> Blackboard {
        let records = sample_records();
        let evaluator = Arc::new(StandardObjectives::from_records(&records));
        Blackboard::new(records, evaluator, 0)
    }

    fn rule(board: &Blackboard, threshold: f64) -> Arc<And> {
        Arc::new(And::single(SimpleRule::leq(
            board.records().scheme().column(0),
            threshold,
        )))
    }

    #[test]
    fn diff_covers_default_and_both_rule_directions() {
        let board = sample_board();
        let keep: Arc<str> = Arc::from("keep");
        let start = RuleSet::create(Arc::from("drop")).add_rule(&keep, rule(&board, 1.5));
        let end = RuleSet::create(Arc::from("keep")).add_rule(&keep, rule(&board, 3.5));

        let actions = diff_actions(&start, &end);
        assert_eq!(actions.len(), 3);
        assert!(actions
            .iter()
            .any(|a| matches!(a, EditAction::ChangeDefault(l) if l.as_ref() == "keep")));
        assert!(actions.iter().any(|a| matches!(a, EditAction::Remove { .. })));
        assert!(actions.iter().any(|a| matches!(a, EditAction::Add { .. })));
    }

    #[test]
    fn diff_of_equal_sets_is_empty() {
        let board = sample_board();
        let keep: Arc<str> = Arc::from("keep");
        let rs = RuleSet::create(Arc::from("drop")).add_rule(&keep, rule(&board, 3.5));
        assert!(diff_actions(&rs, &rs.clone()).is_empty());
    }

    #[test]
    fn relinking_publishes_every_step_to_the_archive() {
        let board = sample_board();
        let keep: Arc<str> = Arc::from("keep");
        let good = RuleSet::create(Arc::from("drop")).add_rule(&keep, rule(&board, 3.5));
        let bad = RuleSet::create(Arc::from("keep"));
        let good = board.evaluate(&good);
        let bad = board.evaluate(&bad);

        let relinking = PathRelinking::new(board.clone());
        let target = board.current_target_function();
        let mut rng = StdRng::seed_from_u64(11);
        relinking.relink(&mut rng, &good, &bad, &target);

        // The perfect endpoint survives on the front.
        let front = board.pareto_front();
        assert!(front
            .items()
            .iter()
            .any(|r| target.apply(r) == 0.0));
    }
}
