//! Hill climbing over rule-set edits.
//!
//! Starting from an empty rule set, the search greedily re-adds
//! conjunctions taken from the initial solution and then mutates the
//! most recently touched conjunction (dropping literals, adding a
//! random one, nudging ordinal thresholds). Steps that keep the
//! target value but land on a new archive point are allowed for a
//! while so the search can traverse plateaus.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::archive::{NondominatedResults, TargetFunction, ValuedResult};
use crate::board::Blackboard;
use crate::data::RecordSet;
use crate::model::{And, RuleSet, SimpleRule};
use crate::search::CancelFlag;

const PLATEAU_STEP_LIMIT: usize = 100;

/// One candidate edit of the current rule set.
#[derive(Debug, Clone)]
enum Move {
    Add {
        label: Arc<str>,
        rule: Arc<And>,
    },
    Change {
        label: Arc<str>,
        old: Arc<And>,
        new: Arc<And>,
    },
}

impl Move {
    fn apply(&self, rule_set: &RuleSet) -> RuleSet {
        match self {
            Move::Add { label, rule } => rule_set.add_rule(label, Arc::clone(rule)),
            Move::Change { label, old, new } => {
                rule_set.replace_rule(label, old, Arc::clone(new))
            }
        }
    }

    fn touched(&self) -> (Arc<str>, Arc<And>) {
        match self {
            Move::Add { label, rule } => (Arc::clone(label), Arc::clone(rule)),
            Move::Change { label, new, .. } => (Arc::clone(label), Arc::clone(new)),
        }
    }
}

/// Steepest-ascent local search over the add and change
/// neighborhoods, publishing every evaluated neighbor to the shared
/// archive.
pub struct LocalSearch {
    board: Blackboard,
}

impl LocalSearch {
    pub fn new(board: Blackboard) -> Self {
        Self { board }
    }

    /// Optimizes `initial` for `target` and returns the local
    /// non-dominated front of everything visited.
    pub fn optimize(
        &self,
        rng: &mut impl Rng,
        initial: &ValuedResult<RuleSet>,
        target: &TargetFunction,
        cancel: &CancelFlag,
    ) -> NondominatedResults<RuleSet> {
        let records = self.board.records();
        let mut ret = NondominatedResults::new();
        ret.add(&self.board.make_valid_and_evaluate(initial.item()));

        let stub = RuleSet::create(Arc::clone(initial.item().default_label()));
        let mut cur = self.board.make_valid_and_evaluate(&stub);
        ret.add(&cur);

        // Conjunctions of the initial solution not yet present in the
        // current one, available as add moves.
        let mut pool: BTreeMap<Arc<str>, Vec<Arc<And>>> = BTreeMap::new();
        for ex in initial.item().exceptions() {
            let present = cur.item().rules_for(ex.label());
            let missing: Vec<Arc<And>> = ex
                .condition()
                .children()
                .iter()
                .filter(|r| !present.contains(r))
                .cloned()
                .collect();
            if !missing.is_empty() {
                pool.entry(Arc::clone(ex.label()))
                    .or_default()
                    .extend(missing);
            }
        }

        let mut last_touched: Option<(Arc<str>, Arc<And>)> = None;
        let mut in_change = false;
        let mut plateau_steps = 0;

        while !cancel.is_cancelled() {
            let mut moves = if in_change {
                match &last_touched {
                    Some((label, rule)) => {
                        self.change_moves(rng, &records, cur.item(), label, rule)
                    }
                    None => Vec::new(),
                }
            } else {
                add_moves(&pool)
            };
            moves.shuffle(rng);

            let cur_value = target.apply(&cur);
            let mut best: Option<(ValuedResult<RuleSet>, Move)> = None;
            let mut best_value = cur_value;
            let mut best_is_plateau = false;
            for mv in moves {
                let candidate = self.board.make_valid_and_evaluate(&mv.apply(cur.item()));
                self.board.simplify_evaluate_and_add(candidate.item());
                let could_add = ret.add(&candidate);
                let value = target.apply(&candidate);
                if value < best_value || (value == best_value && could_add) {
                    best_is_plateau = candidate.has_same_values(&cur);
                    best_value = value;
                    best = Some((candidate, mv));
                }
            }

            if plateau_exhausted(&mut plateau_steps, best_is_plateau) {
                info!(steps = plateau_steps, "abandoning plateau");
                best = None;
            }
            // With the change neighborhood exhausted, fall back to the
            // remaining add moves before giving up.
            let Some((candidate, mv)) = best else {
                if in_change {
                    in_change = false;
                    continue;
                }
                break;
            };
            if let Move::Add { label, rule } = &mv {
                if let Some(rules) = pool.get_mut(label) {
                    rules.retain(|r| r != rule);
                }
            }
            debug!(value = best_value, "accepted local search step");
            last_touched = Some(mv.touched());
            cur = candidate;
            in_change = true;
        }
        ret
    }

    /// Mutations of the most recently touched conjunction: drop one
    /// literal, add a random one, or nudge an ordinal threshold to the
    /// next split point that changes the matched records.
    fn change_moves(
        &self,
        rng: &mut impl Rng,
        records: &RecordSet,
        cur: &RuleSet,
        label: &Arc<str>,
        rule: &Arc<And>,
    ) -> Vec<Move> {
        if !cur.rules_for(label).contains(rule) {
            return Vec::new();
        }
        let mut moves = Vec::new();
        if rule.len() > 1 {
            for child in rule.children() {
                moves.push(Move::Change {
                    label: Arc::clone(label),
                    old: Arc::clone(rule),
                    new: Arc::new(rule.without_child(child)),
                });
            }
        }
        if let Some(extra) = records.create_random_simple_rule(rng) {
            moves.push(Move::Change {
                label: Arc::clone(label),
                old: Arc::clone(rule),
                new: Arc::new(rule.and(extra)),
            });
        }
        for child in rule.children() {
            for nudged in [
                nudge(rule, child, records, SimpleRule::next_larger_value),
                nudge(rule, child, records, SimpleRule::next_smaller_value),
            ]
            .into_iter()
            .flatten()
            {
                moves.push(Move::Change {
                    label: Arc::clone(label),
                    old: Arc::clone(rule),
                    new: Arc::new(nudged),
                });
            }
        }
        moves
    }
}

fn add_moves(pool: &BTreeMap<Arc<str>, Vec<Arc<And>>>) -> Vec<Move> {
    let mut moves = Vec::new();
    for (label, rules) in pool {
        for rule in rules {
            moves.push(Move::Add {
                label: Arc::clone(label),
                rule: Arc::clone(rule),
            });
        }
    }
    moves
}

/// Tracks the streak of accepted moves that left the objective vector
/// unchanged. Returns true once the streak exceeds the limit; the
/// caller then discards the pending move.
fn plateau_exhausted(plateau_steps: &mut usize, on_plateau: bool) -> bool {
    if on_plateau {
        *plateau_steps += 1;
        *plateau_steps > PLATEAU_STEP_LIMIT
    } else {
        *plateau_steps = 0;
        false
    }
}

/// Walks an ordinal threshold of `rule` split point by split point
/// until the set of records matched by the whole conjunction changes.
/// Many adjacent split points leave the conjunction unchanged because
/// another literal masks them; stepping past all of them in one move
/// keeps the neighborhood small. Thresholds that run out of split
/// points degenerate into a constant and yield no move.
fn nudge(
    rule: &And,
    child: &SimpleRule,
    records: &RecordSet,
    step: impl Fn(&SimpleRule, &RecordSet) -> Option<SimpleRule>,
) -> Option<And> {
    let base_matched = matched_count(rule, records);
    let mut current = step(child, records)?;
    loop {
        if current.column().is_none() {
            return None;
        }
        let replaced = rule.with_replaced_child(child, current.clone());
        if matched_count(&replaced, records) != base_matched {
            return Some(replaced);
        }
        current = step(&current, records)?;
    }
}

fn matched_count(rule: &And, records: &RecordSet) -> usize {
    records.records().iter().filter(|r| rule.test(r)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Record, RecordScheme};
    use crate::eval::StandardObjectives;
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

    fn total_wrong(board: &Blackboard) -> TargetFunction {
        board
            .target_functions()
            .iter()
            .find(|t| t.id().as_ref() == "totalWrong")
            .cloned()
            .unwrap()
    }

    #[test]
    fn reassembles_a_perfect_rule_set_from_the_pool() {
        let board = sample_board();
        let records = board.records();
        let perfect = Arc::new(And::single(SimpleRule::leq(
            records.scheme().column(0),
            3.5,
        )));
        let initial = RuleSet::create(Arc::from("drop"))
            .add_rule(&Arc::from("keep"), perfect);
        let evaluated = board.evaluate(&initial);

        let search = LocalSearch::new(board.clone());
        let target = total_wrong(&board);
        let mut rng = StdRng::seed_from_u64(3);
        let front = search.optimize(&mut rng, &evaluated, &target, &CancelFlag::new());

        let best = front
            .items()
            .into_iter()
            .map(|r| target.apply(&r))
            .fold(f64::INFINITY, f64::min);
        assert_eq!(best, 0.0);
    }

    #[test]
    fn always_contains_start_and_stub() {
        let board = sample_board();
        let initial = board.evaluate(&RuleSet::create(Arc::from("keep")));
        let search = LocalSearch::new(board.clone());
        let target = total_wrong(&board);
        let mut rng = StdRng::seed_from_u64(1);
        let cancel = CancelFlag::new();
        cancel.cancel();
        // A cancelled search still reports the evaluated start points.
        let front = search.optimize(&mut rng, &initial, &target, &cancel);
        assert!(!front.is_empty());
    }

    /// Two ordinal columns holding the same values; the labels put
    /// split points at 1.5, 2.5 and 3.5.
    fn stepped_records() -> Arc<RecordSet> {
        let scheme = Arc::new(RecordScheme::new(
            vec![Arc::from("v"), Arc::from("w")],
            vec![],
        ));
        let labels = ["a", "a", "b", "a", "b", "b"];
        let records = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                Record::new(i as u32, vec![i as f64, i as f64], vec![], Arc::from(*label))
            })
            .collect();
        Arc::new(RecordSet::new(scheme, records))
    }

    #[test]
    fn nudging_skips_split_points_without_effect() {
        let records = stepped_records();
        let v = records.scheme().column(0);
        let w = records.scheme().column(1);
        let rule = And::new(vec![
            SimpleRule::leq(v.clone(), 3.5),
            SimpleRule::leq(w, 2.5),
        ]);
        let child = SimpleRule::leq(v, 3.5);
        // Tightening v to 2.5 changes what the literal alone matches
        // but not the conjunction; the first effective threshold for
        // the conjunction is 1.5.
        let nudged = nudge(&rule, &child, &records, SimpleRule::next_smaller_value).unwrap();
        assert_eq!(nudged.len(), 2);
        assert!(nudged
            .children()
            .iter()
            .any(|c| matches!(c, SimpleRule::Leq { value, .. } if *value == 1.5)));
    }

    #[test]
    fn nudging_counts_matches_of_the_whole_conjunction() {
        let records = stepped_records();
        let v = records.scheme().column(0);
        let w = records.scheme().column(1);
        let rule = And::new(vec![
            SimpleRule::leq(v.clone(), 2.5),
            SimpleRule::leq(w, 1.5),
        ]);
        let child = SimpleRule::leq(v, 2.5);
        // Relaxing v never changes the conjunction (w keeps matching
        // the same records) until the threshold degenerates into a
        // constant, so no move comes out.
        assert!(nudge(&rule, &child, &records, SimpleRule::next_larger_value).is_none());
    }

    #[test]
    fn nudging_past_the_last_split_point_yields_no_move() {
        let records = stepped_records();
        let v = records.scheme().column(0);
        let rule = And::single(SimpleRule::leq(v.clone(), 3.5));
        let child = SimpleRule::leq(v, 3.5);
        assert!(nudge(&rule, &child, &records, SimpleRule::next_larger_value).is_none());
    }

    #[test]
    fn plateau_budget_resets_on_improvement() {
        let mut steps = 0;
        for _ in 0..PLATEAU_STEP_LIMIT {
            assert!(!plateau_exhausted(&mut steps, true));
        }
        assert!(plateau_exhausted(&mut steps, true));
        plateau_exhausted(&mut steps, false);
        assert_eq!(steps, 0);
        assert!(!plateau_exhausted(&mut steps, true));
    }

    #[test]
    fn change_neighborhood_stall_falls_back_to_pooled_adds() {
        // Low sizes and green records are "keep"; no single change of
        // the first rule can reach the greens, so the search must come
        // back to the add neighborhood for the second one.
        let scheme = Arc::new(RecordScheme::new(
            vec![Arc::from("size")],
            vec![Arc::from("color")],
        ));
        let records: Vec<Record> = (0..10)
            .map(|i| {
                let color = if i >= 8 { "green" } else { "red" };
                let label = if i < 4 || i >= 8 { "keep" } else { "drop" };
                Record::new(i, vec![f64::from(i)], vec![Some(Arc::from(color))], Arc::from(label))
            })
            .collect();
        let records = Arc::new(RecordSet::new(scheme, records));
        let evaluator = Arc::new(StandardObjectives::from_records(&records));
        let board = Blackboard::new(Arc::clone(&records), evaluator, 0);

        let low = Arc::new(And::single(SimpleRule::leq(records.scheme().column(0), 3.5)));
        let green = Arc::new(And::single(SimpleRule::equals(
            records.scheme().column(1),
            Arc::from("green"),
        )));
        let initial = RuleSet::create(Arc::from("drop"))
            .add_rule(&Arc::from("keep"), low)
            .add_rule(&Arc::from("keep"), green);
        let evaluated = board.evaluate(&initial);

        let search = LocalSearch::new(board.clone());
        let target = total_wrong(&board);
        let mut rng = StdRng::seed_from_u64(7);
        let front = search.optimize(&mut rng, &evaluated, &target, &CancelFlag::new());

        let best = front
            .items()
            .into_iter()
            .map(|r| target.apply(&r))
            .fold(f64::INFINITY, f64::min);
        assert_eq!(best, 0.0);
    }
}
