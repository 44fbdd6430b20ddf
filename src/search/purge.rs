//! Diversity-preserving archive compaction.
//!
//! When the archive must shrink, the best result per target function
//! inside the navigation limits is always kept. The remaining slots
//! are filled by randomized triple elimination: each candidate gets a
//! short fingerprint of predicted labels over a sample of records, and
//! of three randomly drawn candidates the one least distinct from the
//! other two is discarded until the wanted count remains.

use rand::seq::IndexedRandom;
use rand::Rng;
use std::sync::Arc;

use crate::archive::{NavigationLimits, NondominatedResults, TargetFunction, ValuedResult};
use crate::data::RecordSet;
use crate::model::RuleSet;

const RECORD_SAMPLE_SIZE: usize = 100;
const MAX_SAMPLING_TRIES: usize = 1000;

/// Selects which archive entries survive a purge down to roughly
/// `count_to_keep`. May return more when the per-target bests alone
/// exceed the count.
pub(crate) fn determine_rules_to_keep(
    front: &NondominatedResults<RuleSet>,
    limits: &NavigationLimits,
    count_to_keep: usize,
    targets: &[TargetFunction],
    records: &RecordSet,
    rng: &mut impl Rng,
) -> Vec<ValuedResult<RuleSet>> {
    let in_limits = limits.filter(front);

    let mut keep: Vec<ValuedResult<RuleSet>> = Vec::new();
    for target in targets {
        if let Some(best) = in_limits.best_item(rng, target) {
            if !keep.contains(&best) {
                keep.push(best);
            }
        }
    }
    if keep.len() >= count_to_keep {
        return keep;
    }

    // When everything inside the limits fits, keep all of it and pick
    // the diverse remainder from the full front instead.
    let pool: Vec<ValuedResult<RuleSet>> = if in_limits.item_count() <= count_to_keep {
        for item in in_limits.items() {
            if !keep.contains(&item) {
                keep.push(item);
            }
        }
        front.items()
    } else {
        in_limits.items()
    };
    let pool: Vec<ValuedResult<RuleSet>> = pool
        .into_iter()
        .filter(|item| !keep.contains(item))
        .collect();

    let remaining = count_to_keep - keep.len();
    keep.extend(select_diverse(pool, remaining, records, rng));
    keep
}

/// Reduces `candidates` to `count` items by repeated triple
/// elimination on record-level fingerprints.
fn select_diverse(
    mut candidates: Vec<ValuedResult<RuleSet>>,
    count: usize,
    records: &RecordSet,
    rng: &mut impl Rng,
) -> Vec<ValuedResult<RuleSet>> {
    if candidates.len() <= count {
        return candidates;
    }
    if count == 0 {
        return Vec::new();
    }

    let mut fingerprints = fingerprint_over_sample(&candidates, records, rng);
    while candidates.len() > count {
        if candidates.len() < 3 {
            // Two candidates left and one slot: no triple to compare,
            // drop a random one.
            let victim = rng.random_range(0..candidates.len());
            candidates.swap_remove(victim);
            fingerprints.swap_remove(victim);
            continue;
        }
        let triple = rand::seq::index::sample(rng, candidates.len(), 3);
        let mut least_distinct = triple.index(0);
        let mut least_distance = usize::MAX;
        for a in 0..3 {
            let i = triple.index(a);
            let closest = (0..3)
                .filter(|b| *b != a)
                .map(|b| hamming(&fingerprints[i], &fingerprints[triple.index(b)]))
                .min()
                .unwrap_or(0);
            if closest < least_distance {
                least_distance = closest;
                least_distinct = i;
            }
        }
        candidates.swap_remove(least_distinct);
        fingerprints.swap_remove(least_distinct);
    }
    candidates
}

/// One predicted-label vector per candidate over a random record
/// sample. A sampled record counts only when at least two candidates
/// disagree on it, bounded by a fixed number of tries.
fn fingerprint_over_sample(
    candidates: &[ValuedResult<RuleSet>],
    records: &RecordSet,
    rng: &mut impl Rng,
) -> Vec<Vec<Arc<str>>> {
    let mut ret: Vec<Vec<Arc<str>>> = vec![Vec::new(); candidates.len()];
    if records.is_empty() {
        return ret;
    }
    let mut kept = 0;
    let mut tries = 0;
    while kept < RECORD_SAMPLE_SIZE && tries < MAX_SAMPLING_TRIES {
        tries += 1;
        let Some(record) = records.records().choose(rng) else {
            break;
        };
        let predictions: Vec<Arc<str>> = candidates
            .iter()
            .map(|c| Arc::clone(c.item().apply(record)))
            .collect();
        let discriminating = predictions.windows(2).any(|w| w[0] != w[1]);
        if discriminating {
            for (fingerprint, label) in ret.iter_mut().zip(predictions) {
                fingerprint.push(label);
            }
            kept += 1;
        }
    }
    ret
}

fn hamming(a: &[Arc<str>], b: &[Arc<str>]) -> usize {
    a.iter().zip(b).filter(|(x, y)| x != y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Record, RecordScheme};
    use crate::model::{And, SimpleRule};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn data() -> RecordSet {
        let scheme = Arc::new(RecordScheme::new(vec![Arc::from("v")], Vec::new()));
        let records = (0..10)
            .map(|i| {
                Record::new(
                    i,
                    vec![f64::from(i)],
                    Vec::new(),
                    Arc::from(if i < 5 { "x" } else { "y" }),
                )
            })
            .collect();
        RecordSet::new(scheme, records)
    }

    fn rule_set(threshold: f64, data: &RecordSet) -> RuleSet {
        RuleSet::create(Arc::from("y")).add_rule(
            &Arc::from("x"),
            Arc::new(And::single(SimpleRule::leq(
                data.scheme().column(0),
                threshold,
            ))),
        )
    }

    fn front(data: &RecordSet) -> NondominatedResults<RuleSet> {
        // Four mutually non-dominated entries.
        let mut front = NondominatedResults::new();
        for (i, t) in [0.5, 2.5, 4.5, 6.5].iter().enumerate() {
            let values = vec![i as f64, 3.0 - i as f64];
            assert!(front.add(&ValuedResult::new(rule_set(*t, data), values)));
        }
        front
    }

    #[test]
    fn keeps_best_per_target_function() {
        let data = data();
        let front = front(&data);
        let limits = NavigationLimits::new();
        let targets = vec![
            TargetFunction::objective(Arc::from("first"), 0),
            TargetFunction::objective(Arc::from("second"), 1),
        ];
        let mut rng = StdRng::seed_from_u64(1);
        let keep = determine_rules_to_keep(&front, &limits, 2, &targets, &data, &mut rng);
        assert_eq!(keep.len(), 2);
        assert!(keep.iter().any(|r| r.value(0) == 0.0));
        assert!(keep.iter().any(|r| r.value(1) == 0.0));
    }

    #[test]
    fn respects_count_to_keep_bounds() {
        let data = data();
        let front = front(&data);
        let limits = NavigationLimits::new();
        let targets = vec![TargetFunction::objective(Arc::from("first"), 0)];
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let keep = determine_rules_to_keep(&front, &limits, 2, &targets, &data, &mut rng);
            assert!(!keep.is_empty());
            assert!(keep.len() <= 2);
        }
    }

    #[test]
    fn small_front_survives_unchanged() {
        let data = data();
        let front = front(&data);
        let limits = NavigationLimits::new();
        let targets = vec![TargetFunction::objective(Arc::from("first"), 0)];
        let mut rng = StdRng::seed_from_u64(3);
        let keep = determine_rules_to_keep(&front, &limits, 10, &targets, &data, &mut rng);
        assert_eq!(keep.len(), 4);
    }

    #[test]
    fn fingerprints_only_keep_discriminating_records() {
        let data = data();
        let candidates: Vec<ValuedResult<RuleSet>> = [0.5, 6.5]
            .iter()
            .map(|t| ValuedResult::new(rule_set(*t, &data), vec![*t]))
            .collect();
        let mut rng = StdRng::seed_from_u64(4);
        let prints = fingerprint_over_sample(&candidates, &data, &mut rng);
        assert_eq!(prints[0].len(), prints[1].len());
        // Every kept record separates the two rule sets.
        assert!(prints[0].iter().zip(&prints[1]).all(|(a, b)| a != b));
        assert!(!prints[0].is_empty());
    }
}
