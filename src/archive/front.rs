//! The non-dominated archive.

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::archive::{TargetFunction, ValuedResult};

/// A set of mutually non-dominated results.
///
/// Items with identical objective vectors are merged into one bucket
/// so the front stays small even when many rule sets score the same.
/// Bucket and item order is insertion order, which keeps renderings
/// and persisted state deterministic.
#[derive(Debug, Clone)]
pub struct NondominatedResults<R> {
    buckets: Vec<ValuedResult<Vec<R>>>,
}

impl<R> Default for NondominatedResults<R> {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
        }
    }
}

impl<R: PartialEq + Clone> NondominatedResults<R> {
    pub fn new() -> Self {
        Self {
            buckets: Vec::new(),
        }
    }

    /// Adds a result unless it is dominated by or identical to an
    /// existing one; removes results the newcomer dominates. Returns
    /// true when something new entered the front.
    pub fn add(&mut self, candidate: &ValuedResult<R>) -> bool {
        let mut i = 0;
        while i < self.buckets.len() {
            let cur = &mut self.buckets[i];
            if cur.dominates(candidate) {
                return false;
            }
            if cur.has_same_values(candidate) {
                if cur.item().contains(candidate.item()) {
                    return false;
                }
                cur.item_mut().push(candidate.item().clone());
                return true;
            }
            if candidate.dominates(cur) {
                // Shift-remove keeps insertion order stable.
                self.buckets.remove(i);
                continue;
            }
            i += 1;
        }
        self.buckets
            .push(candidate.with_item(vec![candidate.item().clone()]));
        true
    }

    /// Merges another front into this one via [`Self::add`].
    pub fn add_all(&mut self, other: &NondominatedResults<R>) -> bool {
        let mut improved = false;
        for item in other.items() {
            improved |= self.add(&item);
        }
        improved
    }

    /// All results, one per item, in insertion order.
    pub fn items(&self) -> Vec<ValuedResult<R>> {
        self.buckets
            .iter()
            .flat_map(|b| b.item().iter().map(|r| b.with_item(r.clone())))
            .collect()
    }

    /// The value-merged buckets in lexicographic vector order.
    pub fn buckets_sorted(&self) -> Vec<&ValuedResult<Vec<R>>> {
        let mut ret: Vec<&ValuedResult<Vec<R>>> = self.buckets.iter().collect();
        ret.sort_by(|a, b| a.lexicographic_cmp(b));
        ret
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of distinct objective vectors on the front.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn item_count(&self) -> usize {
        self.buckets.iter().map(|b| b.item().len()).sum()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    /// Removes all items matching the predicate, dropping buckets that
    /// become empty.
    pub fn remove_if(&mut self, mut predicate: impl FnMut(&R) -> bool) {
        for bucket in &mut self.buckets {
            bucket.item_mut().retain(|r| !predicate(r));
        }
        self.buckets.retain(|b| !b.item().is_empty());
    }

    pub fn random_item(&self, rng: &mut impl Rng) -> Option<ValuedResult<R>> {
        self.items().choose(rng).cloned()
    }

    /// A random one of the items minimizing the target function.
    pub fn best_item(
        &self,
        rng: &mut impl Rng,
        target: &TargetFunction,
    ) -> Option<ValuedResult<R>> {
        let mut best: Vec<ValuedResult<R>> = Vec::new();
        let mut min = f64::INFINITY;
        for item in self.items() {
            let value = target.apply(&item);
            if value < min {
                best.clear();
                min = value;
            }
            if value <= min {
                best.push(item);
            }
        }
        best.choose(rng).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn vr(name: &'static str, values: &[f64]) -> ValuedResult<&'static str> {
        ValuedResult::new(name, values.to_vec())
    }

    #[test]
    fn dominated_candidates_are_rejected() {
        let mut front = NondominatedResults::new();
        assert!(front.add(&vr("a", &[1.0, 1.0])));
        assert!(!front.add(&vr("b", &[2.0, 2.0])));
        assert_eq!(front.item_count(), 1);
    }

    #[test]
    fn dominating_candidate_evicts_existing_entries() {
        let mut front = NondominatedResults::new();
        front.add(&vr("a", &[1.0, 3.0]));
        front.add(&vr("b", &[3.0, 1.0]));
        assert!(front.add(&vr("c", &[1.0, 1.0])));
        let items = front.items();
        assert_eq!(items.len(), 1);
        assert_eq!(*items[0].item(), "c");
    }

    #[test]
    fn equal_vectors_merge_into_one_bucket() {
        let mut front = NondominatedResults::new();
        assert!(front.add(&vr("a", &[1.0, 2.0])));
        assert!(front.add(&vr("b", &[1.0, 2.0])));
        assert!(!front.add(&vr("a", &[1.0, 2.0])));
        assert_eq!(front.bucket_count(), 1);
        assert_eq!(front.item_count(), 2);
    }

    #[test]
    fn incomparable_candidates_coexist() {
        let mut front = NondominatedResults::new();
        assert!(front.add(&vr("a", &[1.0, 3.0])));
        assert!(front.add(&vr("b", &[3.0, 1.0])));
        assert_eq!(front.item_count(), 2);
    }

    #[test]
    fn remove_if_drops_empty_buckets() {
        let mut front = NondominatedResults::new();
        front.add(&vr("a", &[1.0, 3.0]));
        front.add(&vr("b", &[3.0, 1.0]));
        front.remove_if(|r| *r == "a");
        assert_eq!(front.bucket_count(), 1);
        assert_eq!(*front.items()[0].item(), "b");
    }

    #[test]
    fn best_item_minimizes_the_target() {
        let mut front = NondominatedResults::new();
        front.add(&vr("a", &[1.0, 3.0]));
        front.add(&vr("b", &[3.0, 1.0]));
        let second = TargetFunction::objective(std::sync::Arc::from("o1"), 1);
        let mut rng = StdRng::seed_from_u64(3);
        let best = front.best_item(&mut rng, &second).unwrap();
        assert_eq!(*best.item(), "b");
        assert!(NondominatedResults::<&str>::new()
            .best_item(&mut rng, &second)
            .is_none());
    }

    proptest! {
        /// After any sequence of insertions, no archive entry
        /// dominates another.
        #[test]
        fn front_stays_mutually_non_dominated(
            vectors in prop::collection::vec(
                prop::collection::vec(0u8..6, 3),
                1..40,
            )
        ) {
            let mut front = NondominatedResults::new();
            for v in &vectors {
                let values: Vec<f64> = v.iter().map(|&x| x as f64).collect();
                front.add(&ValuedResult::new("r", values));
            }
            let items = front.items();
            for a in &items {
                for b in &items {
                    prop_assert!(!a.dominates(b));
                }
            }
        }

        /// An insertion reporting success must leave the candidate's
        /// vector on the front; a rejected one must leave a vector at
        /// least as good everywhere.
        #[test]
        fn add_reports_membership_truthfully(
            vectors in prop::collection::vec(
                prop::collection::vec(0u8..6, 2),
                1..30,
            )
        ) {
            let mut front = NondominatedResults::new();
            for v in &vectors {
                let values: Vec<f64> = v.iter().map(|&x| x as f64).collect();
                let candidate = ValuedResult::new("r", values);
                let added = front.add(&candidate);
                if added {
                    prop_assert!(front.items().iter().any(|i| i.has_same_values(&candidate)));
                } else {
                    prop_assert!(front.items().iter().any(
                        |i| i.dominates(&candidate) || i.has_same_values(&candidate)
                    ));
                }
            }
        }
    }
}
