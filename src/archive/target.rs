//! Target functions and navigation limits.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::archive::{NondominatedResults, ValuedResult};

/// Projects an objective vector to one number to minimize. Users
/// navigate the front by picking a target function and optionally
/// bounding its value.
///
/// Identity is the id: two functions with the same id are the same
/// target.
#[derive(Clone)]
pub struct TargetFunction {
    id: Arc<str>,
    tooltip: Arc<str>,
    function: Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>,
}

impl TargetFunction {
    pub fn new(
        id: Arc<str>,
        tooltip: Arc<str>,
        function: impl Fn(&[f64]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            tooltip,
            function: Arc::new(function),
        }
    }

    /// The target that simply reads one objective.
    pub fn objective(id: Arc<str>, index: usize) -> Self {
        Self::new(Arc::clone(&id), id, move |values| values[index])
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn tooltip(&self) -> &Arc<str> {
        &self.tooltip
    }

    pub fn apply<R>(&self, result: &ValuedResult<R>) -> f64 {
        self.apply_to_values(result.values())
    }

    pub fn apply_to_values(&self, values: &[f64]) -> f64 {
        (self.function)(values)
    }
}

impl PartialEq for TargetFunction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TargetFunction {}

impl fmt::Debug for TargetFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetFunction").field("id", &self.id).finish()
    }
}

/// Per-target upper bounds steering which part of the front the
/// search concentrates on. Shared between the coordination hub and
/// all workers, hence internally locked; reads vastly outnumber
/// writes.
#[derive(Debug, Default)]
pub struct NavigationLimits {
    limits: RwLock<HashMap<Arc<str>, (TargetFunction, f64)>>,
}

impl NavigationLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bound for a target, infinite when unset.
    pub fn limit(&self, target: &TargetFunction) -> f64 {
        self.limits
            .read()
            .map(|m| m.get(target.id()).map_or(f64::INFINITY, |(_, l)| *l))
            .unwrap_or(f64::INFINITY)
    }

    pub fn set_limit(&self, target: TargetFunction, limit: f64) {
        if let Ok(mut m) = self.limits.write() {
            m.insert(Arc::clone(target.id()), (target, limit));
        }
    }

    pub fn remove_limit(&self, target: &TargetFunction) {
        if let Ok(mut m) = self.limits.write() {
            m.remove(target.id());
        }
    }

    pub fn is_in_limits<R>(&self, result: &ValuedResult<R>) -> bool {
        match self.limits.read() {
            Ok(m) => m
                .values()
                .all(|(target, limit)| target.apply(result) <= *limit),
            Err(_) => true,
        }
    }

    /// The subset of a front satisfying every bound.
    pub fn filter<R: PartialEq + Clone>(
        &self,
        front: &NondominatedResults<R>,
    ) -> NondominatedResults<R> {
        let mut ret = NondominatedResults::new();
        for item in front.items() {
            if self.is_in_limits(&item) {
                ret.add(&item);
            }
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vr(values: &[f64]) -> ValuedResult<&'static str> {
        ValuedResult::new("x", values.to_vec())
    }

    #[test]
    fn unset_limit_is_infinite() {
        let limits = NavigationLimits::new();
        let t = TargetFunction::objective(Arc::from("o0"), 0);
        assert_eq!(limits.limit(&t), f64::INFINITY);
        assert!(limits.is_in_limits(&vr(&[1e12])));
    }

    #[test]
    fn limits_bound_each_target_independently() {
        let limits = NavigationLimits::new();
        limits.set_limit(TargetFunction::objective(Arc::from("o0"), 0), 5.0);
        limits.set_limit(TargetFunction::objective(Arc::from("o1"), 1), 2.0);
        assert!(limits.is_in_limits(&vr(&[5.0, 2.0])));
        assert!(!limits.is_in_limits(&vr(&[5.1, 0.0])));
        assert!(!limits.is_in_limits(&vr(&[0.0, 2.1])));
        limits.remove_limit(&TargetFunction::objective(Arc::from("o1"), 1));
        assert!(limits.is_in_limits(&vr(&[0.0, 2.1])));
    }

    #[test]
    fn setting_a_limit_twice_overwrites() {
        let limits = NavigationLimits::new();
        let t = TargetFunction::objective(Arc::from("o0"), 0);
        limits.set_limit(t.clone(), 5.0);
        limits.set_limit(t.clone(), 7.0);
        assert_eq!(limits.limit(&t), 7.0);
    }

    #[test]
    fn filter_keeps_only_results_in_limits() {
        let mut front = NondominatedResults::new();
        front.add(&vr(&[1.0, 3.0]));
        front.add(&vr(&[3.0, 1.0]));
        let limits = NavigationLimits::new();
        limits.set_limit(TargetFunction::objective(Arc::from("o0"), 0), 2.0);
        let filtered = limits.filter(&front);
        assert_eq!(filtered.item_count(), 1);
        assert_eq!(filtered.items()[0].values(), &[1.0, 3.0]);
    }
}
