//! Items paired with their objective vectors.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An item together with its objective vector. All objectives are
/// minimized. The vector is shared, so re-wrapping the same values
/// around another item is cheap.
#[derive(Debug, Clone)]
pub struct ValuedResult<R> {
    item: R,
    values: Arc<[f64]>,
}

impl<R> ValuedResult<R> {
    pub fn new(item: R, values: Vec<f64>) -> Self {
        Self {
            item,
            values: values.into(),
        }
    }

    pub fn item(&self) -> &R {
        &self.item
    }

    pub(crate) fn item_mut(&mut self) -> &mut R {
        &mut self.item
    }

    pub fn into_item(self) -> R {
        self.item
    }

    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The same values attached to a different item.
    pub fn with_item<T>(&self, item: T) -> ValuedResult<T> {
        ValuedResult {
            item,
            values: Arc::clone(&self.values),
        }
    }

    /// Pareto dominance: no objective worse, at least one strictly
    /// better. A vector does not dominate itself.
    pub fn dominates<T>(&self, other: &ValuedResult<T>) -> bool {
        debug_assert_eq!(self.values.len(), other.values.len());
        if self
            .values
            .iter()
            .zip(other.values.iter())
            .any(|(a, b)| a > b)
        {
            return false;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .any(|(a, b)| a < b)
    }

    pub fn has_same_values<T>(&self, other: &ValuedResult<T>) -> bool {
        self.values == other.values
    }

    /// Element-wise ordering, used only for stable display sorting.
    pub fn lexicographic_cmp<T>(&self, other: &ValuedResult<T>) -> Ordering {
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            let cmp = a.total_cmp(b);
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    }
}

impl<R: PartialEq> PartialEq for ValuedResult<R> {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values && self.item == other.item
    }
}

impl<R: Eq> Eq for ValuedResult<R> {}

impl<R: Hash> Hash for ValuedResult<R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for v in self.values.iter() {
            v.to_bits().hash(state);
        }
        self.item.hash(state);
    }
}
