//! Training data: column scheme, records, and derived split points.
//!
//! A [`RecordScheme`] names the columns of a data set, ordinal
//! (floating point) columns first, nominal (string) columns after
//! them. A [`Record`] stores its values in two dense vectors in that
//! same order plus the correct label. [`RecordSet`] bundles the
//! records with per-column derived data that the rule miners consult
//! constantly: candidate split points for ordinal columns and the
//! distinct value sets of nominal columns.
//!
//! # Split points
//!
//! Raw observed values make poor thresholds: they are noisy to read
//! and there are too many of them. A candidate split point is placed
//! between two adjacent observed values only where the class label
//! changes (or where the same value occurs with conflicting labels),
//! and the midpoint is then snapped to the representable number with
//! the fewest significant digits inside the middle third of the gap,
//! following Fayyad-style boundary-point pruning.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::model::SimpleRule;

/// A column reference that is self-contained enough to test records
/// and render rules without going back to the scheme.
///
/// Identity (equality, hashing, ordering) is the column name; the two
/// indices are lookup accelerators resolved at construction time.
#[derive(Debug, Clone)]
pub struct Column {
    index: usize,
    typed_index: usize,
    name: Arc<str>,
}

impl Column {
    /// Absolute index in the scheme (ordinal columns first).
    pub fn index(&self) -> usize {
        self.index
    }

    /// Index into the ordinal or nominal value vector of a record,
    /// depending on the column kind.
    pub fn typed_index(&self) -> usize {
        self.typed_index
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Column {}

impl std::hash::Hash for Column {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Column {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Column {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Column layout of a data set: ordinal column names followed by
/// nominal column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordScheme {
    ordinal: Vec<Arc<str>>,
    nominal: Vec<Arc<str>>,
}

impl RecordScheme {
    pub fn new(ordinal: Vec<Arc<str>>, nominal: Vec<Arc<str>>) -> Self {
        Self { ordinal, nominal }
    }

    pub fn ordinal_count(&self) -> usize {
        self.ordinal.len()
    }

    pub fn nominal_count(&self) -> usize {
        self.nominal.len()
    }

    pub fn column_count(&self) -> usize {
        self.ordinal.len() + self.nominal.len()
    }

    pub fn is_ordinal(&self, index: usize) -> bool {
        index < self.ordinal.len()
    }

    pub fn name(&self, index: usize) -> &Arc<str> {
        if self.is_ordinal(index) {
            &self.ordinal[index]
        } else {
            &self.nominal[index - self.ordinal.len()]
        }
    }

    /// All column names in absolute order.
    pub fn column_names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.ordinal.iter().chain(self.nominal.iter())
    }

    pub fn column(&self, index: usize) -> Column {
        let typed_index = if self.is_ordinal(index) {
            index
        } else {
            index - self.ordinal.len()
        };
        Column {
            index,
            typed_index,
            name: Arc::clone(self.name(index)),
        }
    }

    pub fn column_by_name(&self, name: &str) -> Option<Column> {
        self.column_names()
            .position(|n| n.as_ref() == name)
            .map(|index| self.column(index))
    }
}

/// One training record: ordinal values, nominal values, and the
/// correct label. Nominal values may be missing.
#[derive(Debug, Clone)]
pub struct Record {
    id: u32,
    ordinal: Vec<f64>,
    nominal: Vec<Option<Arc<str>>>,
    label: Arc<str>,
}

impl Record {
    pub fn new(id: u32, ordinal: Vec<f64>, nominal: Vec<Option<Arc<str>>>, label: Arc<str>) -> Self {
        Self {
            id,
            ordinal,
            nominal,
            label,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn ordinal_value(&self, typed_index: usize) -> f64 {
        self.ordinal[typed_index]
    }

    pub fn nominal_value(&self, typed_index: usize) -> Option<&Arc<str>> {
        self.nominal[typed_index].as_ref()
    }

    pub fn label(&self) -> &Arc<str> {
        &self.label
    }
}

/// Records plus the per-column derived data the rule miners use.
#[derive(Debug, Clone)]
pub struct RecordSet {
    scheme: Arc<RecordScheme>,
    records: Vec<Record>,
    /// Candidate thresholds per ordinal column, strictly ascending.
    split_values: Vec<Vec<f64>>,
    /// Distinct observed values per nominal column, sorted.
    nominal_values: Vec<Vec<Arc<str>>>,
    class_labels: Vec<Arc<str>>,
}

impl RecordSet {
    pub fn new(scheme: Arc<RecordScheme>, records: Vec<Record>) -> Self {
        let split_values = (0..scheme.ordinal_count())
            .map(|col| determine_split_values(&records, col))
            .collect();
        let nominal_values = (0..scheme.nominal_count())
            .map(|col| {
                let set: BTreeSet<Arc<str>> = records
                    .iter()
                    .filter_map(|r| r.nominal_value(col).cloned())
                    .collect();
                set.into_iter().collect()
            })
            .collect();
        let class_labels: Vec<Arc<str>> = {
            let set: BTreeSet<Arc<str>> =
                records.iter().map(|r| Arc::clone(r.label())).collect();
            set.into_iter().collect()
        };
        Self {
            scheme,
            records,
            split_values,
            nominal_values,
            class_labels,
        }
    }

    pub fn scheme(&self) -> &Arc<RecordScheme> {
        &self.scheme
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct correct labels, sorted.
    pub fn class_labels(&self) -> &[Arc<str>] {
        &self.class_labels
    }

    /// Candidate split points of an ordinal column, ascending.
    pub fn split_values(&self, typed_index: usize) -> &[f64] {
        &self.split_values[typed_index]
    }

    /// Distinct values of a nominal column, sorted.
    pub fn nominal_values(&self, typed_index: usize) -> &[Arc<str>] {
        &self.nominal_values[typed_index]
    }

    /// Smallest split point strictly greater than `value`, if any.
    pub fn split_point_above(&self, typed_index: usize, value: f64) -> Option<f64> {
        let splits = &self.split_values[typed_index];
        let pos = splits.partition_point(|&s| s <= value);
        splits.get(pos).copied()
    }

    /// Largest split point strictly smaller than `value`, if any.
    pub fn split_point_below(&self, typed_index: usize, value: f64) -> Option<f64> {
        let splits = &self.split_values[typed_index];
        let pos = splits.partition_point(|&s| s < value);
        pos.checked_sub(1).map(|i| splits[i])
    }

    /// A copy of this data set without the records rejected by the
    /// predicate. Split points and value sets are recomputed.
    pub fn without_records(&self, mut remove: impl FnMut(&Record) -> bool) -> RecordSet {
        let kept = self
            .records
            .iter()
            .filter(|r| !remove(r))
            .cloned()
            .collect();
        RecordSet::new(Arc::clone(&self.scheme), kept)
    }

    /// Draws a random satisfiable literal over a random column: an
    /// ordinal comparison against a random split point or a nominal
    /// (in)equality against an observed value. Returns `None` when the
    /// chosen column has no usable values.
    pub fn create_random_simple_rule(&self, rng: &mut impl Rng) -> Option<SimpleRule> {
        let index = rng.random_range(0..self.scheme.column_count());
        self.create_random_simple_rule_for_column(rng, &self.scheme.column(index))
    }

    /// Same as [`Self::create_random_simple_rule`], for a fixed column.
    pub fn create_random_simple_rule_for_column(
        &self,
        rng: &mut impl Rng,
        column: &Column,
    ) -> Option<SimpleRule> {
        if self.scheme.is_ordinal(column.index()) {
            let value = *self.split_values[column.typed_index()].choose(rng)?;
            Some(if rng.random_bool(0.5) {
                SimpleRule::leq(column.clone(), value)
            } else {
                SimpleRule::geq(column.clone(), value)
            })
        } else {
            let value = self.nominal_values[column.typed_index()].choose(rng)?;
            Some(if rng.random_bool(0.5) {
                SimpleRule::equals(column.clone(), Arc::clone(value))
            } else {
                SimpleRule::not_equals(column.clone(), Arc::clone(value))
            })
        }
    }
}

/// Boundary split points of one ordinal column: midpoints of adjacent
/// value pairs where the label changes or a value is label-ambiguous,
/// snapped to few significant digits.
fn determine_split_values(records: &[Record], typed_index: usize) -> Vec<f64> {
    // Label per observed value; `None` marks a value that occurs with
    // more than one label.
    let mut per_value: HashMap<u64, Option<Arc<str>>> = HashMap::new();
    for r in records {
        let v = r.ordinal_value(typed_index);
        if v.is_nan() {
            continue;
        }
        per_value
            .entry(v.to_bits())
            .and_modify(|label| {
                if label.as_deref() != Some(r.label().as_ref()) {
                    *label = None;
                }
            })
            .or_insert_with(|| Some(Arc::clone(r.label())));
    }

    let mut sorted: Vec<(f64, Option<Arc<str>>)> = per_value
        .into_iter()
        .map(|(bits, label)| (f64::from_bits(bits), label))
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut splits = Vec::new();
    for pair in sorted.windows(2) {
        let (prev_value, prev_label) = &pair[0];
        let (cur_value, cur_label) = &pair[1];
        if cur_label != prev_label || cur_label.is_none() {
            splits.push(split_point_with_few_digits(*prev_value, *cur_value));
        }
    }
    splits.dedup();
    splits
}

/// Snaps the midpoint of `(lower, upper)` to the value with the fewest
/// significant digits that still lies inside the middle third of the
/// interval. Keeps thresholds human-readable without moving them far
/// from the true boundary.
pub fn split_point_with_few_digits(lower: f64, upper: f64) -> f64 {
    debug_assert!(lower < upper);
    let middle = (lower + upper) / 2.0;
    let lower_bound = (2.0 * lower + upper) / 3.0;
    let upper_bound = (lower + 2.0 * upper) / 3.0;
    for exp in (-10..=10).rev() {
        let scale = 10f64.powi(exp);
        let candidate = (middle / scale).round() * scale;
        if candidate > lower_bound && candidate < upper_bound {
            return candidate;
        }
    }
    middle
}
