//! Objective evaluation of candidate classifiers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::archive::TargetFunction;
use crate::data::RecordSet;
use crate::model::RuleSet;

/// Maps a rule set to the objective vector the archive minimizes.
///
/// Implementations decide what is worth minimizing; the engine only
/// requires that the vector layout and the target functions stay
/// consistent with each other.
pub trait ObjectiveEvaluator: Send + Sync {
    /// Names of the vector entries, in vector order.
    fn objective_names(&self) -> Vec<Arc<str>>;

    /// The navigable projections of the vector.
    fn target_functions(&self) -> Vec<TargetFunction>;

    fn evaluate(&self, rule_set: &RuleSet, records: &RecordSet) -> Vec<f64>;
}

/// The default objectives: one misclassification count per class,
/// rule-set complexity, and the number of distinct features used.
///
/// Target functions additionally expose totals and per-class relative
/// error shares computed from the same vector.
pub struct StandardObjectives {
    classes: Vec<Arc<str>>,
    class_indices: HashMap<Arc<str>, usize>,
    counts_per_class: Vec<usize>,
}

impl StandardObjectives {
    pub fn new(counts_per_class: Vec<(Arc<str>, usize)>) -> Self {
        let classes: Vec<Arc<str>> = counts_per_class.iter().map(|(c, _)| Arc::clone(c)).collect();
        let class_indices = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (Arc::clone(c), i))
            .collect();
        let counts_per_class = counts_per_class.into_iter().map(|(_, n)| n).collect();
        Self {
            classes,
            class_indices,
            counts_per_class,
        }
    }

    /// Derives the class list and per-class record counts from the
    /// training data.
    pub fn from_records(records: &RecordSet) -> Self {
        let counts = records
            .class_labels()
            .iter()
            .map(|label| {
                let count = records
                    .records()
                    .iter()
                    .filter(|r| r.label() == label)
                    .count();
                (Arc::clone(label), count)
            })
            .collect();
        Self::new(counts)
    }

    pub fn classes(&self) -> &[Arc<str>] {
        &self.classes
    }
}

impl ObjectiveEvaluator for StandardObjectives {
    fn objective_names(&self) -> Vec<Arc<str>> {
        let mut ret: Vec<Arc<str>> = self
            .classes
            .iter()
            .map(|c| Arc::from(format!("wrong_{c}")))
            .collect();
        ret.push(Arc::from("complexity"));
        ret.push(Arc::from("featureCount"));
        ret
    }

    fn target_functions(&self) -> Vec<TargetFunction> {
        let class_count = self.classes.len();
        let mut ret = Vec::new();

        let counts: Vec<f64> = self.counts_per_class.iter().map(|&n| n as f64).collect();
        ret.push(TargetFunction::new(
            Arc::from("avgRelWrong"),
            Arc::from("average relative share of misclassifications"),
            move |values| {
                let sum: f64 = counts
                    .iter()
                    .enumerate()
                    .map(|(i, &n)| values[i] / n)
                    .sum();
                sum / counts.len() as f64
            },
        ));
        ret.push(TargetFunction::new(
            Arc::from("totalWrong"),
            Arc::from("total number of wrong classifications"),
            move |values| values[..class_count].iter().sum(),
        ));
        for (i, class) in self.classes.iter().enumerate() {
            ret.push(TargetFunction::new(
                Arc::from(format!("wrong_{class}")),
                Arc::from(format!(
                    "number of misclassifications that should have been {class}"
                )),
                move |values| values[i],
            ));
        }
        for (i, class) in self.classes.iter().enumerate() {
            let count = self.counts_per_class[i] as f64;
            ret.push(TargetFunction::new(
                Arc::from(format!("relWrong_{class}")),
                Arc::from(format!(
                    "relative share of misclassifications that should have been {class}"
                )),
                move |values| values[i] / count,
            ));
        }
        ret.push(TargetFunction::objective(Arc::from("complexity"), class_count));
        ret.push(TargetFunction::objective(
            Arc::from("featureCount"),
            class_count + 1,
        ));
        ret
    }

    fn evaluate(&self, rule_set: &RuleSet, records: &RecordSet) -> Vec<f64> {
        let mut values = vec![0.0; self.classes.len() + 2];
        for record in records.records() {
            let predicted = rule_set.apply(record);
            if predicted != record.label() {
                if let Some(&i) = self.class_indices.get(record.label()) {
                    values[i] += 1.0;
                }
            }
        }
        values[self.classes.len()] = rule_set.complexity() as f64;
        values[self.classes.len() + 1] = rule_set.feature_count() as f64;
        values
    }
}
