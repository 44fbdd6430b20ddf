//! Greedy top-down induction of new rule sets.
//!
//! One invocation picks a random target class, reduces the problem to
//! "records that must get this label" versus everything else (both
//! restricted to records the basis rule set misclassifies), and grows
//! a disjunction of conjunctions for it. Each conjunction is built by
//! repeated greedy condition selection under a randomly sampled
//! scoring function, with occasional random conditions for
//! exploration.

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use tracing::debug;

use crate::board::{Blackboard, CreationRestriction};
use crate::data::{split_point_with_few_digits, Record, RecordScheme, RecordSet};
use crate::model::{And, Operator, Or, PatternSlot, RuleSet, SimpleRule};
use crate::search::CancelFlag;

const RANDOM_CONDITION_CHANCE: f64 = 0.05;
const RANDOM_CONDITION_RETRIES: usize = 10;
const MIN_FEATURE_SUBSET: usize = 5;
const DOWNSAMPLE_FACTOR: f64 = 0.5;
const DOWNSAMPLE_MIN_PER_FEATURE: usize = 50;

/// The confusion counts of one candidate conjunction on the current
/// binarized subset: how many "must" records and how many "no" records
/// it still covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleQuality {
    must_count: usize,
    no_count: usize,
}

impl RuleQuality {
    pub fn new(must_count: usize, no_count: usize) -> Self {
        Self {
            must_count,
            no_count,
        }
    }

    /// A conjunction that still favors the must class discriminates
    /// nothing and is discarded.
    pub fn is_pro_must(&self) -> bool {
        self.must_count >= self.no_count
    }

    pub fn size(&self) -> usize {
        self.must_count + self.no_count
    }
}

/// The closed family of condition scoring functions, one of which is
/// sampled per conjunction and used consistently while growing it.
/// Larger scores are better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreFunction {
    Precision,
    Laplace,
    /// Cost-weighted ratio of hit rates, weight in `[0, 0.8)`.
    RelativeCost(f64),
    /// M-estimate with `m` in `[1, 100]`.
    MEstimate(f64),
}

impl ScoreFunction {
    pub fn sample(rng: &mut impl Rng) -> Self {
        match rng.random_range(0..4) {
            0 => ScoreFunction::Precision,
            1 => ScoreFunction::Laplace,
            2 => ScoreFunction::RelativeCost(rng.random::<f64>() * 0.8),
            _ => ScoreFunction::MEstimate(f64::from(rng.random_range(1..=100))),
        }
    }

    pub fn score(&self, quality: &RuleQuality, total: &RuleQuality) -> f64 {
        let no = quality.no_count as f64;
        let must = quality.must_count as f64;
        let size = quality.size() as f64;
        match self {
            ScoreFunction::Precision => {
                if quality.size() == 0 {
                    0.0
                } else {
                    no / size
                }
            }
            ScoreFunction::Laplace => (no + 1.0) / (size + 2.0),
            ScoreFunction::RelativeCost(cr) => {
                let hit_rate = no / total.no_count as f64;
                let false_hit_rate = must / total.must_count as f64;
                cr * hit_rate - (1.0 - cr) * false_hit_rate
            }
            ScoreFunction::MEstimate(m) => {
                (no + m * no / total.size() as f64) / (size + m)
            }
        }
    }
}

/// A candidate condition together with the quality of the subset it
/// would leave covered.
struct ConditionResult {
    condition: SimpleRule,
    quality: RuleQuality,
}

/// The binarized working set: references into the full record list,
/// split into must-cover and must-not-cover records.
struct RecordSubset<'a> {
    must: Vec<&'a Record>,
    no: Vec<&'a Record>,
}

impl<'a> RecordSubset<'a> {
    fn new(must: Vec<&'a Record>, no: Vec<&'a Record>) -> Self {
        Self { must, no }
    }

    fn must_count(&self) -> usize {
        self.must.len()
    }

    fn no_count(&self) -> usize {
        self.no.len()
    }

    fn quality(&self) -> RuleQuality {
        RuleQuality::new(self.must_count(), self.no_count())
    }

    fn keep_satisfying(&self, pred: impl Fn(&Record) -> bool) -> RecordSubset<'a> {
        RecordSubset::new(
            self.must.iter().filter(|r| pred(r)).copied().collect(),
            self.no.iter().filter(|r| pred(r)).copied().collect(),
        )
    }

    fn keep_not_satisfying(&self, pred: impl Fn(&Record) -> bool) -> RecordSubset<'a> {
        self.keep_satisfying(|r| !pred(r))
    }

    fn swap_must_and_no(&self) -> RecordSubset<'a> {
        RecordSubset::new(self.no.clone(), self.must.clone())
    }

    /// Samples both classes with replacement down to
    /// `max(min_per_class, factor × minority class size)`.
    fn downsample(
        &self,
        rng: &mut impl Rng,
        factor: f64,
        min_per_class: usize,
    ) -> RecordSubset<'a> {
        let mut minority = self.no.len();
        if !self.must.is_empty() && self.must.len() < minority {
            minority = self.must.len();
        }
        let wanted = min_per_class.max((factor * minority as f64) as usize);
        RecordSubset::new(
            sample_with_replacement(rng, &self.must, wanted),
            sample_with_replacement(rng, &self.no, wanted),
        )
    }
}

fn sample_with_replacement<'a>(
    rng: &mut impl Rng,
    source: &[&'a Record],
    wanted: usize,
) -> Vec<&'a Record> {
    if source.is_empty() {
        return Vec::new();
    }
    (0..wanted)
        .filter_map(|_| source.choose(rng).copied())
        .collect()
}

/// Builds brand-new candidate rule sets by greedy top-down induction.
pub struct GreedyRuleCreation {
    board: Blackboard,
}

impl GreedyRuleCreation {
    pub fn new(board: Blackboard) -> Self {
        Self { board }
    }

    /// Grows one new exception for a randomly chosen target class on
    /// top of `basis` (or a fresh single-label rule set). `limit`
    /// bounds the number of conjunctions added and must be positive.
    pub fn create_rule_set(
        &self,
        rng: &mut impl Rng,
        limit: usize,
        basis: Option<RuleSet>,
        cancel: &CancelFlag,
    ) -> RuleSet {
        let records = self.board.records();
        let scheme = Arc::clone(records.scheme());
        let target_class = self.random_class(rng, &records);
        let basis =
            basis.unwrap_or_else(|| RuleSet::create(self.random_class(rng, &records)));

        let binary = self.make_binary(&records, &target_class, &basis);
        debug!(
            must = binary.must_count(),
            other = binary.no_count(),
            "binarized records"
        );

        let rejected = self.board.rejected_columns();
        let selected_features = self.sample_feature_subset(rng, &scheme, &rejected);

        let mut uncovered = binary.downsample(
            rng,
            DOWNSAMPLE_FACTOR,
            selected_features.len() * DOWNSAMPLE_MIN_PER_FEATURE,
        );
        let total_reversed = uncovered.swap_must_and_no().quality();

        // Accepted conjunctions are part of every valid rule set, so
        // start from them and only cover what they leave open.
        let mut ret = Or::default();
        for accepted in self.board.accepted_rules(&target_class) {
            ret = ret.or(accepted);
        }
        let start = ret.clone();
        uncovered = uncovered.keep_not_satisfying(|r| start.test(r));

        let max_iterations = rng.random_range(0..limit);
        for _ in 0..max_iterations {
            if uncovered.must_count() == 0 || cancel.is_cancelled() {
                break;
            }
            let best = self.greedy_top_down(
                rng,
                &scheme,
                uncovered.swap_must_and_no(),
                &selected_features,
                &total_reversed,
                &target_class,
                &rejected,
                cancel,
            );
            let Some(rule) = best else {
                // A fruitless round still counts against the budget;
                // the next score function draw may fare better.
                continue;
            };
            uncovered = uncovered.keep_not_satisfying(|r| rule.test(r));
            ret = ret.or(Arc::new(rule));
        }
        basis.add_exception(target_class, ret)
    }

    fn random_class(&self, rng: &mut impl Rng, records: &RecordSet) -> Arc<str> {
        match records.records().choose(rng) {
            Some(record) => Arc::clone(record.label()),
            None => Arc::clone(&records.class_labels()[0]),
        }
    }

    /// Must records of the target class and no records of every other
    /// class, both restricted to what `basis` misclassifies.
    fn make_binary<'a>(
        &self,
        records: &'a RecordSet,
        target_class: &Arc<str>,
        basis: &RuleSet,
    ) -> RecordSubset<'a> {
        let mut must = Vec::new();
        let mut no = Vec::new();
        for record in records.records() {
            if basis.apply(record) == record.label() {
                continue;
            }
            if record.label() == target_class {
                must.push(record);
            } else {
                no.push(record);
            }
        }
        RecordSubset::new(must, no)
    }

    /// Random subspace selection: a shuffled subset of the non-rejected
    /// columns, at least five and at most half of all columns.
    fn sample_feature_subset(
        &self,
        rng: &mut impl Rng,
        scheme: &RecordScheme,
        rejected: &[Arc<str>],
    ) -> Vec<Arc<str>> {
        let mut possible: Vec<Arc<str>> = scheme
            .column_names()
            .filter(|name| !rejected.contains(*name))
            .cloned()
            .collect();
        possible.shuffle(rng);
        let count = MIN_FEATURE_SUBSET.max(scheme.column_count() / 2);
        possible.truncate(count);
        possible
    }

    /// Builds one conjunction by repeated greedy condition selection,
    /// returning the best-scoring prefix seen. `None` when even that
    /// prefix fails to discriminate against the must class.
    #[allow(clippy::too_many_arguments)]
    fn greedy_top_down(
        &self,
        rng: &mut impl Rng,
        scheme: &RecordScheme,
        mut to_cover: RecordSubset<'_>,
        selected_features: &[Arc<str>],
        total: &RuleQuality,
        target_class: &Arc<str>,
        rejected: &[Arc<str>],
        cancel: &CancelFlag,
    ) -> Option<And> {
        let mut prior_rule = And::empty();
        let mut best_rule = prior_rule.clone();
        let mut best_quality = to_cover.quality();
        let score_function = ScoreFunction::sample(rng);

        while !cancel.is_cancelled() {
            let restriction = self
                .board
                .creation_restriction(target_class, &prior_rule);
            let condition = if rng.random_bool(RANDOM_CONDITION_CHANCE) {
                self.create_random_condition(
                    rng,
                    scheme,
                    &to_cover,
                    selected_features,
                    &prior_rule,
                    &restriction,
                )
            } else {
                find_best_condition(
                    scheme,
                    &to_cover,
                    selected_features,
                    &prior_rule,
                    total,
                    score_function,
                    &restriction,
                    rejected,
                )
            };
            let Some(condition) = condition else {
                break;
            };
            prior_rule = prior_rule.and(condition.condition.clone());
            if is_better(&condition.quality, &best_quality, score_function, total)
                || best_rule.is_empty()
            {
                best_rule = prior_rule.clone();
                best_quality = condition.quality;
            }
            to_cover = to_cover.keep_satisfying(|r| condition.condition.test(r));
        }

        if best_quality.is_pro_must() {
            None
        } else {
            Some(best_rule)
        }
    }

    /// Exploration move: a random condition over a random unused
    /// column, rejected candidates retried a few times per column.
    fn create_random_condition(
        &self,
        rng: &mut impl Rng,
        scheme: &RecordScheme,
        to_cover: &RecordSubset<'_>,
        selected_features: &[Arc<str>],
        prior_rule: &And,
        restriction: &CreationRestriction,
    ) -> Option<ConditionResult> {
        let used = prior_rule.used_features();
        let mut remaining: Vec<usize> = (0..scheme.column_count())
            .filter(|i| {
                let name = scheme.name(*i);
                used.count(name) == 0 && selected_features.contains(name)
            })
            .collect();
        remaining.shuffle(rng);

        for index in remaining {
            if to_cover.must.is_empty() || to_cover.no.is_empty() {
                continue;
            }
            let condition = (0..RANDOM_CONDITION_RETRIES).find_map(|_| {
                self.random_rule_for_column(rng, scheme, index, to_cover)
                    .filter(|r| restriction.can_be_valid(r))
            });
            if let Some(condition) = condition {
                let quality = to_cover.keep_satisfying(|r| condition.test(r)).quality();
                return Some(ConditionResult { condition, quality });
            }
        }
        None
    }

    /// A condition separating one random must record from one random
    /// no record on the given column.
    fn random_rule_for_column(
        &self,
        rng: &mut impl Rng,
        scheme: &RecordScheme,
        index: usize,
        to_cover: &RecordSubset<'_>,
    ) -> Option<SimpleRule> {
        let column = scheme.column(index);
        if scheme.is_ordinal(index) {
            let must_value = to_cover.must.choose(rng)?.ordinal_value(column.typed_index());
            let no_value = to_cover.no.choose(rng)?.ordinal_value(column.typed_index());
            if must_value.is_nan() || no_value.is_nan() {
                return None;
            }
            if no_value < must_value {
                Some(SimpleRule::leq(column, no_value))
            } else {
                Some(SimpleRule::geq(column, must_value))
            }
        } else if rng.random_bool(0.5) {
            let record = to_cover.no.choose(rng)?;
            let value = record.nominal_value(column.typed_index())?;
            Some(SimpleRule::equals(column, Arc::clone(value)))
        } else {
            let record = to_cover.must.choose(rng)?;
            let value = record.nominal_value(column.typed_index())?;
            Some(SimpleRule::not_equals(column, Arc::clone(value)))
        }
    }
}

/// Better means higher score; equal scores go to the candidate
/// covering fewer records.
fn is_better(
    candidate: &RuleQuality,
    current: &RuleQuality,
    score_function: ScoreFunction,
    total: &RuleQuality,
) -> bool {
    let candidate_score = score_function.score(candidate, total);
    let current_score = score_function.score(current, total);
    candidate_score > current_score
        || (candidate_score == current_score && candidate.size() < current.size())
}

/// Exhaustively evaluates every legal single-condition addition and
/// returns the best-scoring one.
#[allow(clippy::too_many_arguments)]
fn find_best_condition(
    scheme: &RecordScheme,
    to_cover: &RecordSubset<'_>,
    selected_features: &[Arc<str>],
    prior_rule: &And,
    total: &RuleQuality,
    score_function: ScoreFunction,
    restriction: &CreationRestriction,
    rejected: &[Arc<str>],
) -> Option<ConditionResult> {
    let used = prior_rule.used_features();
    let mut best: Option<ConditionResult> = None;

    for typed in 0..scheme.nominal_count() {
        let column = scheme.column(scheme.ordinal_count() + typed);
        if !selected_features.contains(column.name()) {
            continue;
        }
        let must_counts = count_nominal_values(&to_cover.must, typed);
        if must_counts.is_empty() {
            continue;
        }
        let no_counts = count_nominal_values(&to_cover.no, typed);
        if no_counts.is_empty() {
            continue;
        }
        if single_joint_value(&must_counts, &no_counts) {
            continue;
        }
        let equals_slot = PatternSlot::new(column.clone(), Operator::Equals);
        if used.count(column.name()) == 0 && restriction.slot_can_be_valid(&equals_slot) {
            for (value, no_count) in &no_counts {
                let quality = RuleQuality::new(
                    must_counts.get(value).copied().unwrap_or(0),
                    *no_count,
                );
                best = consider(
                    best,
                    SimpleRule::equals(column.clone(), Arc::clone(value)),
                    quality,
                    score_function,
                    total,
                    restriction,
                );
            }
        }
        let not_equals_slot = PatternSlot::new(column.clone(), Operator::NotEquals);
        if restriction.slot_can_be_valid(&not_equals_slot) {
            for (value, must_count) in &must_counts {
                let quality = RuleQuality::new(
                    to_cover.must_count() - must_count,
                    to_cover.no_count() - no_counts.get(value).copied().unwrap_or(0),
                );
                best = consider(
                    best,
                    SimpleRule::not_equals(column.clone(), Arc::clone(value)),
                    quality,
                    score_function,
                    total,
                    restriction,
                );
            }
        }
    }

    for typed in 0..scheme.ordinal_count() {
        let column = scheme.column(typed);
        // Ordinal columns may be used twice so ranges can form.
        if used.count(column.name()) > 1 {
            continue;
        }
        if rejected.contains(column.name()) {
            continue;
        }
        let (must_values, must_counts) = count_ordinal_values(&to_cover.must, typed);
        if must_counts.is_empty() {
            continue;
        }
        let (no_values, no_counts) = count_ordinal_values(&to_cover.no, typed);
        if no_counts.is_empty() {
            continue;
        }
        let mut values: Vec<f64> = must_values.into_iter().chain(no_values).collect();
        values.sort_by(f64::total_cmp);
        values.dedup_by(|a, b| a == b);

        let total_must: usize = must_counts.values().sum();
        let total_no: usize = no_counts.values().sum();
        let try_leq =
            restriction.slot_can_be_valid(&PatternSlot::new(column.clone(), Operator::Leq));
        let try_geq =
            restriction.slot_can_be_valid(&PatternSlot::new(column.clone(), Operator::Geq));

        // One linear sweep with running prefix sums evaluates every
        // threshold between two adjacent observed values.
        let mut must_sum = must_counts.get(&values[0].to_bits()).copied().unwrap_or(0);
        let mut no_sum = no_counts.get(&values[0].to_bits()).copied().unwrap_or(0);
        for window in values.windows(2) {
            let threshold = split_point_with_few_digits(window[0], window[1]);
            if try_leq {
                best = consider(
                    best,
                    SimpleRule::leq(column.clone(), threshold),
                    RuleQuality::new(must_sum, no_sum),
                    score_function,
                    total,
                    restriction,
                );
            }
            if try_geq {
                best = consider(
                    best,
                    SimpleRule::geq(column.clone(), threshold),
                    RuleQuality::new(total_must - must_sum, total_no - no_sum),
                    score_function,
                    total,
                    restriction,
                );
            }
            must_sum += must_counts.get(&window[1].to_bits()).copied().unwrap_or(0);
            no_sum += no_counts.get(&window[1].to_bits()).copied().unwrap_or(0);
        }
    }

    best
}

fn consider(
    best: Option<ConditionResult>,
    candidate: SimpleRule,
    quality: RuleQuality,
    score_function: ScoreFunction,
    total: &RuleQuality,
    restriction: &CreationRestriction,
) -> Option<ConditionResult> {
    let improves = match &best {
        None => true,
        Some(current) => is_better(&quality, &current.quality, score_function, total),
    };
    if improves && restriction.can_be_valid(&candidate) {
        Some(ConditionResult {
            condition: candidate,
            quality,
        })
    } else {
        best
    }
}

fn count_nominal_values(
    records: &[&Record],
    typed_index: usize,
) -> HashMap<Arc<str>, usize> {
    let mut counts = HashMap::new();
    for record in records {
        if let Some(value) = record.nominal_value(typed_index) {
            *counts.entry(Arc::clone(value)).or_insert(0) += 1;
        }
    }
    counts
}

/// Observed non-NaN values with their occurrence counts, keyed by bit
/// pattern so they can live in a hash map.
fn count_ordinal_values(
    records: &[&Record],
    typed_index: usize,
) -> (Vec<f64>, HashMap<u64, usize>) {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    let mut values = Vec::new();
    for record in records {
        let value = record.ordinal_value(typed_index);
        if value.is_nan() {
            continue;
        }
        let entry = counts.entry(value.to_bits()).or_insert(0);
        if *entry == 0 {
            values.push(value);
        }
        *entry += 1;
    }
    (values, counts)
}

fn single_joint_value(
    must_counts: &HashMap<Arc<str>, usize>,
    no_counts: &HashMap<Arc<str>, usize>,
) -> bool {
    if must_counts.len() > 1 || no_counts.len() > 1 {
        return false;
    }
    must_counts
        .keys()
        .chain(no_counts.keys())
        .collect::<std::collections::HashSet<_>>()
        .len()
        <= 1
}
