//! The blackboard: the coordination hub all mining agents and user
//! actions work against.
//!
//! One dedicated thread owns the mutable coordination state (see
//! [`hub`]); [`Blackboard`] is the cloneable handle the rest of the
//! crate talks through. Hot read-mostly state (the training data,
//! navigation limits, the current target function, the seed counter)
//! lives outside the hub so reads never queue behind archive traffic.
//!
//! Shutdown is by channel disconnection: dropping the last
//! [`Blackboard`] stops the background revalidation worker, which in
//! turn releases its hub handle, stopping the hub.

mod hub;
mod persist;
mod restrictions;

pub use restrictions::{CreationRestriction, RestrictionClassification, RuleRestrictions};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, RwLock};
use std::thread;

use tracing::info;

use crate::archive::{NavigationLimits, NondominatedResults, TargetFunction, ValuedResult};
use crate::data::RecordSet;
use crate::eval::ObjectiveEvaluator;
use crate::model::{And, RulePattern, RuleSet};

use hub::{CacheSnapshot, Hub, HubClient, Request, RestrictionEdit};

/// The four work queues connecting user actions and agents. User-fed
/// queues are polled before agent-fed ones and favor recent items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    UserLocalSearch = 0,
    AgentLocalSearch = 1,
    UserPathRelinking = 2,
    AgentPathRelinking = 3,
}

impl QueueKind {
    fn is_user_fed(self) -> bool {
        matches!(self, QueueKind::UserLocalSearch | QueueKind::UserPathRelinking)
    }
}

/// A replayable change to the training data. The cleaning log is part
/// of the persisted state, so every variant must serialize.
#[derive(Debug, Clone)]
pub enum DataCleaningAction {
    RemoveRecord { id: u32 },
}

impl DataCleaningAction {
    pub fn user_string(&self) -> String {
        match self {
            DataCleaningAction::RemoveRecord { id } => format!("remove record {id}"),
        }
    }

    pub(crate) fn serialize(&self) -> String {
        match self {
            DataCleaningAction::RemoveRecord { id } => format!("removeRecord,{id}"),
        }
    }

    pub(crate) fn parse(line: &str) -> Result<Self, crate::error::MiningError> {
        match line.split_once(',') {
            Some(("removeRecord", id)) => id
                .parse()
                .map(|id| DataCleaningAction::RemoveRecord { id })
                .map_err(|_| crate::error::MiningError::UnknownCleaningAction(line.to_string())),
            _ => Err(crate::error::MiningError::UnknownCleaningAction(
                line.to_string(),
            )),
        }
    }

    fn execute(&self, records: &RecordSet) -> (RecordSet, String) {
        match self {
            DataCleaningAction::RemoveRecord { id } => {
                let cleaned = records.without_records(|r| r.id() == *id);
                let removed = records.len() - cleaned.len();
                (cleaned, format!("removed {removed} record(s) with ID {id}"))
            }
        }
    }
}

/// The training data together with the objective evaluator scoring
/// against it. Swapped atomically as one unit when a cleaning action
/// changes the data.
pub struct MiningInputs {
    records: Arc<RecordSet>,
    evaluator: Arc<dyn ObjectiveEvaluator>,
}

impl MiningInputs {
    pub fn new(records: Arc<RecordSet>, evaluator: Arc<dyn ObjectiveEvaluator>) -> Self {
        Self { records, evaluator }
    }

    pub fn records(&self) -> &Arc<RecordSet> {
        &self.records
    }

    pub fn evaluator(&self) -> &Arc<dyn ObjectiveEvaluator> {
        &self.evaluator
    }

    fn with_records(&self, records: Arc<RecordSet>) -> MiningInputs {
        MiningInputs {
            records,
            evaluator: Arc::clone(&self.evaluator),
        }
    }
}

/// Read-mostly state shared by the hub and all handles without
/// message passing.
pub(crate) struct Shared {
    inputs: RwLock<Arc<MiningInputs>>,
    limits: NavigationLimits,
    target_functions: Vec<TargetFunction>,
    current_target: RwLock<TargetFunction>,
    seed_counter: AtomicU64,
}

impl Shared {
    pub(crate) fn inputs(&self) -> Arc<MiningInputs> {
        match self.inputs.read() {
            Ok(guard) => (*guard).clone(),
            Err(poisoned) => (*poisoned.into_inner()).clone(),
        }
    }

    fn replace_inputs(&self, inputs: Arc<MiningInputs>) {
        if let Ok(mut slot) = self.inputs.write() {
            *slot = inputs;
        }
    }

    pub(crate) fn limits(&self) -> &NavigationLimits {
        &self.limits
    }

    pub(crate) fn target_functions(&self) -> &[TargetFunction] {
        &self.target_functions
    }

    pub(crate) fn current_target(&self) -> TargetFunction {
        match self.current_target.read() {
            Ok(guard) => (*guard).clone(),
            Err(poisoned) => (*poisoned.into_inner()).clone(),
        }
    }

    pub(crate) fn set_current_target(&self, target: TargetFunction) {
        if let Ok(mut slot) = self.current_target.write() {
            *slot = target;
        }
    }

    pub(crate) fn next_seed(&self) -> u64 {
        self.seed_counter.fetch_add(1, Ordering::Relaxed)
    }
}

/// Cloneable handle to the coordination hub.
///
/// All methods are safe to call from any thread. Methods that change
/// restrictions or data synchronously prune the archive and then hand
/// the stale cache to the background revalidation worker before
/// returning.
#[derive(Clone)]
pub struct Blackboard {
    client: HubClient,
    reval_tx: Sender<CacheSnapshot>,
}

impl Blackboard {
    /// Spawns the hub and the revalidation worker and seeds the
    /// archive with one default rule set per class label.
    pub fn new(
        records: Arc<RecordSet>,
        evaluator: Arc<dyn ObjectiveEvaluator>,
        initial_seed: u64,
    ) -> Blackboard {
        let target_functions = evaluator.target_functions();
        let current_target = target_functions[0].clone();
        let shared = Arc::new(Shared {
            inputs: RwLock::new(Arc::new(MiningInputs::new(records, evaluator))),
            limits: NavigationLimits::new(),
            target_functions,
            current_target: RwLock::new(current_target),
            seed_counter: AtomicU64::new(initial_seed),
        });

        let (tx, rx) = mpsc::channel();
        let hub = Hub::new(Arc::clone(&shared));
        thread::Builder::new()
            .name("blackboard-hub".into())
            .spawn(move || hub.run(rx))
            .unwrap_or_else(|e| panic!("failed to spawn hub thread: {e}"));

        let client = HubClient::new(tx, shared);

        // The worker holds a plain hub client, never a Blackboard:
        // otherwise it would keep its own job channel alive and never
        // shut down.
        let (reval_tx, reval_rx) = mpsc::channel();
        let worker_client = client.clone();
        thread::Builder::new()
            .name("blackboard-revalidation".into())
            .spawn(move || hub::revalidation_loop(worker_client, reval_rx))
            .unwrap_or_else(|e| panic!("failed to spawn revalidation thread: {e}"));

        let board = Blackboard { client, reval_tx };
        board.client.send(Request::SeedDefaults);
        board
    }

    // --- evaluation funnel -------------------------------------------------

    /// Cached objective evaluation of an unmodified rule set.
    pub fn evaluate(&self, rule_set: &RuleSet) -> ValuedResult<RuleSet> {
        self.client.evaluate(rule_set)
    }

    /// Rewrites a rule set to satisfy all current restrictions.
    pub fn make_valid(&self, rule_set: RuleSet) -> RuleSet {
        self.client.make_valid(rule_set)
    }

    pub fn make_valid_and_evaluate(&self, rule_set: &RuleSet) -> ValuedResult<RuleSet> {
        self.client.make_valid_and_evaluate(rule_set)
    }

    /// Simplify, make valid, evaluate, and offer to the archive. Every
    /// algorithm publishes results through this single funnel.
    pub fn simplify_evaluate_and_add(&self, rule_set: &RuleSet) -> ValuedResult<RuleSet> {
        self.client.simplify_evaluate_and_add(rule_set)
    }

    pub fn cache_size(&self) -> usize {
        self.client
            .request(|reply| Request::CacheSize { reply })
            .unwrap_or(0)
    }

    // --- archive access ----------------------------------------------------

    pub fn pareto_front(&self) -> NondominatedResults<RuleSet> {
        self.client
            .request(|reply| Request::Snapshot { reply })
            .unwrap_or_default()
    }

    pub fn random_result(&self, rng: &mut impl rand::Rng) -> Option<ValuedResult<RuleSet>> {
        self.pareto_front().random_item(rng)
    }

    /// A random one of the best results inside the navigation limits,
    /// judged by the current target function.
    pub fn best_result_in_limits(
        &self,
        rng: &mut impl rand::Rng,
    ) -> Option<ValuedResult<RuleSet>> {
        self.navigation_limits()
            .filter(&self.pareto_front())
            .best_item(rng, &self.current_target_function())
    }

    /// Re-publishes every result of another front through the funnel.
    pub fn add_all(&self, results: &NondominatedResults<RuleSet>) {
        for result in results.items() {
            self.simplify_evaluate_and_add(result.item());
        }
    }

    /// Throws away all but roughly `count_to_keep` rule sets.
    pub fn purge(&self, count_to_keep: usize) {
        self.client.request(|reply| Request::Purge {
            count_to_keep,
            reply,
        });
    }

    // --- work queues -------------------------------------------------------

    pub fn enqueue(&self, queue: QueueKind, result: ValuedResult<RuleSet>) {
        self.client.send(Request::QueuePush { queue, result });
    }

    pub fn poll(&self, queue: QueueKind) -> Option<ValuedResult<RuleSet>> {
        self.client
            .request(|reply| Request::QueuePoll { queue, reply })
            .flatten()
    }

    // --- restrictions ------------------------------------------------------

    pub fn accept(&self, label: Arc<str>, rules: Vec<Arc<And>>) {
        self.edit_restrictions(label, RestrictionEdit::Accept(rules));
    }

    pub fn reject_rules(&self, label: Arc<str>, rules: Vec<Arc<And>>) {
        self.edit_restrictions(label, RestrictionEdit::RejectRules(rules));
    }

    pub fn reject_pattern(&self, label: Arc<str>, pattern: RulePattern) {
        self.edit_restrictions(label, RestrictionEdit::RejectPattern(pattern));
    }

    pub fn keep_as_candidate(&self, label: Arc<str>, rules: Vec<Arc<And>>) {
        self.edit_restrictions(label, RestrictionEdit::KeepAsCandidate(rules));
    }

    pub fn remove_restrictions(&self, label: Arc<str>, rules: Vec<Arc<And>>) {
        self.edit_restrictions(label, RestrictionEdit::Remove(rules));
    }

    pub fn remove_rejected_pattern(&self, label: Arc<str>, pattern: RulePattern) {
        self.edit_restrictions(label, RestrictionEdit::RemovePattern(pattern));
    }

    fn edit_restrictions(&self, label: Arc<str>, edit: RestrictionEdit) {
        if let Some(snapshot) =
            self.client
                .request(|reply| Request::EditRestrictions { label, edit, reply })
        {
            let _ = self.reval_tx.send(snapshot);
        }
    }

    pub fn accepted_rules(&self, label: &Arc<str>) -> Vec<Arc<And>> {
        self.client
            .request(|reply| Request::AcceptedRules {
                label: Arc::clone(label),
                reply,
            })
            .unwrap_or_default()
    }

    pub fn classify(&self, label: &Arc<str>, rule: &And) -> RestrictionClassification {
        self.client
            .request(|reply| Request::Classify {
                label: Arc::clone(label),
                rule: rule.clone(),
                reply,
            })
            .unwrap_or(RestrictionClassification::Unknown)
    }

    /// What rule creation must not propose while growing `prior` for
    /// `label`.
    pub fn creation_restriction(&self, label: &Arc<str>, prior: &And) -> CreationRestriction {
        self.client
            .request(|reply| Request::CreationRestriction {
                label: Arc::clone(label),
                prior: prior.clone(),
                reply,
            })
            .unwrap_or_default()
    }

    // --- rejected columns --------------------------------------------------

    pub fn reject_columns(&self, columns: Vec<Arc<str>>) {
        if let Some(snapshot) = self
            .client
            .request(|reply| Request::RejectColumns { columns, reply })
        {
            let _ = self.reval_tx.send(snapshot);
        }
    }

    pub fn unreject_column(&self, column: Arc<str>) {
        if let Some(snapshot) = self
            .client
            .request(|reply| Request::UnrejectColumn { column, reply })
        {
            let _ = self.reval_tx.send(snapshot);
        }
    }

    pub fn rejected_columns(&self) -> Vec<Arc<str>> {
        self.client
            .request(|reply| Request::RejectedColumns { reply })
            .unwrap_or_default()
    }

    // --- data cleaning -----------------------------------------------------

    /// Removes one record by id and re-evaluates everything.
    pub fn remove_record(&self, id: u32) -> String {
        self.clean_data(DataCleaningAction::RemoveRecord { id })
    }

    fn clean_data(&self, action: DataCleaningAction) -> String {
        match self
            .client
            .request(|reply| Request::CleanData { action, reply })
        {
            Some((message, snapshot)) => {
                info!("{message}");
                let _ = self.reval_tx.send(snapshot);
                message
            }
            None => String::new(),
        }
    }

    // --- shared read-mostly state ------------------------------------------

    pub fn inputs(&self) -> Arc<MiningInputs> {
        self.client.shared().inputs()
    }

    pub fn records(&self) -> Arc<RecordSet> {
        Arc::clone(self.inputs().records())
    }

    pub fn navigation_limits(&self) -> &NavigationLimits {
        self.client.shared().limits()
    }

    pub fn target_functions(&self) -> &[TargetFunction] {
        self.client.shared().target_functions()
    }

    pub fn current_target_function(&self) -> TargetFunction {
        self.client.shared().current_target()
    }

    pub fn set_current_target_function(&self, target: TargetFunction) {
        self.client.shared().set_current_target(target);
    }

    /// Monotone seed source making every agent's randomness
    /// reproducible from the initial seed.
    pub fn next_random_seed(&self) -> u64 {
        self.client.shared().next_seed()
    }

    pub fn create_rng(&self) -> rand::rngs::StdRng {
        use rand::SeedableRng;
        let seed = self.next_random_seed();
        info!(seed, "creating new rng");
        rand::rngs::StdRng::seed_from_u64(seed)
    }

    pub(crate) fn restore(&self, result: ValuedResult<RuleSet>) {
        self.client.send(Request::Restore { result });
    }

    pub(crate) fn seed_default_rule_sets(&self) {
        self.client.send(Request::SeedDefaults);
    }

    pub(crate) fn state_snapshot(&self) -> Option<hub::StateSnapshot> {
        self.client.request(|reply| Request::TakeState { reply })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Record, RecordScheme};
    use crate::eval::StandardObjectives;
    use crate::model::SimpleRule;

    fn sample_board() -> Blackboard {
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
        let records = Arc::new(RecordSet::new(scheme, records));
        let evaluator = Arc::new(StandardObjectives::from_records(&records));
        Blackboard::new(records, evaluator, 0)
    }

    fn keep_rule(board: &Blackboard, threshold: f64) -> Arc<And> {
        Arc::new(And::single(SimpleRule::leq(
            board.records().scheme().column(0),
            threshold,
        )))
    }

    #[test]
    fn evaluation_results_are_cached() {
        let board = sample_board();
        let rs = RuleSet::create(Arc::from("drop"))
            .add_rule(&Arc::from("keep"), keep_rule(&board, 3.5));
        let before = board.cache_size();
        let a = board.evaluate(&rs);
        let b = board.evaluate(&rs);
        assert_eq!(a.values(), b.values());
        assert_eq!(board.cache_size(), before + 1);
    }

    #[test]
    fn make_valid_is_a_fixed_point() {
        let board = sample_board();
        let keep: Arc<str> = Arc::from("keep");
        let rejected = keep_rule(&board, 1.5);
        board.reject_rules(Arc::clone(&keep), vec![Arc::clone(&rejected)]);
        let rs = RuleSet::create(Arc::from("drop")).add_rule(&keep, rejected);
        let once = board.make_valid(rs);
        let twice = board.make_valid(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn queues_hand_back_pushed_results() {
        let board = sample_board();
        let result = board.evaluate(&RuleSet::create(Arc::from("keep")));
        board.enqueue(QueueKind::UserLocalSearch, result.clone());
        let polled = board.poll(QueueKind::UserLocalSearch);
        assert_eq!(polled.map(|r| r.item().clone()), Some(result.item().clone()));
        assert!(board.poll(QueueKind::UserLocalSearch).is_none());
    }

    #[test]
    fn remaining_clones_outlive_dropped_handles() {
        let board = sample_board();
        let clone = board.clone();
        drop(board);
        // One default rule set per class label is seeded at startup.
        assert!(!clone.pareto_front().is_empty());
        // Dropping the last handle disconnects the hub and the
        // revalidation worker; nothing left to join.
        drop(clone);
    }
}
