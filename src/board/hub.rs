//! The owner thread of all coordination state.
//!
//! The hub owns the evaluation cache, the Pareto archive, the work
//! queues, and the restriction lists outright; every access arrives
//! as a message on one channel and is handled sequentially, so none
//! of this state needs locks. A second dedicated thread handles
//! background re-evaluation jobs; the hub never blocks on it.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::mpsc::{Receiver, Sender, SyncSender};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::archive::{NondominatedResults, ValuedResult};
use crate::board::restrictions::{
    CreationRestriction, RestrictionClassification, RuleRestrictions,
};
use crate::board::{DataCleaningAction, MiningInputs, QueueKind, Shared};
use crate::model::{And, RulePattern, RuleSet};
use crate::search::purge;

/// Cache entries above this trigger an automatic purge down to 100
/// kept rule sets.
const AUTO_PURGE_LIMIT: usize = 100_000;
const AUTO_PURGE_KEEP: usize = 100;

pub(super) type Reply<T> = SyncSender<T>;

/// The cache contents handed to the revalidation worker.
pub(super) type CacheSnapshot = Vec<ValuedResult<RuleSet>>;

pub(super) enum RestrictionEdit {
    Accept(Vec<Arc<And>>),
    RejectRules(Vec<Arc<And>>),
    RejectPattern(RulePattern),
    KeepAsCandidate(Vec<Arc<And>>),
    Remove(Vec<Arc<And>>),
    RemovePattern(RulePattern),
}

/// Everything persistence needs, copied out of the hub in one step.
pub(crate) struct StateSnapshot {
    pub cleaning: Vec<DataCleaningAction>,
    pub rejected_columns: Vec<Arc<str>>,
    /// Per label: accepted rules, candidate rules, rejected patterns.
    pub restrictions: Vec<(Arc<str>, Vec<Arc<And>>, Vec<Arc<And>>, Vec<RulePattern>)>,
    pub front: Vec<ValuedResult<RuleSet>>,
}

pub(super) enum Request {
    CacheGet {
        rule_set: RuleSet,
        reply: Reply<Option<ValuedResult<RuleSet>>>,
    },
    CachePut {
        result: ValuedResult<RuleSet>,
    },
    CacheSize {
        reply: Reply<usize>,
    },
    ArchiveAdd {
        result: ValuedResult<RuleSet>,
    },
    Snapshot {
        reply: Reply<NondominatedResults<RuleSet>>,
    },
    MakeValid {
        rule_set: RuleSet,
        reply: Reply<RuleSet>,
    },
    SeedDefaults,
    AcceptedRules {
        label: Arc<str>,
        reply: Reply<Vec<Arc<And>>>,
    },
    Classify {
        label: Arc<str>,
        rule: And,
        reply: Reply<RestrictionClassification>,
    },
    CreationRestriction {
        label: Arc<str>,
        prior: And,
        reply: Reply<CreationRestriction>,
    },
    EditRestrictions {
        label: Arc<str>,
        edit: RestrictionEdit,
        reply: Reply<CacheSnapshot>,
    },
    RejectColumns {
        columns: Vec<Arc<str>>,
        reply: Reply<CacheSnapshot>,
    },
    UnrejectColumn {
        column: Arc<str>,
        reply: Reply<CacheSnapshot>,
    },
    RejectedColumns {
        reply: Reply<Vec<Arc<str>>>,
    },
    QueuePush {
        queue: QueueKind,
        result: ValuedResult<RuleSet>,
    },
    QueuePoll {
        queue: QueueKind,
        reply: Reply<Option<ValuedResult<RuleSet>>>,
    },
    CleanData {
        action: DataCleaningAction,
        reply: Reply<(String, CacheSnapshot)>,
    },
    Purge {
        count_to_keep: usize,
        reply: Reply<()>,
    },
    /// Used by load: insert a persisted result with its stored vector,
    /// bypassing evaluation.
    Restore {
        result: ValuedResult<RuleSet>,
    },
    TakeState {
        reply: Reply<StateSnapshot>,
    },
}

pub(super) struct Hub {
    shared: Arc<Shared>,
    cache: HashMap<RuleSet, ValuedResult<RuleSet>>,
    archive: NondominatedResults<RuleSet>,
    queues: [VecDeque<ValuedResult<RuleSet>>; 4],
    restrictions: BTreeMap<Arc<str>, RuleRestrictions>,
    rejected_columns: BTreeSet<Arc<str>>,
    cleaning_log: Vec<DataCleaningAction>,
}

impl Hub {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            cache: HashMap::new(),
            archive: NondominatedResults::new(),
            queues: Default::default(),
            restrictions: BTreeMap::new(),
            rejected_columns: BTreeSet::new(),
            cleaning_log: Vec::new(),
        }
    }

    /// Runs until every request sender is dropped.
    pub(super) fn run(mut self, rx: Receiver<Request>) {
        while let Ok(request) = rx.recv() {
            self.handle(request);
        }
        debug!("coordination hub shutting down");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::CacheGet { rule_set, reply } => {
                let _ = reply.send(self.cache.get(&rule_set).cloned());
            }
            Request::CachePut { result } => {
                self.cache
                    .entry(result.item().clone())
                    .or_insert(result);
                self.check_auto_purge();
            }
            Request::CacheSize { reply } => {
                let _ = reply.send(self.cache.len());
            }
            Request::ArchiveAdd { result } => {
                self.archive.add(&result);
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.archive.clone());
            }
            Request::MakeValid { rule_set, reply } => {
                let _ = reply.send(self.make_valid(&rule_set));
            }
            Request::SeedDefaults => {
                self.seed_default_rule_sets();
            }
            Request::AcceptedRules { label, reply } => {
                let accepted = self
                    .restrictions
                    .get(&label)
                    .map(|r| r.accepted().to_vec())
                    .unwrap_or_default();
                let _ = reply.send(accepted);
            }
            Request::Classify { label, rule, reply } => {
                let classification = self
                    .restrictions
                    .get(&label)
                    .map(|r| r.classify(&rule))
                    .unwrap_or(RestrictionClassification::Unknown);
                let _ = reply.send(classification);
            }
            Request::CreationRestriction {
                label,
                prior,
                reply,
            } => {
                let restriction = self
                    .restrictions
                    .get(&label)
                    .map(|r| r.to_creation_restriction(&prior))
                    .unwrap_or_default();
                let _ = reply.send(restriction);
            }
            Request::EditRestrictions { label, edit, reply } => {
                let entry = self.restrictions.entry(label).or_default();
                match edit {
                    RestrictionEdit::Accept(rules) => entry.accept(rules),
                    RestrictionEdit::RejectRules(rules) => entry.reject_rules(rules),
                    RestrictionEdit::RejectPattern(p) => entry.reject_pattern(p),
                    RestrictionEdit::KeepAsCandidate(rules) => entry.keep_as_candidate(rules),
                    RestrictionEdit::Remove(rules) => entry.remove(&rules),
                    RestrictionEdit::RemovePattern(p) => entry.remove_pattern(&p),
                }
                let _ = reply.send(self.revalidate_pareto_set());
            }
            Request::RejectColumns { columns, reply } => {
                info!(?columns, "rejecting columns");
                self.rejected_columns.extend(columns);
                let _ = reply.send(self.revalidate_pareto_set());
            }
            Request::UnrejectColumn { column, reply } => {
                info!(%column, "undoing column rejection");
                self.rejected_columns.remove(&column);
                let _ = reply.send(self.revalidate_pareto_set());
            }
            Request::RejectedColumns { reply } => {
                let _ = reply.send(self.rejected_columns.iter().cloned().collect());
            }
            Request::QueuePush { queue, result } => {
                let deque = &mut self.queues[queue as usize];
                // User-fed queues favor the most recent items.
                if queue.is_user_fed() {
                    deque.push_front(result);
                } else {
                    deque.push_back(result);
                }
            }
            Request::QueuePoll { queue, reply } => {
                let _ = reply.send(self.queues[queue as usize].pop_front());
            }
            Request::CleanData { action, reply } => {
                info!("data cleaning: {}", action.user_string());
                let message = self.execute_cleaning_action(&action);
                self.cleaning_log.push(action);
                let snapshot = self.reevaluate_after_data_change();
                let _ = reply.send((message, snapshot));
            }
            Request::Purge {
                count_to_keep,
                reply,
            } => {
                self.purge_rules(count_to_keep);
                let _ = reply.send(());
            }
            Request::Restore { result } => {
                self.cache
                    .entry(result.item().clone())
                    .or_insert_with(|| result.clone());
                self.archive.add(&result);
            }
            Request::TakeState { reply } => {
                let restrictions = self
                    .restrictions
                    .iter()
                    .map(|(label, r)| {
                        (
                            Arc::clone(label),
                            r.accepted().to_vec(),
                            r.candidates().to_vec(),
                            r.rejected().to_vec(),
                        )
                    })
                    .collect();
                let _ = reply.send(StateSnapshot {
                    cleaning: self.cleaning_log.clone(),
                    rejected_columns: self.rejected_columns.iter().cloned().collect(),
                    restrictions,
                    front: self.archive.items(),
                });
            }
        }
    }

    /// Rewrites a rule set to satisfy every current restriction:
    /// conjunctions touching rejected columns are stripped, accepted
    /// conjunctions are injected under their label, and conjunctions
    /// matching a rejected pattern are removed unless whitelisted by
    /// the accepted or candidate lists.
    fn make_valid(&self, rule_set: &RuleSet) -> RuleSet {
        let mut ret = rule_set.clone();
        for (index, ex) in rule_set.exceptions().iter().enumerate() {
            for rule in ex.condition().children() {
                let forbidden = rule
                    .used_features()
                    .distinct()
                    .any(|f| self.rejected_columns.contains(f));
                if forbidden {
                    ret = ret.remove_rule_at(index, rule);
                }
            }
        }
        for (label, restrictions) in &self.restrictions {
            for accepted in restrictions.accepted() {
                if !ret.rules_for(label).contains(accepted) {
                    ret = ret.add_rule(label, Arc::clone(accepted));
                }
            }
        }
        for (label, restrictions) in &self.restrictions {
            let whitelist: Vec<Arc<And>> = restrictions
                .accepted()
                .iter()
                .chain(restrictions.candidates().iter())
                .cloned()
                .collect();
            for pattern in restrictions.rejected() {
                for index in 0..ret.exception_count() {
                    if ret.exceptions()[index].label() == label {
                        ret = ret.remove_matching(index, pattern, &whitelist);
                    }
                }
            }
        }
        ret
    }

    fn is_invalid(&self, rule_set: &RuleSet) -> bool {
        *rule_set != self.make_valid(rule_set)
    }

    /// The synchronous half of restriction revalidation: prune the
    /// archive and re-seed the defaults. The returned cache snapshot
    /// is fed to the background worker by the caller.
    fn revalidate_pareto_set(&mut self) -> CacheSnapshot {
        let stale: Vec<RuleSet> = self
            .archive
            .items()
            .iter()
            .map(|r| r.item().clone())
            .filter(|rs| self.is_invalid(rs))
            .collect();
        if !stale.is_empty() {
            debug!(count = stale.len(), "pruning invalidated archive entries");
            self.archive.remove_if(|rs| stale.contains(rs));
        }
        self.seed_default_rule_sets();
        self.cache.values().cloned().collect()
    }

    /// Pushes every result of the funnel for the trivial one-label
    /// rule sets, guaranteeing the archive is never empty.
    fn seed_default_rule_sets(&mut self) {
        let inputs = self.shared.inputs();
        let labels: Vec<Arc<str>> = inputs.records().class_labels().to_vec();
        for label in labels {
            self.funnel_inline(&RuleSet::create(label), &inputs);
        }
    }

    /// The simplify → make-valid → evaluate → archive funnel, run
    /// directly on the hub thread.
    fn funnel_inline(&mut self, rule_set: &RuleSet, inputs: &Arc<MiningInputs>) {
        let simplified = rule_set.simplify(inputs.records());
        let valid = self.make_valid(&simplified);
        let result = match self.cache.get(&valid) {
            Some(cached) => cached.clone(),
            None => {
                let values = inputs.evaluator().evaluate(&valid, inputs.records());
                let result = ValuedResult::new(valid.clone(), values);
                self.cache.insert(valid, result.clone());
                result
            }
        };
        self.archive.add(&result);
    }

    fn execute_cleaning_action(&mut self, action: &DataCleaningAction) -> String {
        let inputs = self.shared.inputs();
        let (new_records, message) = action.execute(inputs.records());
        self.shared
            .replace_inputs(Arc::new(inputs.with_records(Arc::new(new_records))));
        message
    }

    /// After a data change every cached value is stale: drop cache and
    /// archive, re-seed defaults, and hand the old entries to the
    /// background worker for re-evaluation.
    fn reevaluate_after_data_change(&mut self) -> CacheSnapshot {
        let old_cache: CacheSnapshot = self.cache.values().cloned().collect();
        self.cache.clear();
        self.archive.clear();
        self.seed_default_rule_sets();
        old_cache
    }

    fn check_auto_purge(&mut self) {
        if self.cache.len() > AUTO_PURGE_LIMIT {
            info!(cache_size = self.cache.len(), "auto-purge triggered");
            self.purge_rules(AUTO_PURGE_KEEP);
        }
    }

    /// Throws away all but roughly `count_to_keep` rule sets from the
    /// archive and the cache, preferring the best and most diverse.
    fn purge_rules(&mut self, count_to_keep: usize) {
        let inputs = self.shared.inputs();
        let mut rng = StdRng::seed_from_u64(self.shared.next_seed());
        let keep = purge::determine_rules_to_keep(
            &self.archive,
            self.shared.limits(),
            count_to_keep,
            self.shared.target_functions(),
            inputs.records(),
            &mut rng,
        );
        self.archive.clear();
        self.cache.clear();
        for result in keep {
            self.archive.add(&result);
            self.cache.insert(result.item().clone(), result);
        }
        info!(
            remaining = self.archive.item_count(),
            "purge done"
        );
    }
}

/// The background worker: re-runs the publication funnel for handed
/// over cache snapshots, most promising entries first, entries inside
/// the navigation limits before the rest. Exits when the job channel
/// is dropped.
pub(super) fn revalidation_loop(
    client: super::HubClient,
    jobs: Receiver<CacheSnapshot>,
) {
    while let Ok(mut entries) = jobs.recv() {
        debug!(count = entries.len(), "refilling pareto set");
        let target = client.shared().current_target();
        entries.sort_by(|a, b| target.apply(a).total_cmp(&target.apply(b)));
        for entry in &entries {
            if client.shared().limits().is_in_limits(entry) {
                client.simplify_evaluate_and_add(entry.item());
            }
        }
        for entry in &entries {
            client.simplify_evaluate_and_add(entry.item());
        }
        debug!("refilling pareto set finished");
    }
    debug!("revalidation worker shutting down");
}

/// Request sender plus unlocked shared state; the internal handle
/// both the public [`super::Blackboard`] and the revalidation worker
/// are built from.
#[derive(Clone)]
pub(super) struct HubClient {
    tx: Sender<Request>,
    shared: Arc<Shared>,
}

impl HubClient {
    pub(super) fn new(tx: Sender<Request>, shared: Arc<Shared>) -> Self {
        Self { tx, shared }
    }

    pub(super) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub(super) fn send(&self, request: Request) {
        // A send failure means the hub is gone, which only happens
        // during shutdown.
        let _ = self.tx.send(request);
    }

    pub(super) fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Option<T> {
        let (reply_tx, reply_rx) = std::sync::mpsc::sync_channel(1);
        self.send(make(reply_tx));
        reply_rx.recv().ok()
    }

    /// Cache-through evaluation: the objective computation runs on the
    /// calling thread, the hub only answers lookups and stores.
    pub(super) fn evaluate(&self, rule_set: &RuleSet) -> ValuedResult<RuleSet> {
        if let Some(Some(cached)) = self.request(|reply| Request::CacheGet {
            rule_set: rule_set.clone(),
            reply,
        }) {
            return cached;
        }
        let inputs = self.shared.inputs();
        let values = inputs.evaluator().evaluate(rule_set, inputs.records());
        let result = ValuedResult::new(rule_set.clone(), values);
        self.send(Request::CachePut {
            result: result.clone(),
        });
        result
    }

    pub(super) fn make_valid(&self, rule_set: RuleSet) -> RuleSet {
        self.request(|reply| Request::MakeValid {
            rule_set: rule_set.clone(),
            reply,
        })
        .unwrap_or(rule_set)
    }

    pub(super) fn make_valid_and_evaluate(&self, rule_set: &RuleSet) -> ValuedResult<RuleSet> {
        let valid = self.make_valid(rule_set.clone());
        self.evaluate(&valid)
    }

    /// The single publication funnel: simplify, make valid, evaluate,
    /// insert into the archive.
    pub(super) fn simplify_evaluate_and_add(&self, rule_set: &RuleSet) -> ValuedResult<RuleSet> {
        let inputs = self.shared.inputs();
        let simplified = rule_set.simplify(inputs.records());
        let result = self.make_valid_and_evaluate(&simplified);
        self.send(Request::ArchiveAdd {
            result: result.clone(),
        });
        result
    }
}
