//! The autonomous mining agent.
//!
//! Each agent owns its own rng and drives one loop: drain the work
//! queues in priority order, and when they are empty pick a random
//! strategy. User-fed queues always win over agent-fed ones so that
//! solutions a user asked to improve are handled first.

use std::thread;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info};

use crate::archive::{NondominatedResults, ValuedResult};
use crate::board::{Blackboard, QueueKind};
use crate::model::RuleSet;
use crate::search::greedy::GreedyRuleCreation;
use crate::search::local::LocalSearch;
use crate::search::relink::PathRelinking;
use crate::search::CancelFlag;

/// Number of initial iterations spent only on rule creation, so the
/// archive has diverse material before improvement strategies start.
const START_PHASE_SIZE: u64 = 5;

pub struct MiningAgent {
    board: Blackboard,
    greedy: GreedyRuleCreation,
    local: LocalSearch,
    relink: PathRelinking,
    rng: StdRng,
    iteration: u64,
    create_count: usize,
    cancel: CancelFlag,
}

impl MiningAgent {
    pub fn new(board: Blackboard) -> Self {
        let rng = board.create_rng();
        Self {
            greedy: GreedyRuleCreation::new(board.clone()),
            local: LocalSearch::new(board.clone()),
            relink: PathRelinking::new(board.clone()),
            board,
            rng,
            iteration: 0,
            create_count: 0,
            cancel: CancelFlag::new(),
        }
    }

    /// A flag shared with everything this agent starts; cancelling it
    /// makes [`MiningAgent::run`] return after the current iteration.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Spawns the agent on its own thread.
    pub fn spawn(board: Blackboard) -> std::io::Result<AgentHandle> {
        let agent = MiningAgent::new(board);
        let cancel = agent.cancel_flag();
        let join = thread::Builder::new()
            .name("mining-agent".into())
            .spawn(move || agent.run())?;
        Ok(AgentHandle { cancel, join })
    }

    pub fn run(mut self) {
        info!("mining agent started");
        while !self.cancel.is_cancelled() {
            self.perform_iteration();
        }
        info!(iterations = self.iteration, "mining agent stopped");
    }

    /// One scheduling round: queued work first, then a random
    /// strategy.
    pub fn perform_iteration(&mut self) {
        self.iteration += 1;
        if self.iteration <= START_PHASE_SIZE {
            self.create_new(false);
            return;
        }
        if let Some(result) = self.board.poll(QueueKind::UserPathRelinking) {
            self.relink.perform_with(&mut self.rng, &result);
            return;
        }
        if let Some(result) = self.board.poll(QueueKind::UserLocalSearch) {
            self.local_search_round(&result, QueueKind::UserPathRelinking);
            return;
        }
        if let Some(result) = self.board.poll(QueueKind::AgentLocalSearch) {
            self.local_search_round(&result, QueueKind::AgentPathRelinking);
            return;
        }
        if let Some(result) = self.board.poll(QueueKind::AgentPathRelinking) {
            self.relink.perform_with(&mut self.rng, &result);
            return;
        }
        match self.rng.random_range(0..10) {
            0..=2 => {
                if let Some(result) = self.board.random_result(&mut self.rng) {
                    self.relink.perform_with(&mut self.rng, &result);
                }
            }
            3..=5 => {
                if let Some(result) = self.board.random_result(&mut self.rng) {
                    let target = self.board.current_target_function();
                    let front =
                        self.local
                            .optimize(&mut self.rng, &result, &target, &self.cancel);
                    self.board.add_all(&front);
                }
            }
            6..=8 => self.create_new(false),
            _ => self.create_new(true),
        }
    }

    /// Optimizes the queued solution, once combined with the current
    /// best and once on its own, and feeds the outcome to the matching
    /// path-relinking queue.
    fn local_search_round(&mut self, result: &ValuedResult<RuleSet>, next: QueueKind) {
        let target = self.board.current_target_function();
        let mut front = NondominatedResults::new();
        if let Some(best) = self.board.best_result_in_limits(&mut self.rng) {
            let combined = result.item().add_all(best.item());
            let combined = self.board.simplify_evaluate_and_add(&combined);
            front.add_all(&self.local.optimize(
                &mut self.rng,
                &combined,
                &target,
                &self.cancel,
            ));
        }
        front.add_all(
            &self
                .local
                .optimize(&mut self.rng, result, &target, &self.cancel),
        );
        self.board.add_all(&front);
        if let Some(best) = front.best_item(&mut self.rng, &target) {
            self.board.enqueue(next, best);
        }
        if let Some(random) = front.random_item(&mut self.rng) {
            self.board.enqueue(next, random);
        }
    }

    /// Creates a fresh rule set, optionally on top of the current
    /// best, and queues it for local search.
    fn create_new(&mut self, from_best: bool) {
        let limit = self.create_count + 5;
        self.create_count += 1;
        let basis = if from_best {
            self.board
                .best_result_in_limits(&mut self.rng)
                .map(|r| r.item().clone())
        } else {
            None
        };
        let rule_set = self
            .greedy
            .create_rule_set(&mut self.rng, limit, basis, &self.cancel);
        let evaluated = self.board.simplify_evaluate_and_add(&rule_set);
        debug!(
            complexity = evaluated.item().complexity(),
            "created new rule set"
        );
        self.board.enqueue(QueueKind::AgentLocalSearch, evaluated);
    }
}

/// Owner handle of a spawned agent thread.
pub struct AgentHandle {
    cancel: CancelFlag,
    join: thread::JoinHandle<()>,
}

impl AgentHandle {
    /// Cancels the agent and waits for its thread to finish.
    pub fn stop(self) {
        self.cancel.cancel();
        let _ = self.join.join();
    }
}
