//! The mining algorithms and the agent loop driving them.
//!
//! Three candidate producers work against the [`crate::board`]: greedy
//! top-down induction builds brand-new rule sets, local search
//! hill-climbs around a given one, and path relinking walks the edit
//! path between two archive members. [`purge`] compacts the archive
//! when it grows too large. [`MiningAgent`] composes all of them into
//! a cancellable worker loop.

mod agent;
mod greedy;
mod local;
pub(crate) mod purge;
mod relink;

pub use agent::{AgentHandle, MiningAgent};
pub use greedy::{GreedyRuleCreation, RuleQuality, ScoreFunction};
pub use local::LocalSearch;
pub use relink::PathRelinking;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation shared between an agent and its owner.
///
/// Every unbounded algorithm loop checks the flag, so a cancelled
/// agent finishes within the current step.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
