//! Interactive multi-objective rule mining.
//!
//! Mines rule-based classifiers (a default label plus an ordered list
//! of exceptions) from tabular data and keeps every solution found on
//! a Pareto front over per-class misclassification counts, complexity
//! and feature count. The pieces:
//!
//! - **Model** ([`model`]): immutable rules, rule sets and rejected
//!   patterns, with a parser for their textual form.
//! - **Data** ([`data`]): records, column schemes and precomputed
//!   split points.
//! - **Archive** ([`archive`]): the non-dominated result store and the
//!   target functions projecting objective vectors to scalars.
//! - **Blackboard** ([`board`]): the shared coordination hub owning
//!   the evaluation cache, the Pareto front, the work queues and the
//!   user's rule restrictions, plus saving and loading of the whole
//!   session state.
//! - **Search** ([`search`]): greedy rule creation, local search,
//!   path relinking and the autonomous agent scheduling them.
//!
//! # Architecture
//!
//! All mutable coordination state lives on a single hub thread;
//! [`board::Blackboard`] handles talk to it over channels and can be
//! cloned freely across agent threads. Rule sets themselves are
//! immutable and share structure, so publishing and copying them is
//! cheap.

pub mod archive;
pub mod board;
pub mod data;
pub mod error;
pub mod eval;
pub mod model;
pub mod search;

pub use archive::{NavigationLimits, NondominatedResults, TargetFunction, ValuedResult};
pub use board::Blackboard;
pub use data::{Record, RecordScheme, RecordSet};
pub use error::MiningError;
pub use eval::{ObjectiveEvaluator, StandardObjectives};
pub use model::{And, Or, RuleSet, RuleSetParser, SimpleRule};
pub use search::{AgentHandle, MiningAgent};
