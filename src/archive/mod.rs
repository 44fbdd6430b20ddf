//! The Pareto archive and its navigation helpers.
//!
//! Every candidate classifier is scored on a vector of objectives
//! that are all minimized. [`ValuedResult`] pairs an item with its
//! vector, [`NondominatedResults`] keeps the non-dominated ones,
//! [`TargetFunction`] projects a vector to a single navigable number,
//! and [`NavigationLimits`] carries the user's per-target upper
//! bounds.

mod front;
mod target;
mod valued;

pub use front::NondominatedResults;
pub use target::{NavigationLimits, TargetFunction};
pub use valued::ValuedResult;
