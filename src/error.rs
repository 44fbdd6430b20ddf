//! Error taxonomy.
//!
//! Only genuinely fatal conditions are errors: malformed persisted
//! state and I/O failures while reading or writing it. Restriction
//! violations are silently repaired by the blackboard, search
//! dead-ends are `None`/empty results, and cancellation is a clean
//! early return.

use thiserror::Error;

/// Errors raised while loading or saving persisted mining state.
///
/// Loading is all-or-nothing: the first malformed line aborts with a
/// descriptive error, there is no best-effort partial load.
#[derive(Debug, Error)]
pub enum MiningError {
    /// A rule, pattern, or rule-set line could not be parsed.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A column name referenced in persisted state does not exist in
    /// the current record scheme.
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// A `######## ...` header names a section this engine does not know.
    #[error("invalid block name: {0}")]
    UnknownSection(String),

    /// A data-cleaning log line names an unknown action.
    #[error("unknown cleaning action: {0}")]
    UnknownCleaningAction(String),

    /// The `**** ` terminator of a Pareto-front entry carried a value
    /// that is not a number.
    #[error("invalid objective vector: {0}")]
    InvalidObjectiveVector(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
