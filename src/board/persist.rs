//! Saving and loading the whole mining state.
//!
//! The format is line oriented: `######## ` section headers in a
//! fixed order, then one entry per line, except the Pareto front
//! where each rule set spans several lines and is terminated by a
//! `**** ` line carrying its objective vector. Save renders the live
//! state; load replays it through the normal blackboard operations,
//! so a loaded board behaves exactly like one that reached the same
//! state interactively. Save→load→save round-trips byte for byte.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::archive::ValuedResult;
use crate::board::{Blackboard, DataCleaningAction};
use crate::data::RecordSet;
use crate::error::MiningError;
use crate::eval::ObjectiveEvaluator;
use crate::model::RuleSetParser;

const BLOCK_START_PREFIX: &str = "######## ";
const END_OF_RULE_PREFIX: &str = "**** ";

const DATA_CLEANING: &str = "DATA CLEANING";
const REJECTED_COLUMNS: &str = "REJECTED COLUMNS";
const ACCEPTED_RULES: &str = "ACCEPTED RULES";
const CANDIDATE_RULES: &str = "CANDIDATE RULES";
const REJECTED_PATTERNS: &str = "REJECTED PATTERNS";
const PARETO_FRONT: &str = "PARETO FRONT";

enum Section {
    DataCleaning,
    RejectedColumns,
    AcceptedRules,
    CandidateRules,
    RejectedPatterns,
    ParetoFront,
}

impl Blackboard {
    /// Renders the complete mining state in the persisted text format.
    pub fn save_to_string(&self) -> String {
        let Some(state) = self.state_snapshot() else {
            return String::new();
        };
        let mut out = String::new();

        let _ = writeln!(out, "{BLOCK_START_PREFIX}{DATA_CLEANING}");
        for action in &state.cleaning {
            let _ = writeln!(out, "{}", action.serialize());
        }

        let _ = writeln!(out, "{BLOCK_START_PREFIX}{REJECTED_COLUMNS}");
        for column in &state.rejected_columns {
            let _ = writeln!(out, "{column}");
        }

        let _ = writeln!(out, "{BLOCK_START_PREFIX}{ACCEPTED_RULES}");
        for (label, accepted, _, _) in &state.restrictions {
            for rule in accepted {
                let _ = writeln!(out, "{label}: {rule}");
            }
        }

        let _ = writeln!(out, "{BLOCK_START_PREFIX}{CANDIDATE_RULES}");
        for (label, _, candidates, _) in &state.restrictions {
            for rule in candidates {
                let _ = writeln!(out, "{label}: {rule}");
            }
        }

        let _ = writeln!(out, "{BLOCK_START_PREFIX}{REJECTED_PATTERNS}");
        for (label, _, _, patterns) in &state.restrictions {
            for pattern in patterns {
                let _ = writeln!(out, "{label}: {pattern}");
            }
        }

        let _ = writeln!(out, "{BLOCK_START_PREFIX}{PARETO_FRONT}");
        for result in &state.front {
            let _ = write!(out, "{}", result.item());
            let values: Vec<String> = result.values().iter().map(|v| v.to_string()).collect();
            let _ = writeln!(out, "{END_OF_RULE_PREFIX}{}", values.join(", "));
        }

        out
    }

    pub fn save(&self, path: &Path) -> Result<(), MiningError> {
        info!("saving mining state to {}", path.display());
        fs::write(path, self.save_to_string())?;
        Ok(())
    }

    /// Builds a blackboard and replays persisted state into it. Any
    /// malformed line aborts the load.
    pub fn load(
        records: Arc<RecordSet>,
        evaluator: Arc<dyn ObjectiveEvaluator>,
        initial_seed: u64,
        text: &str,
    ) -> Result<Blackboard, MiningError> {
        let board = Blackboard::new(records, evaluator, initial_seed);
        let mut section = None;
        let mut rule_lines: Vec<&str> = Vec::new();

        let text = text.replace("\r\n", "\n");
        for line in text.lines() {
            if let Some(name) = line.strip_prefix(BLOCK_START_PREFIX) {
                section = Some(parse_section(name)?);
                continue;
            }
            let Some(section) = &section else {
                return Err(MiningError::Syntax(line.to_string()));
            };
            match section {
                Section::DataCleaning => {
                    let action = DataCleaningAction::parse(line)?;
                    board.clean_data_replay(action);
                }
                Section::RejectedColumns => {
                    board.reject_columns(vec![Arc::from(line)]);
                }
                Section::AcceptedRules => {
                    let (label, rule) = board.parse_labeled_rule(line)?;
                    board.accept(label, vec![Arc::new(rule)]);
                }
                Section::CandidateRules => {
                    let (label, rule) = board.parse_labeled_rule(line)?;
                    board.keep_as_candidate(label, vec![Arc::new(rule)]);
                }
                Section::RejectedPatterns => {
                    let (label, rest) = split_label(line)?;
                    let records = board.records();
                    let pattern = RuleSetParser::new(records.scheme()).parse_pattern(rest)?;
                    board.reject_pattern(label, pattern);
                }
                Section::ParetoFront => {
                    if let Some(rest) = line.strip_prefix(END_OF_RULE_PREFIX) {
                        let records = board.records();
                        let rule_set = RuleSetParser::new(records.scheme())
                            .parse(&rule_lines.join("\n"))?;
                        rule_lines.clear();
                        let values = parse_objective_vector(rest)?;
                        board.restore(ValuedResult::new(rule_set, values));
                    } else {
                        rule_lines.push(line);
                    }
                }
            }
        }
        if !rule_lines.is_empty() {
            return Err(MiningError::Syntax(rule_lines.join("\n")));
        }

        // Defaults may have been evicted while replaying the front;
        // make sure every class keeps at least one entry.
        board.seed_default_rule_sets();
        Ok(board)
    }

    pub fn load_from_file(
        records: Arc<RecordSet>,
        evaluator: Arc<dyn ObjectiveEvaluator>,
        initial_seed: u64,
        path: &Path,
    ) -> Result<Blackboard, MiningError> {
        let text = fs::read_to_string(path)?;
        let board = Self::load(records, evaluator, initial_seed, &text)?;
        info!("mining state loaded from {}", path.display());
        Ok(board)
    }

    fn parse_labeled_rule(
        &self,
        line: &str,
    ) -> Result<(Arc<str>, crate::model::And), MiningError> {
        let (label, rest) = split_label(line)?;
        let records = self.records();
        let rule = RuleSetParser::new(records.scheme()).parse_rule(rest)?;
        Ok((label, rule))
    }

    fn clean_data_replay(&self, action: DataCleaningAction) {
        let _ = self.clean_data(action);
    }
}

fn split_label(line: &str) -> Result<(Arc<str>, &str), MiningError> {
    line.split_once(": ")
        .map(|(label, rest)| (Arc::from(label), rest))
        .ok_or_else(|| MiningError::Syntax(line.to_string()))
}

fn parse_section(name: &str) -> Result<Section, MiningError> {
    match name {
        DATA_CLEANING => Ok(Section::DataCleaning),
        REJECTED_COLUMNS => Ok(Section::RejectedColumns),
        ACCEPTED_RULES => Ok(Section::AcceptedRules),
        CANDIDATE_RULES => Ok(Section::CandidateRules),
        REJECTED_PATTERNS => Ok(Section::RejectedPatterns),
        PARETO_FRONT => Ok(Section::ParetoFront),
        _ => Err(MiningError::UnknownSection(name.to_string())),
    }
}

fn parse_objective_vector(text: &str) -> Result<Vec<f64>, MiningError> {
    text.split(',')
        .map(|part| {
            part.trim()
                .parse()
                .map_err(|_| MiningError::InvalidObjectiveVector(text.to_string()))
        })
        .collect()
}
