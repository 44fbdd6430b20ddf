//! Parses the textual rule-set form back into values.
//!
//! The grammar is the exact output of the `Display` impls: parse and
//! render are inverses for every value the engine produces.

use std::sync::Arc;

use crate::data::RecordScheme;
use crate::error::MiningError;
use crate::model::{And, Operator, Or, PatternSlot, RulePattern, RuleSet, SimpleRule};

pub const DEFAULT_RULE: &str = "normally use ";
pub const EXCEPT_RULE: &str = "but use ";
pub const EXCEPT_RULE_SUFFIX: &str = " when";

/// Parses rule sets, conjunctions, and rejection patterns against a
/// fixed record scheme.
pub struct RuleSetParser<'a> {
    scheme: &'a RecordScheme,
}

impl<'a> RuleSetParser<'a> {
    pub fn new(scheme: &'a RecordScheme) -> Self {
        Self { scheme }
    }

    /// Parses a full rule set: the `normally use` line followed by
    /// `but use ... when` blocks with one conjunction per line.
    pub fn parse(&self, text: &str) -> Result<RuleSet, MiningError> {
        let text = text.replace("\r\n", "\n");
        let mut lines = text.lines();
        let first = lines.next().unwrap_or("");
        let default_label = first
            .strip_prefix(DEFAULT_RULE)
            .ok_or_else(|| MiningError::Syntax(first.to_string()))?
            .trim();
        let mut ret = RuleSet::create(Arc::from(default_label));

        let mut current: Option<(Arc<str>, Vec<Arc<And>>)> = None;
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.trim().strip_prefix(EXCEPT_RULE) {
                if let Some((label, rules)) = current.take() {
                    ret = ret.add_exception(label, Or::new(rules));
                }
                let label = rest
                    .strip_suffix(EXCEPT_RULE_SUFFIX)
                    .ok_or_else(|| MiningError::Syntax(line.to_string()))?
                    .trim();
                current = Some((Arc::from(label), Vec::new()));
            } else {
                match &mut current {
                    Some((_, rules)) => rules.push(Arc::new(self.parse_rule(line.trim())?)),
                    None => return Err(MiningError::Syntax(line.to_string())),
                }
            }
        }
        if let Some((label, rules)) = current {
            ret = ret.add_exception(label, Or::new(rules));
        }
        Ok(ret)
    }

    /// Parses one parenthesized conjunction, optionally prefixed with
    /// `or `.
    pub fn parse_rule(&self, line: &str) -> Result<And, MiningError> {
        let mut children = Vec::new();
        for part in self.split_at_and(line)? {
            children.push(self.parse_simple_rule(part.trim())?);
        }
        Ok(And::new(children))
    }

    fn split_at_and<'l>(&self, line: &'l str) -> Result<Vec<&'l str>, MiningError> {
        let content = line
            .strip_prefix("or (")
            .or_else(|| line.strip_prefix('('))
            .and_then(|c| c.strip_suffix(')'))
            .ok_or_else(|| MiningError::Syntax(line.to_string()))?;
        if content.is_empty() {
            return Ok(Vec::new());
        }
        // Not safe against " and " inside quoted values; the original
        // format shares this limitation.
        Ok(content.split(" and ").collect())
    }

    pub fn parse_simple_rule(&self, text: &str) -> Result<SimpleRule, MiningError> {
        match text {
            "true" => return Ok(SimpleRule::True),
            "false" => return Ok(SimpleRule::False),
            _ => {}
        }
        let split = text
            .find(|ch: char| !ch.is_alphanumeric() && ch != '.' && ch != '_')
            .ok_or_else(|| MiningError::Syntax(text.to_string()))?;
        let (name, rest) = text.split_at(split);
        let rest = rest.trim();
        let column = self
            .scheme
            .column_by_name(name)
            .ok_or_else(|| MiningError::UnknownColumn(name.to_string()))?;

        if let Some(value) = rest.strip_prefix("<=") {
            Ok(SimpleRule::leq(column, parse_number(value)?))
        } else if let Some(value) = rest.strip_prefix(">=") {
            Ok(SimpleRule::geq(column, parse_number(value)?))
        } else if let Some(value) = rest.strip_prefix("==") {
            Ok(SimpleRule::equals(column, unescape(value)?))
        } else if let Some(value) = rest.strip_prefix("!=") {
            Ok(SimpleRule::not_equals(column, unescape(value)?))
        } else {
            Err(MiningError::Syntax(rest.to_string()))
        }
    }

    /// Parses a rejection pattern: a conjunction whose parts may also
    /// be `column op *` value wildcards or a bare `*`.
    pub fn parse_pattern(&self, text: &str) -> Result<RulePattern, MiningError> {
        let wrapped;
        let line = if text.starts_with('(') {
            text
        } else {
            wrapped = format!("({text})");
            &wrapped
        };
        let mut exact = Vec::new();
        let mut wildcards = Vec::new();
        let mut allow_remaining = false;
        for part in self.split_at_and(line)? {
            let part = part.trim();
            if part == "*" {
                allow_remaining = true;
            } else if let Some(prefix) = part.strip_suffix('*') {
                wildcards.push(self.parse_pattern_slot(prefix.trim())?);
            } else {
                exact.push(self.parse_simple_rule(part)?);
            }
        }
        Ok(RulePattern::new(exact, wildcards, allow_remaining))
    }

    fn parse_pattern_slot(&self, text: &str) -> Result<PatternSlot, MiningError> {
        let (name, op) = [
            ("<=", Operator::Leq),
            (">=", Operator::Geq),
            ("==", Operator::Equals),
            ("!=", Operator::NotEquals),
        ]
        .iter()
        .find_map(|(sym, op)| text.strip_suffix(sym).map(|name| (name.trim(), *op)))
        .ok_or_else(|| MiningError::Syntax(text.to_string()))?;
        let column = self
            .scheme
            .column_by_name(name)
            .ok_or_else(|| MiningError::UnknownColumn(name.to_string()))?;
        Ok(PatternSlot::new(column, op))
    }
}

fn parse_number(text: &str) -> Result<f64, MiningError> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| MiningError::Syntax(text.to_string()))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MiningError::Syntax(text.to_string()))
    }
}

fn unescape(text: &str) -> Result<Arc<str>, MiningError> {
    let inner = text
        .trim()
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .ok_or_else(|| MiningError::Syntax(text.to_string()))?;
    Ok(Arc::from(inner.replace("\\'", "'").replace("\\\\", "\\")))
}
