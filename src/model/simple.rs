//! Atomic rule literals.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::data::{Column, Record, RecordSet};
use crate::model::FeatureMultiset;

/// The comparison operator of a literal, used when matching rule
/// patterns against literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Leq,
    Geq,
    Equals,
    NotEquals,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Leq => write!(f, "<="),
            Operator::Geq => write!(f, ">="),
            Operator::Equals => write!(f, "=="),
            Operator::NotEquals => write!(f, "!="),
        }
    }
}

/// An atomic condition on a single column, or a constant.
///
/// Ordinal thresholds are always finite. A record with a NaN ordinal
/// value satisfies neither `Leq` nor `Geq` on that column; a record
/// with a missing nominal value satisfies neither `Equals` nor
/// `NotEquals`.
///
/// Identity is the (column, operator, value) triple. The derived
/// ordering sorts constants first, then by column name, operator, and
/// value, which gives conjunctions their canonical child order.
#[derive(Debug, Clone)]
pub enum SimpleRule {
    True,
    False,
    Leq { column: Column, value: f64 },
    Geq { column: Column, value: f64 },
    Equals { column: Column, value: Arc<str> },
    NotEquals { column: Column, value: Arc<str> },
}

impl SimpleRule {
    /// `column <= value`. Panics on a non-finite threshold.
    pub fn leq(column: Column, value: f64) -> Self {
        assert!(value.is_finite(), "threshold must be finite");
        SimpleRule::Leq { column, value }
    }

    /// `column >= value`. Panics on a non-finite threshold.
    pub fn geq(column: Column, value: f64) -> Self {
        assert!(value.is_finite(), "threshold must be finite");
        SimpleRule::Geq { column, value }
    }

    pub fn equals(column: Column, value: Arc<str>) -> Self {
        SimpleRule::Equals { column, value }
    }

    pub fn not_equals(column: Column, value: Arc<str>) -> Self {
        SimpleRule::NotEquals { column, value }
    }

    pub fn test(&self, record: &Record) -> bool {
        match self {
            SimpleRule::True => true,
            SimpleRule::False => false,
            SimpleRule::Leq { column, value } => {
                record.ordinal_value(column.typed_index()) <= *value
            }
            SimpleRule::Geq { column, value } => {
                record.ordinal_value(column.typed_index()) >= *value
            }
            SimpleRule::Equals { column, value } => record
                .nominal_value(column.typed_index())
                .is_some_and(|v| v == value),
            SimpleRule::NotEquals { column, value } => record
                .nominal_value(column.typed_index())
                .is_some_and(|v| v != value),
        }
    }

    pub fn column(&self) -> Option<&Column> {
        match self {
            SimpleRule::True | SimpleRule::False => None,
            SimpleRule::Leq { column, .. }
            | SimpleRule::Geq { column, .. }
            | SimpleRule::Equals { column, .. }
            | SimpleRule::NotEquals { column, .. } => Some(column),
        }
    }

    pub fn operator(&self) -> Option<Operator> {
        match self {
            SimpleRule::True | SimpleRule::False => None,
            SimpleRule::Leq { .. } => Some(Operator::Leq),
            SimpleRule::Geq { .. } => Some(Operator::Geq),
            SimpleRule::Equals { .. } => Some(Operator::Equals),
            SimpleRule::NotEquals { .. } => Some(Operator::NotEquals),
        }
    }

    pub fn used_features(&self) -> FeatureMultiset {
        match self.column() {
            None => FeatureMultiset::new(),
            Some(c) => FeatureMultiset::singleton(Arc::clone(c.name())),
        }
    }

    /// Constants cost nothing, every real literal costs one.
    pub fn complexity(&self) -> u64 {
        match self {
            SimpleRule::True | SimpleRule::False => 0,
            _ => 1,
        }
    }

    /// Moves an ordinal threshold one split point up. Relaxing past
    /// the last split point degenerates to a constant: `Leq` becomes
    /// always-true, `Geq` always-false. Nominal literals and constants
    /// return `None`.
    pub fn next_larger_value(&self, data: &RecordSet) -> Option<SimpleRule> {
        match self {
            SimpleRule::Leq { column, value } => {
                Some(match data.split_point_above(column.typed_index(), *value) {
                    Some(next) => SimpleRule::leq(column.clone(), next),
                    None => SimpleRule::True,
                })
            }
            SimpleRule::Geq { column, value } => {
                Some(match data.split_point_above(column.typed_index(), *value) {
                    Some(next) => SimpleRule::geq(column.clone(), next),
                    None => SimpleRule::False,
                })
            }
            _ => None,
        }
    }

    /// Moves an ordinal threshold one split point down; the mirror of
    /// [`Self::next_larger_value`].
    pub fn next_smaller_value(&self, data: &RecordSet) -> Option<SimpleRule> {
        match self {
            SimpleRule::Leq { column, value } => {
                Some(match data.split_point_below(column.typed_index(), *value) {
                    Some(next) => SimpleRule::leq(column.clone(), next),
                    None => SimpleRule::False,
                })
            }
            SimpleRule::Geq { column, value } => {
                Some(match data.split_point_below(column.typed_index(), *value) {
                    Some(next) => SimpleRule::geq(column.clone(), next),
                    None => SimpleRule::True,
                })
            }
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SimpleRule::True => 0,
            SimpleRule::False => 1,
            SimpleRule::Leq { .. } => 2,
            SimpleRule::Geq { .. } => 3,
            SimpleRule::Equals { .. } => 4,
            SimpleRule::NotEquals { .. } => 5,
        }
    }
}

impl PartialEq for SimpleRule {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimpleRule {}

impl Hash for SimpleRule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            SimpleRule::True | SimpleRule::False => {}
            SimpleRule::Leq { column, value } | SimpleRule::Geq { column, value } => {
                column.hash(state);
                value.to_bits().hash(state);
            }
            SimpleRule::Equals { column, value } | SimpleRule::NotEquals { column, value } => {
                column.hash(state);
                value.hash(state);
            }
        }
    }
}

impl PartialOrd for SimpleRule {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimpleRule {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_column = match (self.column(), other.column()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        };
        by_column
            .then_with(|| self.rank().cmp(&other.rank()))
            .then_with(|| match (self, other) {
                (
                    SimpleRule::Leq { value: a, .. } | SimpleRule::Geq { value: a, .. },
                    SimpleRule::Leq { value: b, .. } | SimpleRule::Geq { value: b, .. },
                ) => a.total_cmp(b),
                (
                    SimpleRule::Equals { value: a, .. } | SimpleRule::NotEquals { value: a, .. },
                    SimpleRule::Equals { value: b, .. } | SimpleRule::NotEquals { value: b, .. },
                ) => a.cmp(b),
                _ => Ordering::Equal,
            })
    }
}

/// Escapes backslashes and single quotes for the quoted nominal-value
/// syntax.
pub(crate) fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

impl fmt::Display for SimpleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimpleRule::True => write!(f, "true"),
            SimpleRule::False => write!(f, "false"),
            SimpleRule::Leq { column, value } => write!(f, "{column}<={value}"),
            SimpleRule::Geq { column, value } => write!(f, "{column}>={value}"),
            SimpleRule::Equals { column, value } => {
                write!(f, "{column} == '{}'", escape_value(value))
            }
            SimpleRule::NotEquals { column, value } => {
                write!(f, "{column} != '{}'", escape_value(value))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RecordScheme;

    fn scheme() -> RecordScheme {
        RecordScheme::new(vec![Arc::from("size")], vec![Arc::from("color")])
    }

    fn record(size: f64, color: Option<&str>) -> Record {
        Record::new(0, vec![size], vec![color.map(Arc::from)], Arc::from("a"))
    }

    #[test]
    fn ordinal_literals_match_thresholds() {
        let s = scheme();
        let leq = SimpleRule::leq(s.column(0), 2.5);
        assert!(leq.test(&record(2.5, None)));
        assert!(!leq.test(&record(2.6, None)));
        let geq = SimpleRule::geq(s.column(0), 2.5);
        assert!(geq.test(&record(2.5, None)));
        assert!(!geq.test(&record(2.4, None)));
    }

    #[test]
    fn nan_fails_both_comparison_directions() {
        let s = scheme();
        assert!(!SimpleRule::leq(s.column(0), 2.5).test(&record(f64::NAN, None)));
        assert!(!SimpleRule::geq(s.column(0), 2.5).test(&record(f64::NAN, None)));
    }

    #[test]
    fn missing_nominal_value_fails_both_directions() {
        let s = scheme();
        let eq = SimpleRule::equals(s.column(1), Arc::from("red"));
        let ne = SimpleRule::not_equals(s.column(1), Arc::from("red"));
        assert!(!eq.test(&record(0.0, None)));
        assert!(!ne.test(&record(0.0, None)));
        assert!(eq.test(&record(0.0, Some("red"))));
        assert!(!ne.test(&record(0.0, Some("red"))));
        assert!(ne.test(&record(0.0, Some("blue"))));
    }

    #[test]
    #[should_panic(expected = "finite")]
    fn infinite_threshold_is_rejected() {
        SimpleRule::leq(scheme().column(0), f64::INFINITY);
    }

    #[test]
    fn identity_is_column_operator_value() {
        let s = scheme();
        assert_eq!(SimpleRule::leq(s.column(0), 1.0), SimpleRule::leq(s.column(0), 1.0));
        assert_ne!(SimpleRule::leq(s.column(0), 1.0), SimpleRule::leq(s.column(0), 2.0));
        assert_ne!(SimpleRule::leq(s.column(0), 1.0), SimpleRule::geq(s.column(0), 1.0));
    }

    #[test]
    fn canonical_order_is_constants_then_column_operator_value() {
        let s = scheme();
        let mut rules = vec![
            SimpleRule::not_equals(s.column(1), Arc::from("red")),
            SimpleRule::geq(s.column(0), 1.0),
            SimpleRule::leq(s.column(0), 2.0),
            SimpleRule::leq(s.column(0), 1.0),
            SimpleRule::True,
        ];
        rules.sort();
        let rendered: Vec<String> = rules.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            rendered,
            ["true", "color != 'red'", "size<=1", "size<=2", "size>=1"]
        );
    }

    #[test]
    fn threshold_nudging_walks_split_points() {
        let s = Arc::new(scheme());
        let records = vec![
            Record::new(0, vec![1.0], vec![None], Arc::from("a")),
            Record::new(1, vec![2.0], vec![None], Arc::from("b")),
            Record::new(2, vec![3.0], vec![None], Arc::from("a")),
        ];
        let data = RecordSet::new(Arc::clone(&s), records);
        let r = SimpleRule::leq(s.column(0), 1.5);
        assert_eq!(
            r.next_larger_value(&data),
            Some(SimpleRule::leq(s.column(0), 2.5))
        );
        assert_eq!(r.next_smaller_value(&data), Some(SimpleRule::False));
        let r = SimpleRule::geq(s.column(0), 2.5);
        assert_eq!(r.next_larger_value(&data), Some(SimpleRule::False));
        assert_eq!(
            r.next_smaller_value(&data),
            Some(SimpleRule::geq(s.column(0), 1.5))
        );
    }

    #[test]
    fn display_quotes_and_escapes_nominal_values() {
        let s = scheme();
        let r = SimpleRule::equals(s.column(1), Arc::from("it's\\odd"));
        assert_eq!(r.to_string(), r"color == 'it\'s\\odd'");
    }
}
