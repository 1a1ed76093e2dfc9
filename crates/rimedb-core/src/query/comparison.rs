use crate::value::Value;
use derive_more::IsVariant;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// TextMode
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TextMode {
    ContainsAll,
    ContainsAny,
    ContainsPhrase,
}

///
/// TextComparison
///
/// Opaque token match delegated to a text index. The planner never
/// interprets tokens; it only routes the comparison to a text scan.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TextComparison {
    pub tokens: Vec<String>,
    pub mode: TextMode,
}

///
/// Comparison
///
/// Leaf operand of a query predicate.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Comparison {
    Equals(Value),
    NotEquals(Value),
    LessThan(Value),
    LessThanOrEquals(Value),
    GreaterThan(Value),
    GreaterThanOrEquals(Value),
    StartsWith(Value),
    In(Vec<Value>),
    IsNull,
    NotNull,
    /// Equality against an outer-bound parameter (IN-join inner scans).
    Parameter(String),
    Text(TextComparison),
}

///
/// ComparisonCategory
/// Scan-construction classification.
///

#[derive(Clone, Copy, Debug, Eq, IsVariant, PartialEq)]
pub enum ComparisonCategory {
    /// Binds one column exactly; further columns stay sargable.
    Equality,
    /// Terminates the sarged prefix with a range.
    Inequality,
    /// Only a text index can satisfy it.
    Text,
    /// Never sargable; stays residual (or is rewritten upstream, e.g. IN).
    Other,
}

impl Comparison {
    #[must_use]
    pub const fn category(&self) -> ComparisonCategory {
        match self {
            Self::Equals(_) | Self::IsNull | Self::Parameter(_) => ComparisonCategory::Equality,
            Self::LessThan(_)
            | Self::LessThanOrEquals(_)
            | Self::GreaterThan(_)
            | Self::GreaterThanOrEquals(_)
            | Self::StartsWith(_)
            | Self::NotNull => ComparisonCategory::Inequality,
            Self::Text(_) => ComparisonCategory::Text,
            Self::NotEquals(_) | Self::In(_) => ComparisonCategory::Other,
        }
    }

    /// Direct complement, for pushing NOT into a leaf. Comparisons without
    /// a complement leave the NOT residual.
    #[must_use]
    pub fn complement(&self) -> Option<Self> {
        match self {
            Self::Equals(value) => Some(Self::NotEquals(value.clone())),
            Self::NotEquals(value) => Some(Self::Equals(value.clone())),
            Self::LessThan(value) => Some(Self::GreaterThanOrEquals(value.clone())),
            Self::LessThanOrEquals(value) => Some(Self::GreaterThan(value.clone())),
            Self::GreaterThan(value) => Some(Self::LessThanOrEquals(value.clone())),
            Self::GreaterThanOrEquals(value) => Some(Self::LessThan(value.clone())),
            Self::IsNull => Some(Self::NotNull),
            Self::NotNull => Some(Self::IsNull),
            Self::StartsWith(_) | Self::In(_) | Self::Parameter(_) | Self::Text(_) => None,
        }
    }
}

impl fmt::Display for TextComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            TextMode::ContainsAll => "all",
            TextMode::ContainsAny => "any",
            TextMode::ContainsPhrase => "phrase",
        };
        write!(f, "TEXT({mode}: {})", self.tokens.join(" "))
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(value) => write!(f, "EQ {value}"),
            Self::NotEquals(value) => write!(f, "NE {value}"),
            Self::LessThan(value) => write!(f, "< {value}"),
            Self::LessThanOrEquals(value) => write!(f, "<= {value}"),
            Self::GreaterThan(value) => write!(f, "> {value}"),
            Self::GreaterThanOrEquals(value) => write!(f, ">= {value}"),
            Self::StartsWith(value) => write!(f, "STARTS_WITH {value}"),
            Self::In(values) => {
                write!(f, "IN [")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Self::IsNull => write!(f, "IS NULL"),
            Self::NotNull => write!(f, "NOT NULL"),
            Self::Parameter(name) => write!(f, "EQ ${name}"),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complement_round_trips_where_defined() {
        let cases = [
            Comparison::Equals(Value::Int(1)),
            Comparison::LessThan(Value::Int(1)),
            Comparison::GreaterThanOrEquals(Value::Int(1)),
            Comparison::IsNull,
        ];

        for comparison in cases {
            let complement = comparison.complement().expect("complement defined");
            assert_eq!(complement.complement(), Some(comparison));
        }
    }

    #[test]
    fn text_and_in_have_no_complement() {
        assert_eq!(Comparison::In(vec![Value::Int(1)]).complement(), None);
        assert_eq!(
            Comparison::Text(TextComparison {
                tokens: vec!["a".to_string()],
                mode: TextMode::ContainsAll,
            })
            .complement(),
            None
        );
    }

    #[test]
    fn categories_follow_scan_semantics() {
        assert!(Comparison::Equals(Value::Int(1)).category().is_equality());
        assert!(
            Comparison::Parameter("p".to_string())
                .category()
                .is_equality()
        );
        assert!(
            Comparison::GreaterThan(Value::Int(1))
                .category()
                .is_inequality()
        );
        assert!(Comparison::NotEquals(Value::Int(1)).category().is_other());
        assert!(Comparison::In(vec![]).category().is_other());
    }
}
