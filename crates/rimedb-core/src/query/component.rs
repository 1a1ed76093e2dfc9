//! Boolean predicate tree.
//!
//! Pure, schema-agnostic representation of query filters. This layer
//! contains no index logic or execution semantics; interpretation happens
//! in normalization and planning.

use crate::key::{FanType, KeyExpression};
use crate::query::comparison::Comparison;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// QueryRecordFunction
/// Record-level functions usable in comparisons (rank and version space).
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum QueryRecordFunction {
    /// Rank of the record within the given grouping key.
    Rank(KeyExpression),
    /// The record's commit version.
    Version,
}

///
/// QueryComponent
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum QueryComponent {
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    /// A scalar field satisfies the comparison.
    Field {
        field: String,
        comparison: Comparison,
    },
    /// Any element of the repeated field satisfies the comparison.
    OneOfThem {
        field: String,
        comparison: Comparison,
    },
    /// Descend into a submessage field.
    Nested { parent: String, child: Box<Self> },
    /// Any element of the repeated submessage satisfies the child.
    OneOfThemWithComponent { parent: String, child: Box<Self> },
    /// Comparison against the synthetic record-type column.
    RecordTypeKey(Comparison),
    /// Comparison against an arbitrary key expression.
    KeyWithComparison {
        key: KeyExpression,
        comparison: Comparison,
    },
    /// Comparison against a record function (rank, version).
    RecordFunction {
        function: QueryRecordFunction,
        comparison: Comparison,
    },
}

impl QueryComponent {
    /// AND of children; flattens nested ANDs and collapses singletons.
    #[must_use]
    pub fn and(children: Vec<Self>) -> Self {
        let mut out = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Self::And(grandchildren) => out.extend(grandchildren),
                other => out.push(other),
            }
        }

        if out.len() == 1 {
            return out.remove(0);
        }
        Self::And(out)
    }

    /// OR of children; flattens nested ORs and collapses singletons.
    /// Child order is preserved (union plans keep source order).
    #[must_use]
    pub fn or(children: Vec<Self>) -> Self {
        let mut out = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Self::Or(grandchildren) => out.extend(grandchildren),
                other => out.push(other),
            }
        }

        if out.len() == 1 {
            return out.remove(0);
        }
        Self::Or(out)
    }

    #[must_use]
    pub fn not(child: Self) -> Self {
        Self::Not(Box::new(child))
    }

    pub fn field(field: impl Into<String>, comparison: Comparison) -> Self {
        Self::Field {
            field: field.into(),
            comparison,
        }
    }

    pub fn one_of_them(field: impl Into<String>, comparison: Comparison) -> Self {
        Self::OneOfThem {
            field: field.into(),
            comparison,
        }
    }

    pub fn nested(parent: impl Into<String>, child: Self) -> Self {
        Self::Nested {
            parent: parent.into(),
            child: Box::new(child),
        }
    }

    pub fn one_of_them_with(parent: impl Into<String>, child: Self) -> Self {
        Self::OneOfThemWithComponent {
            parent: parent.into(),
            child: Box::new(child),
        }
    }

    /// The comparison at this leaf, descending through nesting wrappers.
    #[must_use]
    pub fn comparison(&self) -> Option<&Comparison> {
        match self {
            Self::Field { comparison, .. }
            | Self::OneOfThem { comparison, .. }
            | Self::RecordTypeKey(comparison)
            | Self::KeyWithComparison { comparison, .. }
            | Self::RecordFunction { comparison, .. } => Some(comparison),
            Self::Nested { child, .. } | Self::OneOfThemWithComponent { child, .. } => {
                child.comparison()
            }
            Self::And(_) | Self::Or(_) | Self::Not(_) => None,
        }
    }

    /// The single key column this leaf constrains, when it has one.
    ///
    /// This is the compatibility surface of the column matcher: a leaf
    /// matches an index column iff this expression equals that column.
    #[must_use]
    pub fn constrained_column(&self) -> Option<KeyExpression> {
        match self {
            Self::Field { field, .. } => Some(KeyExpression::Field {
                name: field.clone(),
                fan: FanType::None,
            }),
            Self::OneOfThem { field, .. } => Some(KeyExpression::Field {
                name: field.clone(),
                fan: FanType::FanOut,
            }),
            Self::Nested { parent, child } => {
                child.constrained_column().map(|column| KeyExpression::Nesting {
                    parent: parent.clone(),
                    fan: FanType::None,
                    child: Box::new(column),
                })
            }
            Self::OneOfThemWithComponent { parent, child } => {
                child.constrained_column().map(|column| KeyExpression::Nesting {
                    parent: parent.clone(),
                    fan: FanType::FanOut,
                    child: Box::new(column),
                })
            }
            Self::RecordTypeKey(_) => Some(KeyExpression::RecordTypeKey),
            Self::KeyWithComparison { key, .. } => Some(key.clone()),
            Self::RecordFunction { function, .. } => match function {
                QueryRecordFunction::Version => Some(KeyExpression::Version),
                QueryRecordFunction::Rank(_) => None,
            },
            Self::And(_) | Self::Or(_) | Self::Not(_) => None,
        }
    }

    /// True when this predicate can be evaluated on an index entry whose
    /// visible columns are `entry_columns`, without fetching the record.
    #[must_use]
    pub fn is_evaluable_on_entry(&self, entry_columns: &[KeyExpression]) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children
                .iter()
                .all(|child| child.is_evaluable_on_entry(entry_columns)),
            Self::Not(child) => child.is_evaluable_on_entry(entry_columns),
            leaf => match leaf.comparison() {
                // Text needs the token structure, not the entry value.
                Some(Comparison::Text(_)) => false,
                Some(_) => leaf
                    .constrained_column()
                    .is_some_and(|column| entry_columns.contains(&column)),
                None => false,
            },
        }
    }
}

impl fmt::Display for QueryComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(children) => write_joined(f, "And(", children, ")"),
            Self::Or(children) => write_joined(f, "Or(", children, ")"),
            Self::Not(child) => write!(f, "Not({child})"),
            Self::Field { field, comparison } => write!(f, "{field} {comparison}"),
            Self::OneOfThem { field, comparison } => write!(f, "one_of({field}) {comparison}"),
            Self::Nested { parent, child } => write!(f, "{parent}.{{{child}}}"),
            Self::OneOfThemWithComponent { parent, child } => {
                write!(f, "one_of({parent}).{{{child}}}")
            }
            Self::RecordTypeKey(comparison) => write!(f, "record_type {comparison}"),
            Self::KeyWithComparison { key, comparison } => write!(f, "{key} {comparison}"),
            Self::RecordFunction {
                function,
                comparison,
            } => match function {
                QueryRecordFunction::Rank(grouping) => {
                    write!(f, "rank({grouping}) {comparison}")
                }
                QueryRecordFunction::Version => write!(f, "version() {comparison}"),
            },
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    children: &[QueryComponent],
    close: &str,
) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{child}")?;
    }
    write!(f, "{close}")
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn eq(field: &str, n: i64) -> QueryComponent {
        QueryComponent::field(field, Comparison::Equals(Value::Int(n)))
    }

    #[test]
    fn and_flattens_and_collapses_singletons() {
        let flat = QueryComponent::and(vec![
            eq("a", 1),
            QueryComponent::and(vec![eq("b", 2), eq("c", 3)]),
        ]);
        assert_eq!(
            flat,
            QueryComponent::And(vec![eq("a", 1), eq("b", 2), eq("c", 3)])
        );

        assert_eq!(QueryComponent::and(vec![eq("a", 1)]), eq("a", 1));
    }

    #[test]
    fn constrained_column_mirrors_key_shapes() {
        assert_eq!(
            eq("a", 1).constrained_column(),
            Some(KeyExpression::field("a"))
        );
        assert_eq!(
            QueryComponent::one_of_them("tags", Comparison::Equals(Value::Int(1)))
                .constrained_column(),
            Some(KeyExpression::fan_out("tags"))
        );
        assert_eq!(
            QueryComponent::nested("address", eq("city", 1)).constrained_column(),
            Some(KeyExpression::nest("address", KeyExpression::field("city")))
        );
        assert_eq!(
            QueryComponent::RecordTypeKey(Comparison::Equals(Value::from("A")))
                .constrained_column(),
            Some(KeyExpression::RecordTypeKey)
        );
    }

    #[test]
    fn evaluability_requires_visible_columns() {
        let entry = vec![KeyExpression::field("a"), KeyExpression::field("b")];

        assert!(eq("a", 1).is_evaluable_on_entry(&entry));
        assert!(
            QueryComponent::and(vec![eq("a", 1), eq("b", 2)]).is_evaluable_on_entry(&entry)
        );
        assert!(!eq("c", 3).is_evaluable_on_entry(&entry));
        assert!(
            !QueryComponent::RecordFunction {
                function: QueryRecordFunction::Version,
                comparison: Comparison::Equals(Value::Version(7)),
            }
            .is_evaluable_on_entry(&entry)
        );
    }
}
