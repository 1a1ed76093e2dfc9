//! Key-expression algebra.
//!
//! A [`KeyExpression`] describes how index entries (and primary keys) are
//! built from a record: which fields, in which order, with which fan-out
//! behavior for repeated fields. The planner never evaluates keys against
//! records; it only reasons about their column structure.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

///
/// FanType
///
/// How a repeated field contributes to key construction.
/// `Concatenate` collapses the whole list into one column and is therefore
/// never sortable; `FanOut` emits one entry per element and is the only
/// source of duplicate records out of a scan.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FanType {
    None,
    FanOut,
    Concatenate,
}

///
/// KeyExpression
///
/// Tree of key-building primitives.
///
/// Structural invariants (enforced by constructors, checked by `validate`):
/// - `Then` never directly nests a `Then`; builds flatten.
/// - `Grouping` appears only as the top expression of an index key.
/// - `KeyWithValue.value_split` and `Grouping.grouped_count` stay within the
///   column count of the wrapped key.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum KeyExpression {
    /// A top-level field of the record.
    Field { name: String, fan: FanType },
    /// Descend into a submessage field and apply `child` there.
    Nesting {
        parent: String,
        fan: FanType,
        child: Box<KeyExpression>,
    },
    /// Ordered concatenation of child keys.
    Then(Vec<KeyExpression>),
    /// The first `grouped_count` columns are a group prefix; the remainder
    /// is the grouped value (rank and aggregate indexes).
    Grouping {
        whole: Box<KeyExpression>,
        grouped_count: usize,
    },
    /// Only the first `value_split` columns are indexed; the suffix is
    /// stored on the entry instead.
    KeyWithValue {
        key: Box<KeyExpression>,
        value_split: usize,
    },
    /// Synthetic leading column carrying the record-type id.
    RecordTypeKey,
    /// The record's commit version.
    Version,
    /// Matches nothing.
    Empty,
}

///
/// KeyExpressionError
/// Static invariant violations in key or sort expressions.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum KeyExpressionError {
    #[error("Then may not directly nest a Then")]
    NestedThen,

    #[error("Grouping is only valid as a top-level index expression")]
    GroupingNotTopLevel,

    #[error("grouped count {grouped_count} must be less than column count {column_count}")]
    GroupedCountOutOfRange {
        grouped_count: usize,
        column_count: usize,
    },

    #[error("value split {value_split} exceeds column count {column_count}")]
    ValueSplitOutOfRange {
        value_split: usize,
        column_count: usize,
    },

    #[error("key '{key}' contains a concatenated fan and cannot order records")]
    UnsortableKey { key: String },
}

impl KeyExpression {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field {
            name: name.into(),
            fan: FanType::None,
        }
    }

    /// One key entry per element of the repeated field `name`.
    pub fn fan_out(name: impl Into<String>) -> Self {
        Self::Field {
            name: name.into(),
            fan: FanType::FanOut,
        }
    }

    /// The whole repeated field `name` collapsed into a single column.
    pub fn concatenate(name: impl Into<String>) -> Self {
        Self::Field {
            name: name.into(),
            fan: FanType::Concatenate,
        }
    }

    pub fn nest(parent: impl Into<String>, child: Self) -> Self {
        Self::Nesting {
            parent: parent.into(),
            fan: FanType::None,
            child: Box::new(child),
        }
    }

    /// Descend into each element of the repeated submessage field `parent`.
    pub fn nest_fan_out(parent: impl Into<String>, child: Self) -> Self {
        Self::Nesting {
            parent: parent.into(),
            fan: FanType::FanOut,
            child: Box::new(child),
        }
    }

    /// Ordered concatenation. Flattens nested `Then`s and drops `Empty`.
    #[must_use]
    pub fn then(parts: Vec<Self>) -> Self {
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Self::Then(children) => out.extend(children),
                Self::Empty => {}
                other => out.push(other),
            }
        }

        match out.len() {
            0 => Self::Empty,
            1 => out.into_iter().next().unwrap_or(Self::Empty),
            _ => Self::Then(out),
        }
    }

    #[must_use]
    pub fn grouping(whole: Self, grouped_count: usize) -> Self {
        Self::Grouping {
            whole: Box::new(whole),
            grouped_count,
        }
    }

    #[must_use]
    pub fn key_with_value(key: Self, value_split: usize) -> Self {
        Self::KeyWithValue {
            key: Box::new(key),
            value_split,
        }
    }

    /// Number of key columns this expression emits.
    #[must_use]
    pub fn column_count(&self) -> usize {
        match self {
            Self::Field { .. } | Self::RecordTypeKey | Self::Version => 1,
            Self::Nesting { child, .. } => child.column_count(),
            Self::Then(children) => children.iter().map(Self::column_count).sum(),
            Self::Grouping { whole, .. } | Self::KeyWithValue { key: whole, .. } => {
                whole.column_count()
            }
            Self::Empty => 0,
        }
    }

    /// True iff evaluating this key can emit more than one entry per record.
    #[must_use]
    pub fn creates_duplicates(&self) -> bool {
        match self {
            Self::Field { fan, .. } => *fan == FanType::FanOut,
            Self::Nesting { fan, child, .. } => {
                *fan == FanType::FanOut || child.creates_duplicates()
            }
            Self::Then(children) => children.iter().any(Self::creates_duplicates),
            Self::Grouping { whole, .. } | Self::KeyWithValue { key: whole, .. } => {
                whole.creates_duplicates()
            }
            Self::RecordTypeKey | Self::Version | Self::Empty => false,
        }
    }

    /// True iff the key defines an order over records: no concatenated fan.
    #[must_use]
    pub fn is_sortable(&self) -> bool {
        match self {
            Self::Field { fan, .. } => *fan != FanType::Concatenate,
            Self::Nesting { fan, child, .. } => *fan != FanType::Concatenate && child.is_sortable(),
            Self::Then(children) => children.iter().all(Self::is_sortable),
            Self::Grouping { whole, .. } | Self::KeyWithValue { key: whole, .. } => {
                whole.is_sortable()
            }
            Self::RecordTypeKey | Self::Version | Self::Empty => true,
        }
    }

    /// Matcher columns: the top-level children of a `Then`, or the
    /// expression itself. Nested keys stay whole (the matcher recurses).
    #[must_use]
    pub fn columns(&self) -> Vec<Self> {
        match self {
            Self::Then(children) => children.clone(),
            Self::Grouping { whole, .. } => whole.columns(),
            Self::KeyWithValue { key, .. } => {
                let mut out = Vec::new();
                let mut remaining = self.indexed_column_count();
                for column in key.columns() {
                    let width = column.column_count();
                    if width > remaining {
                        break;
                    }
                    remaining -= width;
                    out.push(column);
                }
                out
            }
            Self::Empty => Vec::new(),
            other => vec![other.clone()],
        }
    }

    /// Columns stored on the entry but not part of the scannable key.
    #[must_use]
    pub fn stored_columns(&self) -> Vec<Self> {
        match self {
            Self::KeyWithValue { key, value_split } => {
                let mut skipped = 0;
                let mut out = Vec::new();
                for column in key.columns() {
                    if skipped < *value_split {
                        skipped += column.column_count();
                        continue;
                    }
                    out.push(column);
                }
                out
            }
            _ => Vec::new(),
        }
    }

    /// Number of scannable columns (`KeyWithValue` truncates at its split).
    #[must_use]
    pub fn indexed_column_count(&self) -> usize {
        match self {
            Self::KeyWithValue { value_split, .. } => *value_split,
            other => other.column_count(),
        }
    }

    /// Fully flattened single-column expressions, for ordering comparisons.
    ///
    /// `Nesting(parent, Then(a, b))` becomes `[Nesting(parent, a),
    /// Nesting(parent, b)]` so sort keys and index keys compare columnwise.
    #[must_use]
    pub fn normalized_columns(&self) -> Vec<Self> {
        match self {
            Self::Field { .. } | Self::RecordTypeKey | Self::Version => vec![self.clone()],
            Self::Nesting { parent, fan, child } => child
                .normalized_columns()
                .into_iter()
                .map(|column| Self::Nesting {
                    parent: parent.clone(),
                    fan: *fan,
                    child: Box::new(column),
                })
                .collect(),
            Self::Then(children) => children
                .iter()
                .flat_map(Self::normalized_columns)
                .collect(),
            Self::Grouping { whole, .. } | Self::KeyWithValue { key: whole, .. } => {
                whole.normalized_columns()
            }
            Self::Empty => Vec::new(),
        }
    }

    /// Columnwise prefix test over normalized columns.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        let mine = self.normalized_columns();
        let theirs = other.normalized_columns();

        mine.len() <= theirs.len() && mine.iter().zip(theirs.iter()).all(|(a, b)| a == b)
    }

    /// Grouping prefix and grouped value, for rank-style indexes.
    /// Non-grouping keys group by nothing and rank the whole key.
    #[must_use]
    pub fn grouping_split(&self) -> (Vec<Self>, Vec<Self>) {
        match self {
            Self::Grouping {
                whole,
                grouped_count,
            } => {
                let columns = whole.normalized_columns();
                let split = (*grouped_count).min(columns.len());
                let (prefix, value) = columns.split_at(split);
                (prefix.to_vec(), value.to_vec())
            }
            other => (Vec::new(), other.normalized_columns()),
        }
    }

    /// Check the static invariants of spec'd key shapes.
    pub fn validate(&self) -> Result<(), KeyExpressionError> {
        self.validate_at(true)
    }

    fn validate_at(&self, top_level: bool) -> Result<(), KeyExpressionError> {
        match self {
            Self::Field { .. } | Self::RecordTypeKey | Self::Version | Self::Empty => Ok(()),
            Self::Nesting { child, .. } => child.validate_at(false),
            Self::Then(children) => {
                for child in children {
                    if matches!(child, Self::Then(_)) {
                        return Err(KeyExpressionError::NestedThen);
                    }
                    child.validate_at(false)?;
                }
                Ok(())
            }
            Self::Grouping {
                whole,
                grouped_count,
            } => {
                if !top_level {
                    return Err(KeyExpressionError::GroupingNotTopLevel);
                }
                let column_count = whole.column_count();
                if *grouped_count >= column_count {
                    return Err(KeyExpressionError::GroupedCountOutOfRange {
                        grouped_count: *grouped_count,
                        column_count,
                    });
                }
                whole.validate_at(false)
            }
            Self::KeyWithValue { key, value_split } => {
                let column_count = key.column_count();
                if *value_split > column_count {
                    return Err(KeyExpressionError::ValueSplitOutOfRange {
                        value_split: *value_split,
                        column_count,
                    });
                }
                key.validate_at(false)
            }
        }
    }

    /// Validate this expression as a sort key.
    pub fn validate_sort(&self) -> Result<(), KeyExpressionError> {
        self.validate()?;
        if !self.is_sortable() {
            return Err(KeyExpressionError::UnsortableKey {
                key: self.to_string(),
            });
        }

        Ok(())
    }
}

impl fmt::Display for KeyExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { name, fan } => match fan {
                FanType::None => write!(f, "{name}"),
                FanType::FanOut => write!(f, "{name}[*]"),
                FanType::Concatenate => write!(f, "{name}[...]"),
            },
            Self::Nesting { parent, fan, child } => match fan {
                FanType::FanOut => write!(f, "{parent}[*].{child}"),
                _ => write!(f, "{parent}.{child}"),
            },
            Self::Then(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            Self::Grouping {
                whole,
                grouped_count,
            } => write!(f, "group({whole}, {grouped_count})"),
            Self::KeyWithValue { key, value_split } => {
                write!(f, "key_with_value({key}, {value_split})")
            }
            Self::RecordTypeKey => write!(f, "record_type"),
            Self::Version => write!(f, "version"),
            Self::Empty => write!(f, "empty"),
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
    fn then_flattens_and_drops_empty() {
        let key = KeyExpression::then(vec![
            KeyExpression::field("a"),
            KeyExpression::then(vec![KeyExpression::field("b"), KeyExpression::field("c")]),
            KeyExpression::Empty,
        ]);

        assert_eq!(
            key,
            KeyExpression::Then(vec![
                KeyExpression::field("a"),
                KeyExpression::field("b"),
                KeyExpression::field("c"),
            ])
        );
        assert_eq!(key.column_count(), 3);
    }

    #[test]
    fn then_of_one_collapses() {
        let key = KeyExpression::then(vec![KeyExpression::field("a")]);
        assert_eq!(key, KeyExpression::field("a"));
    }

    #[test]
    fn fan_out_creates_duplicates_and_concatenate_is_unsortable() {
        let fanned = KeyExpression::then(vec![
            KeyExpression::field("a"),
            KeyExpression::fan_out("tags"),
        ]);
        assert!(fanned.creates_duplicates());
        assert!(fanned.is_sortable());

        let concat = KeyExpression::concatenate("tags");
        assert!(!concat.creates_duplicates());
        assert!(!concat.is_sortable());
        assert!(concat.validate_sort().is_err());
    }

    #[test]
    fn nesting_normalizes_per_column() {
        let key = KeyExpression::nest(
            "address",
            KeyExpression::then(vec![
                KeyExpression::field("city"),
                KeyExpression::field("zip"),
            ]),
        );

        let columns = key.normalized_columns();
        assert_eq!(columns.len(), 2);
        assert_eq!(
            columns[0],
            KeyExpression::nest("address", KeyExpression::field("city"))
        );
    }

    #[test]
    fn prefix_test_is_columnwise() {
        let short = KeyExpression::field("name");
        let long = KeyExpression::then(vec![
            KeyExpression::field("name"),
            KeyExpression::field("age"),
        ]);

        assert!(short.is_prefix_of(&long));
        assert!(!long.is_prefix_of(&short));
        assert!(long.is_prefix_of(&long));
    }

    #[test]
    fn grouping_is_top_level_only() {
        let grouped = KeyExpression::grouping(
            KeyExpression::then(vec![
                KeyExpression::field("game"),
                KeyExpression::field("score"),
            ]),
            1,
        );
        assert!(grouped.validate().is_ok());

        let nested = KeyExpression::then(vec![KeyExpression::field("a"), grouped]);
        assert_eq!(
            nested.validate(),
            Err(KeyExpressionError::GroupingNotTopLevel)
        );
    }

    #[test]
    fn grouped_count_must_leave_a_grouped_value() {
        let key = KeyExpression::grouping(KeyExpression::field("score"), 1);
        assert!(matches!(
            key.validate(),
            Err(KeyExpressionError::GroupedCountOutOfRange { .. })
        ));
    }

    #[test]
    fn key_with_value_truncates_scannable_columns() {
        let key = KeyExpression::key_with_value(
            KeyExpression::then(vec![
                KeyExpression::field("a"),
                KeyExpression::field("b"),
                KeyExpression::field("c"),
            ]),
            2,
        );

        assert_eq!(key.indexed_column_count(), 2);
        assert_eq!(
            key.columns(),
            vec![KeyExpression::field("a"), KeyExpression::field("b")]
        );
        assert_eq!(key.stored_columns(), vec![KeyExpression::field("c")]);
    }

    #[test]
    fn grouping_split_exposes_prefix_and_value() {
        let key = KeyExpression::grouping(
            KeyExpression::then(vec![
                KeyExpression::field("game"),
                KeyExpression::field("score"),
            ]),
            1,
        );

        let (prefix, value) = key.grouping_split();
        assert_eq!(prefix, vec![KeyExpression::field("game")]);
        assert_eq!(value, vec![KeyExpression::field("score")]);
    }
}
