use crate::key::KeyExpression;
use derive_more::IsVariant;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

///
/// IndexKind
/// Planner-relevant classification of index maintenance strategy.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, IsVariant, PartialEq, Serialize)]
pub enum IndexKind {
    /// Stores each emitted key; scannable by value order.
    Value,
    /// Group-by-key ordered-score index; scannable in rank space.
    Rank,
    /// Token index with bespoke matching.
    Text,
    /// Maintained by an external maintainer the planner treats opaquely.
    Other,
}

///
/// IndexModel
///
/// Runtime descriptor for one secondary index. An empty `record_types` list
/// marks a universal index (applies to every type in the store).
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexModel {
    /// Stable index name used for diagnostics and planner identity.
    pub name: String,
    pub key: KeyExpression,
    pub kind: IndexKind,
    pub unique: bool,
    pub record_types: Vec<String>,
}

impl IndexModel {
    pub fn new(name: impl Into<String>, key: KeyExpression, kind: IndexKind) -> Self {
        Self {
            name: name.into(),
            key,
            kind,
            unique: false,
            record_types: Vec::new(),
        }
    }

    pub fn value(name: impl Into<String>, key: KeyExpression) -> Self {
        Self::new(name, key, IndexKind::Value)
    }

    pub fn rank(name: impl Into<String>, key: KeyExpression) -> Self {
        Self::new(name, key, IndexKind::Rank)
    }

    pub fn text(name: impl Into<String>, key: KeyExpression) -> Self {
        Self::new(name, key, IndexKind::Text)
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn for_types<I, S>(mut self, record_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record_types = record_types.into_iter().map(Into::into).collect();
        self
    }

    /// Universal indexes apply to every record type in the store.
    #[must_use]
    pub fn is_universal(&self) -> bool {
        self.record_types.is_empty()
    }

    #[must_use]
    pub fn applies_to(&self, record_type: &str) -> bool {
        self.is_universal() || self.record_types.iter().any(|name| name == record_type)
    }

    #[must_use]
    pub fn creates_duplicates(&self) -> bool {
        self.key.creates_duplicates()
    }

    /// Relative storage weight used as the final selection tie-break.
    /// Value indexes cost their scannable columns; other kinds carry their
    /// full key plus maintainer bookkeeping.
    #[must_use]
    pub fn size_overhead(&self) -> usize {
        match self.kind {
            IndexKind::Value => self.key.indexed_column_count(),
            IndexKind::Rank | IndexKind::Text | IndexKind::Other => self.key.column_count() + 1,
        }
    }
}

impl Display for IndexModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique {
            write!(f, "{}: UNIQUE {:?} {}", self.name, self.kind, self.key)
        } else {
            write!(f, "{}: {:?} {}", self.name, self.kind, self.key)
        }
    }
}

///
/// TESTS
///
