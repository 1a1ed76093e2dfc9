//! Declarative query surface consumed by the planner.

pub mod comparison;
pub mod component;
pub mod normalize;

use crate::key::KeyExpression;
use serde::{Deserialize, Serialize};

// re-exports
pub use comparison::{Comparison, ComparisonCategory, TextComparison, TextMode};
pub use component::{QueryComponent, QueryRecordFunction};
pub use normalize::{NormalizeOptions, normalize};

///
/// RecordQuery
///
/// Record-type set, boolean filter, optional sort, optional required-result
/// projection. An empty record-type set targets every type in the store.
///
/// `remove_duplicates` defaults to true: queries are set-semantics unless
/// the caller explicitly tolerates fan-out duplicates.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RecordQuery {
    pub record_types: Vec<String>,
    pub filter: Option<QueryComponent>,
    pub sort: Option<KeyExpression>,
    pub sort_reverse: bool,
    pub remove_duplicates: bool,
    /// Fields that must be present on results; enables covering rewrites.
    pub required_results: Option<Vec<KeyExpression>>,
    /// Allow-list of queryable index names; `None` allows all readable.
    pub allowed_indexes: Option<Vec<String>>,
}

impl RecordQuery {
    pub fn new<I, S>(record_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            record_types: record_types.into_iter().map(Into::into).collect(),
            filter: None,
            sort: None,
            sort_reverse: false,
            remove_duplicates: true,
            required_results: None,
            allowed_indexes: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: QueryComponent) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: KeyExpression) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn with_sort_reversed(mut self, sort: KeyExpression) -> Self {
        self.sort = Some(sort);
        self.sort_reverse = true;
        self
    }

    #[must_use]
    pub fn with_required_results(mut self, fields: Vec<KeyExpression>) -> Self {
        self.required_results = Some(fields);
        self
    }

    #[must_use]
    pub fn with_allowed_indexes<I, S>(mut self, indexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_indexes = Some(indexes.into_iter().map(Into::into).collect());
        self
    }

    /// Tolerate fan-out duplicates in results (bag semantics).
    #[must_use]
    pub const fn allowing_duplicates(mut self) -> Self {
        self.remove_duplicates = false;
        self
    }
}
