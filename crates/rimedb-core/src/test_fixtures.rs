//! Shared metadata and query builders for planner tests.

use crate::key::KeyExpression;
use crate::model::{IndexModel, MetadataModel, RecordTypeModel, StoreState};
use crate::planner::RecordQueryPlanner;
use crate::query::comparison::Comparison;
use crate::query::component::QueryComponent;
use crate::value::Value;

/// `Then(RecordTypeKey, Field("id"))`, the type-prefixed key space.
pub(crate) fn type_prefixed_primary_key() -> KeyExpression {
    KeyExpression::then(vec![
        KeyExpression::RecordTypeKey,
        KeyExpression::field("id"),
    ])
}

/// One record type "A" keyed by `Field("id")`.
pub(crate) fn single_type_metadata(indexes: Vec<IndexModel>) -> MetadataModel {
    metadata_with_primary_key(KeyExpression::field("id"), indexes)
}

pub(crate) fn metadata_with_primary_key(
    primary_key: KeyExpression,
    indexes: Vec<IndexModel>,
) -> MetadataModel {
    MetadataModel::new(vec![RecordTypeModel::new("A", primary_key)], indexes)
        .expect("fixture metadata is valid")
}

pub(crate) fn planner(metadata: MetadataModel) -> RecordQueryPlanner {
    RecordQueryPlanner::new(metadata, StoreState::new())
}

pub(crate) fn eq(field: &str, value: impl Into<Value>) -> QueryComponent {
    QueryComponent::field(field, Comparison::Equals(value.into()))
}

pub(crate) fn gt(field: &str, value: impl Into<Value>) -> QueryComponent {
    QueryComponent::field(field, Comparison::GreaterThan(value.into()))
}

pub(crate) fn in_list(field: &str, values: Vec<Value>) -> QueryComponent {
    QueryComponent::field(field, Comparison::In(values))
}
