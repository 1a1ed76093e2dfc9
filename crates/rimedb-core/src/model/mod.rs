//! Immutable metadata view consumed by the planner.
//!
//! Types in `model` are runtime descriptors of schema-level concepts:
//! record types with their primary keys, and the secondary indexes declared
//! over them. The planner treats a [`MetadataModel`] plus a [`StoreState`]
//! readability snapshot as read-only for the duration of a call.

pub(crate) mod index;
pub(crate) mod record_type;
pub(crate) mod store;

use crate::key::KeyExpressionError;
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

// re-exports
pub use index::{IndexKind, IndexModel};
pub use record_type::RecordTypeModel;
pub use store::StoreState;

///
/// MetadataError
/// Inconsistencies in the metadata handed to the planner.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum MetadataError {
    #[error("unknown record type '{name}'")]
    UnknownRecordType { name: String },

    #[error("unknown index '{name}'")]
    UnknownIndex { name: String },

    #[error("duplicate index name '{name}'")]
    DuplicateIndex { name: String },

    #[error("index '{index}' names unknown record type '{record_type}'")]
    IndexOnUnknownType { index: String, record_type: String },

    #[error("invalid key expression: {0}")]
    InvalidKey(#[from] KeyExpressionError),
}

///
/// MetadataModel
///
/// Record types and indexes, validated on construction. Index iteration
/// order is the insertion order of `new`; the planner re-sorts candidates
/// by name before matching, so plan output never depends on it.
///

#[derive(Clone, Debug)]
pub struct MetadataModel {
    record_types: BTreeMap<String, RecordTypeModel>,
    indexes: Vec<IndexModel>,
}

impl MetadataModel {
    pub fn new(
        record_types: Vec<RecordTypeModel>,
        indexes: Vec<IndexModel>,
    ) -> Result<Self, MetadataError> {
        let mut types = BTreeMap::new();
        for record_type in record_types {
            record_type.primary_key.validate()?;
            types.insert(record_type.name.clone(), record_type);
        }

        let mut seen = BTreeMap::new();
        for index in &indexes {
            index.key.validate()?;
            if seen.insert(index.name.clone(), ()).is_some() {
                return Err(MetadataError::DuplicateIndex {
                    name: index.name.clone(),
                });
            }
            for record_type in &index.record_types {
                if !types.contains_key(record_type) {
                    return Err(MetadataError::IndexOnUnknownType {
                        index: index.name.clone(),
                        record_type: record_type.clone(),
                    });
                }
            }
        }

        Ok(Self {
            record_types: types,
            indexes,
        })
    }

    pub fn record_type(&self, name: &str) -> Result<&RecordTypeModel, MetadataError> {
        self.record_types
            .get(name)
            .ok_or_else(|| MetadataError::UnknownRecordType {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn record_types(&self) -> impl Iterator<Item = &RecordTypeModel> {
        self.record_types.values()
    }

    #[must_use]
    pub fn indexes(&self) -> &[IndexModel] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Result<&IndexModel, MetadataError> {
        self.indexes
            .iter()
            .find(|index| index.name == name)
            .ok_or_else(|| MetadataError::UnknownIndex {
                name: name.to_string(),
            })
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyExpression;

    fn record_type(name: &str) -> RecordTypeModel {
        RecordTypeModel::new(name, KeyExpression::field("id"))
    }

    #[test]
    fn duplicate_index_names_are_rejected() {
        let err = MetadataModel::new(
            vec![record_type("A")],
            vec![
                IndexModel::value("ix", KeyExpression::field("a")).for_types(["A"]),
                IndexModel::value("ix", KeyExpression::field("b")).for_types(["A"]),
            ],
        )
        .unwrap_err();

        assert_eq!(
            err,
            MetadataError::DuplicateIndex {
                name: "ix".to_string()
            }
        );
    }

    #[test]
    fn index_on_unknown_type_is_rejected() {
        let err = MetadataModel::new(
            vec![record_type("A")],
            vec![IndexModel::value("ix", KeyExpression::field("a")).for_types(["B"])],
        )
        .unwrap_err();

        assert!(matches!(err, MetadataError::IndexOnUnknownType { .. }));
    }

    #[test]
    fn unknown_record_type_lookup_fails() {
        let metadata = MetadataModel::new(vec![record_type("A")], vec![]).unwrap();
        assert!(metadata.record_type("B").is_err());
        assert!(metadata.record_type("A").is_ok());
    }
}
