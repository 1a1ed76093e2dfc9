use crate::key::KeyExpression;
use serde::{Deserialize, Serialize};

///
/// RecordTypeModel
/// Runtime descriptor for one record type and its primary key.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RecordTypeModel {
    pub name: String,
    pub primary_key: KeyExpression,
}

impl RecordTypeModel {
    pub fn new(name: impl Into<String>, primary_key: KeyExpression) -> Self {
        Self {
            name: name.into(),
            primary_key,
        }
    }

    /// True when the primary key leads with the synthetic type column,
    /// which lets a single-type scan bind an equality on it.
    #[must_use]
    pub fn primary_key_has_type_prefix(&self) -> bool {
        self.primary_key
            .normalized_columns()
            .first()
            .is_some_and(|column| matches!(column, KeyExpression::RecordTypeKey))
    }
}
