//! Plan-context build: candidate discovery and the common primary key.

use crate::key::KeyExpression;
use crate::model::{IndexModel, MetadataModel, RecordTypeModel, StoreState};
use crate::planner::PlannerError;
use crate::query::RecordQuery;

///
/// PlanContext
///
/// Immutable view assembled per planning call and passed by reference
/// through the matcher chain. Candidate order is deterministic: the record
/// scan first, then indexes sorted by name.
///

#[derive(Debug)]
pub(crate) struct PlanContext<'a> {
    pub query: &'a RecordQuery,
    pub metadata: &'a MetadataModel,
    pub record_types: Vec<&'a RecordTypeModel>,
    pub candidate_indexes: Vec<&'a IndexModel>,
    pub common_primary_key: Option<KeyExpression>,
}

impl<'a> PlanContext<'a> {
    /// True when the query targets exactly one record type.
    pub fn single_record_type(&self) -> Option<&'a RecordTypeModel> {
        match self.record_types.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

pub(crate) fn build_context<'a>(
    metadata: &'a MetadataModel,
    store_state: &StoreState,
    query: &'a RecordQuery,
) -> Result<PlanContext<'a>, PlannerError> {
    let record_types = resolve_record_types(metadata, query)?;

    let mut candidates: Vec<&IndexModel> = metadata
        .indexes()
        .iter()
        .filter(|index| applies_to_all(index, &record_types))
        .filter(|index| store_state.is_readable(&index.name))
        .filter(|index| allowed(query, index))
        .collect();
    candidates.sort_by(|left, right| left.name.cmp(&right.name));

    // A demanded index that is filtered out must fail loudly, not silently
    // degrade to a scan.
    if let Some(allowed_names) = &query.allowed_indexes {
        for name in allowed_names {
            let index = metadata.index(name).map_err(PlannerError::from)?;
            if !store_state.is_readable(&index.name) {
                return Err(PlannerError::Metadata {
                    message: format!("index '{name}' is not readable on this store"),
                });
            }
        }
    }

    let common_primary_key = common_primary_key(&record_types);

    Ok(PlanContext {
        query,
        metadata,
        record_types,
        candidate_indexes: candidates,
        common_primary_key,
    })
}

fn resolve_record_types<'a>(
    metadata: &'a MetadataModel,
    query: &RecordQuery,
) -> Result<Vec<&'a RecordTypeModel>, PlannerError> {
    if query.record_types.is_empty() {
        return Ok(metadata.record_types().collect());
    }

    query
        .record_types
        .iter()
        .map(|name| metadata.record_type(name).map_err(PlannerError::from))
        .collect()
}

// Candidate rule: universal indexes always apply; otherwise the index must
// be declared on every targeted type (set intersection for multi-type).
fn applies_to_all(index: &IndexModel, record_types: &[&RecordTypeModel]) -> bool {
    if index.is_universal() {
        return true;
    }

    !record_types.is_empty()
        && record_types
            .iter()
            .all(|record_type| index.applies_to(&record_type.name))
}

fn allowed(query: &RecordQuery, index: &IndexModel) -> bool {
    match &query.allowed_indexes {
        Some(names) => names.iter().any(|name| *name == index.name),
        None => true,
    }
}

/// Structural common prefix of the primary keys of every targeted type.
fn common_primary_key(record_types: &[&RecordTypeModel]) -> Option<KeyExpression> {
    let [first, rest @ ..] = record_types else {
        return None;
    };

    let mut columns = first.primary_key.normalized_columns();
    for record_type in rest {
        let other = record_type.primary_key.normalized_columns();
        let shared = columns
            .iter()
            .zip(other.iter())
            .take_while(|(a, b)| a == b)
            .count();
        columns.truncate(shared);
        if columns.is_empty() {
            return None;
        }
    }

    Some(KeyExpression::then(columns))
}

///
/// TESTS
///
