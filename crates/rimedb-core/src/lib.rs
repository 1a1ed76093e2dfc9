//! Core planner for RimeDB: key-expression algebra, query predicates, plan
//! operators, and the heuristic planner that maps queries onto indexes.
//!
//! The crate is a pipeline of pure functions over immutable values. A
//! [`planner::RecordQueryPlanner`] is handed an immutable metadata view and a
//! store-readability snapshot; each `plan` call is synchronous, holds no
//! shared state, and returns an owned [`plan::RecordQueryPlan`] tree.

pub mod error;
pub mod key;
pub mod model;
pub mod plan;
pub mod planner;
pub mod query;
pub mod value;

#[cfg(test)]
pub(crate) mod test_fixtures;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, planners, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        key::{FanType, KeyExpression},
        model::{IndexKind, IndexModel, MetadataModel, RecordTypeModel, StoreState},
        plan::RecordQueryPlan,
        query::{Comparison, QueryComponent, RecordQuery},
        value::Value,
    };
}
