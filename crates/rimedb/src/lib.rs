//! RimeDB — heuristic query planning for record stores on ordered key-value
//! engines.
//!
//! This is the public meta-crate. Downstream users depend on **rimedb** only.
//!
//! It re-exports the stable planning surface from:
//!   - `rimedb-core` (key expressions, query model, plan operators, planner)

pub use rimedb_core as core;

pub use rimedb_core::planner::{
    IndexScanPreference, PlannerConfiguration, PlannerError, RecordQueryPlanner,
};

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No planner internals or helpers are re-exported here.
///

pub mod prelude {
    pub use rimedb_core::prelude::*;
}
