//! Post-processors: covering rewrite and residual-filter pushdown.

use crate::key::KeyExpression;
use crate::model::{IndexKind, MetadataModel};
use crate::plan::{CoveringIndexScanPlan, RecordQueryPlan};

/// Rewrite the plan so the record fetch is skipped when every required
/// result field is reachable from the index entry and the remaining
/// residuals are evaluable on the entry.
pub(crate) fn try_covering(
    metadata: &MetadataModel,
    common_primary_key: Option<&KeyExpression>,
    plan: &RecordQueryPlan,
    required: &[KeyExpression],
) -> Option<RecordQueryPlan> {
    match plan {
        RecordQueryPlan::IndexScan(scan) => {
            let entry = entry_columns(metadata, common_primary_key, &scan.index_name)?;
            covers(&entry, required).then(|| {
                RecordQueryPlan::CoveringIndexScan(CoveringIndexScanPlan {
                    inner: Box::new(plan.clone()),
                    fields: required.to_vec(),
                })
            })
        }
        RecordQueryPlan::Filter { filter, child } => {
            // The residual must move onto the entry for the fetch to go.
            let RecordQueryPlan::IndexScan(scan) = &**child else {
                return None;
            };
            let entry = entry_columns(metadata, common_primary_key, &scan.index_name)?;
            if !covers(&entry, required) || !filter.is_evaluable_on_entry(&entry) {
                return None;
            }

            let covering = try_covering(metadata, common_primary_key, child, required)?;
            Some(RecordQueryPlan::IndexEntryFilter {
                filter: filter.clone(),
                child: Box::new(covering),
            })
        }
        RecordQueryPlan::IndexEntryFilter { filter, child } => {
            let covering = try_covering(metadata, common_primary_key, child, required)?;
            Some(RecordQueryPlan::IndexEntryFilter {
                filter: filter.clone(),
                child: Box::new(covering),
            })
        }
        RecordQueryPlan::PrimaryKeyDistinct { child } => {
            let covering = try_covering(metadata, common_primary_key, child, required)?;
            Some(RecordQueryPlan::distinct(covering))
        }
        _ => None,
    }
}

// Columns readable from one entry of the named index: indexed key columns,
// stored (split-off) columns, and the primary key the entry carries.
pub(crate) fn entry_columns(
    metadata: &MetadataModel,
    common_primary_key: Option<&KeyExpression>,
    index_name: &str,
) -> Option<Vec<KeyExpression>> {
    let index = metadata.index(index_name).ok()?;
    if index.kind != IndexKind::Value {
        return None;
    }

    let mut columns: Vec<KeyExpression> = index
        .key
        .columns()
        .iter()
        .flat_map(KeyExpression::normalized_columns)
        .collect();
    for stored in index.key.stored_columns() {
        columns.extend(stored.normalized_columns());
    }
    if let Some(primary_key) = common_primary_key {
        for column in primary_key.normalized_columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }

    Some(columns)
}

fn covers(entry: &[KeyExpression], required: &[KeyExpression]) -> bool {
    required
        .iter()
        .flat_map(KeyExpression::normalized_columns)
        .all(|column| entry.contains(&column))
}

/// Push residual filters below unions, intersections, IN-joins, and type
/// filters. Record-space residuals are evaluable on every branch, so the
/// rewrite is a pure reordering; it runs bottom-up to convergence.
pub(crate) fn push_residual_filters(plan: RecordQueryPlan) -> RecordQueryPlan {
    let plan = map_children(plan, push_residual_filters);

    let RecordQueryPlan::Filter { filter, child } = plan else {
        return plan;
    };

    match *child {
        RecordQueryPlan::Union {
            comparison_key,
            children,
            reverse,
        } => RecordQueryPlan::Union {
            comparison_key,
            children: children
                .into_iter()
                .map(|branch| {
                    push_residual_filters(RecordQueryPlan::filtered(filter.clone(), branch))
                })
                .collect(),
            reverse,
        },
        RecordQueryPlan::UnorderedUnion { children } => RecordQueryPlan::UnorderedUnion {
            children: children
                .into_iter()
                .map(|branch| {
                    push_residual_filters(RecordQueryPlan::filtered(filter.clone(), branch))
                })
                .collect(),
        },
        RecordQueryPlan::Intersection {
            comparison_key,
            children,
            reverse,
        } => RecordQueryPlan::Intersection {
            comparison_key,
            children: children
                .into_iter()
                .map(|branch| {
                    push_residual_filters(RecordQueryPlan::filtered(filter.clone(), branch))
                })
                .collect(),
            reverse,
        },
        RecordQueryPlan::InJoin { sources, child } => RecordQueryPlan::InJoin {
            sources,
            child: Box::new(push_residual_filters(RecordQueryPlan::filtered(
                filter, *child,
            ))),
        },
        RecordQueryPlan::TypeFilter {
            record_types,
            child,
        } => RecordQueryPlan::type_filtered(
            record_types,
            push_residual_filters(RecordQueryPlan::filtered(filter, *child)),
        ),
        other => RecordQueryPlan::filtered(filter, other),
    }
}

// Apply `f` to each direct child.
fn map_children(
    plan: RecordQueryPlan,
    f: impl Fn(RecordQueryPlan) -> RecordQueryPlan + Copy,
) -> RecordQueryPlan {
    match plan {
        RecordQueryPlan::Filter { filter, child } => RecordQueryPlan::Filter {
            filter,
            child: Box::new(f(*child)),
        },
        RecordQueryPlan::IndexEntryFilter { filter, child } => RecordQueryPlan::IndexEntryFilter {
            filter,
            child: Box::new(f(*child)),
        },
        RecordQueryPlan::TypeFilter {
            record_types,
            child,
        } => RecordQueryPlan::TypeFilter {
            record_types,
            child: Box::new(f(*child)),
        },
        RecordQueryPlan::InJoin { sources, child } => RecordQueryPlan::InJoin {
            sources,
            child: Box::new(f(*child)),
        },
        RecordQueryPlan::InUnion {
            sources,
            comparison_key,
            child,
            reverse,
        } => RecordQueryPlan::InUnion {
            sources,
            comparison_key,
            child: Box::new(f(*child)),
            reverse,
        },
        RecordQueryPlan::PrimaryKeyDistinct { child } => RecordQueryPlan::PrimaryKeyDistinct {
            child: Box::new(f(*child)),
        },
        RecordQueryPlan::Sort { key, reverse, child } => RecordQueryPlan::Sort {
            key,
            reverse,
            child: Box::new(f(*child)),
        },
        RecordQueryPlan::Intersection {
            comparison_key,
            children,
            reverse,
        } => RecordQueryPlan::Intersection {
            comparison_key,
            children: children.into_iter().map(f).collect(),
            reverse,
        },
        RecordQueryPlan::Union {
            comparison_key,
            children,
            reverse,
        } => RecordQueryPlan::Union {
            comparison_key,
            children: children.into_iter().map(f).collect(),
            reverse,
        },
        RecordQueryPlan::UnorderedUnion { children } => RecordQueryPlan::UnorderedUnion {
            children: children.into_iter().map(f).collect(),
        },
        RecordQueryPlan::CoveringIndexScan(covering) => {
            RecordQueryPlan::CoveringIndexScan(CoveringIndexScanPlan {
                inner: Box::new(f(*covering.inner)),
                fields: covering.fields,
            })
        }
        leaf @ (RecordQueryPlan::Scan(_)
        | RecordQueryPlan::IndexScan(_)
        | RecordQueryPlan::TextIndexScan(_)) => leaf,
    }
}

///
/// TESTS
///
