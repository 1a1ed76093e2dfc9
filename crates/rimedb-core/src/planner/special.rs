//! Rank and text index matching.
//!
//! Both kinds scan a key space that is not plain value order, so neither
//! contributes a plan ordering key; a query that needs a sort never takes
//! these paths.

use crate::key::KeyExpression;
use crate::model::IndexModel;
use crate::plan::{IndexScanKind, IndexScanPlan, RecordQueryPlan, ScanComparisons, TextIndexScanPlan};
use crate::planner::context::PlanContext;
use crate::planner::matcher::wrap_type_filter_for_index;
use crate::planner::scored::ScoredPlan;
use crate::query::comparison::{Comparison, ComparisonCategory, TextMode};
use crate::query::component::{QueryComponent, QueryRecordFunction};

/// Fixed score for a matched text scan; tuned high because token scans
/// beat any value-index prefix for text predicates.
const TEXT_INDEX_SCORE: usize = 10;

/// Match `rank(expr) <op> v` predicates onto a rank index by converting
/// them to a rank-space scan. Group-prefix columns must be pinned by
/// equalities; multiple rank predicates on the same grouping merge into
/// one compound range where compatible.
pub(crate) fn plan_rank(
    context: &PlanContext<'_>,
    index: &IndexModel,
    filter: Option<&QueryComponent>,
) -> Option<ScoredPlan> {
    if context.query.sort.is_some() {
        return None;
    }

    let children = and_children(filter?);
    let mut consumed = vec![false; children.len()];

    let (group_columns, _) = index.key.grouping_split();

    // Pin every group column with an equality before rank space is usable.
    let mut comparisons = ScanComparisons::new();
    for column in &group_columns {
        let bound = children.iter().enumerate().find(|(i, child)| {
            !consumed[*i]
                && child.constrained_column().as_ref() == Some(column)
                && child
                    .comparison()
                    .is_some_and(|c| c.category() == ComparisonCategory::Equality)
        });
        let (i, child) = bound?;
        let comparison = child.comparison()?.clone();
        if !comparisons.push_equality(comparison) {
            return None;
        }
        consumed[i] = true;
    }

    let mut included_rank = Vec::new();
    for (i, child) in children.iter().enumerate() {
        if consumed[i] {
            continue;
        }
        let QueryComponent::RecordFunction {
            function: QueryRecordFunction::Rank(grouping),
            comparison,
        } = child
        else {
            continue;
        };
        if *grouping != index.key {
            continue;
        }

        let added = match comparison.category() {
            ComparisonCategory::Equality => comparisons.push_equality(comparison.clone()),
            ComparisonCategory::Inequality => comparisons.push_inequality(comparison.clone()),
            ComparisonCategory::Text | ComparisonCategory::Other => false,
        };
        if added {
            consumed[i] = true;
            included_rank.push(child.clone());
        }
    }

    if included_rank.is_empty() {
        return None;
    }

    let scan = RecordQueryPlan::IndexScan(IndexScanPlan {
        index_name: index.name.clone(),
        scan_kind: IndexScanKind::ByRank,
        comparisons,
        reverse: false,
        strictly_sorted: false,
        creates_duplicates: index.creates_duplicates(),
    });
    let plan = wrap_type_filter_for_index(context, index, scan);

    let mut scored =
        ScoredPlan::new(plan, index.key.column_count()).with_index(index, false);
    scored.unsatisfied_filters = residuals(&children, &consumed);
    scored.included_rank_comparisons = included_rank;
    scored.creates_duplicates = index.creates_duplicates();

    Some(scored)
}

/// Match a text predicate onto a text index: equalities pin any grouping
/// prefix, then the token column takes the opaque text comparison.
pub(crate) fn plan_text(
    context: &PlanContext<'_>,
    index: &IndexModel,
    filter: Option<&QueryComponent>,
) -> Option<ScoredPlan> {
    // Sorts with a text predicate are rejected upstream; a text scan
    // documents no ordering.
    if context.query.sort.is_some() {
        return None;
    }

    let children = and_children(filter?);
    let mut consumed = vec![false; children.len()];

    let columns: Vec<KeyExpression> = index.key.normalized_columns();
    let mut prefix = ScanComparisons::new();
    let mut text_match: Option<(usize, crate::query::comparison::TextComparison)> = None;

    for column in &columns {
        // Try an equality on this column first (grouping prefix).
        let equality = children.iter().enumerate().find(|(i, child)| {
            !consumed[*i]
                && child.constrained_column().as_ref() == Some(column)
                && child
                    .comparison()
                    .is_some_and(|c| c.category() == ComparisonCategory::Equality)
        });
        if let Some((i, child)) = equality {
            let comparison = child.comparison()?.clone();
            if !prefix.push_equality(comparison) {
                return None;
            }
            consumed[i] = true;
            continue;
        }

        // The first unpinned column must carry the token match.
        let found = children.iter().enumerate().find_map(|(i, child)| {
            if consumed[i] {
                return None;
            }
            match (child, column_field_name(column)) {
                (
                    QueryComponent::Field { field, comparison: Comparison::Text(text) }
                    | QueryComponent::OneOfThem {
                        field,
                        comparison: Comparison::Text(text),
                    },
                    Some(column_field),
                ) if field == column_field => Some((i, text.clone())),
                _ => None,
            }
        });

        text_match = found;
        break;
    }

    let (i, text) = text_match?;
    consumed[i] = true;

    // Phrase matching over-approximates on the index; the predicate stays
    // residual for post-fetch verification.
    let mut unsatisfied = residuals(&children, &consumed);
    if text.mode == TextMode::ContainsPhrase {
        unsatisfied.push(children[i].clone());
    }

    let scan = RecordQueryPlan::TextIndexScan(TextIndexScanPlan {
        index_name: index.name.clone(),
        prefix,
        text,
        reverse: false,
    });
    let plan = wrap_type_filter_for_index(context, index, scan);

    let mut scored = ScoredPlan::new(plan, TEXT_INDEX_SCORE).with_index(index, false);
    scored.unsatisfied_filters = unsatisfied;
    scored.creates_duplicates = true;

    Some(scored)
}

fn and_children(filter: &QueryComponent) -> Vec<QueryComponent> {
    match filter {
        QueryComponent::And(children) => children.clone(),
        single => vec![single.clone()],
    }
}

fn residuals(children: &[QueryComponent], consumed: &[bool]) -> Vec<QueryComponent> {
    children
        .iter()
        .zip(consumed.iter())
        .filter_map(|(child, consumed)| (!consumed).then(|| child.clone()))
        .collect()
}

const fn column_field_name(column: &KeyExpression) -> Option<&String> {
    match column {
        KeyExpression::Field { name, .. } => Some(name),
        _ => None,
    }
}
