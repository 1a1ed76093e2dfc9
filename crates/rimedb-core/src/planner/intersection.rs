//! Ordered-intersection combiner.
//!
//! When the best candidate leaves residual filters, order-compatible
//! runners-up can be intersected with it so more of the filter is enforced
//! by scans. The first intersection that strictly dominates on residual
//! count is trusted; intersections never re-enter the scored comparator.

use crate::planner::context::PlanContext;
use crate::planner::ordering::{PlanOrderingKey, merge_comparison_key};
use crate::planner::scored::ScoredPlan;
use crate::planner::{PlannerConfiguration, PlannerError};
use crate::plan::RecordQueryPlan;
use crate::query::component::QueryComponent;

/// Try to build an ordered intersection around `best`. Returns None when no
/// combination strictly reduces the residual set.
pub(crate) fn try_ordered_intersection(
    context: &PlanContext<'_>,
    config: &PlannerConfiguration,
    best: &ScoredPlan,
    others: &[ScoredPlan],
) -> Result<Option<ScoredPlan>, PlannerError> {
    let Some(best_ordering) = &best.ordering_key else {
        return Ok(None);
    };
    if best.unsatisfied_filters.is_empty() {
        return Ok(None);
    }

    // Order-compatible runners-up, most useful first.
    let mut candidates: Vec<&ScoredPlan> = others
        .iter()
        .filter(|candidate| {
            candidate
                .ordering_key
                .as_ref()
                .is_some_and(|ordering| ordering.reverse == best_ordering.reverse)
        })
        .collect();
    candidates.sort_by(|left, right| {
        left.num_non_sargables()
            .cmp(&right.num_non_sargables())
            .then(right.index_filters.len().cmp(&left.index_filters.len()))
    });

    let sort = context.query.sort.as_ref();
    let common_primary_key = context.common_primary_key.as_ref();

    let mut members: Vec<&ScoredPlan> = vec![best];
    let mut remaining: Vec<QueryComponent> = best.unsatisfied_filters.clone();

    for candidate in candidates {
        if remaining.is_empty() {
            break;
        }

        // Only keep a member that strictly shrinks the residual set.
        let next: Vec<QueryComponent> = remaining
            .iter()
            .filter(|residual| candidate.unsatisfied_filters.contains(residual))
            .cloned()
            .collect();
        if next.len() >= remaining.len() {
            continue;
        }

        // Direction or key mismatch aborts this member, not the whole
        // intersection attempt.
        let orderings: Vec<&PlanOrderingKey> = members
            .iter()
            .chain(std::iter::once(&candidate))
            .filter_map(|member| member.ordering_key.as_ref())
            .collect();
        if merge_comparison_key(&orderings, sort, common_primary_key).is_none() {
            continue;
        }

        members.push(candidate);
        remaining = next;
    }

    if members.len() < 2 {
        return Ok(None);
    }

    let orderings: Vec<&PlanOrderingKey> = members
        .iter()
        .filter_map(|member| member.ordering_key.as_ref())
        .collect();
    let Some(comparison_key) = merge_comparison_key(&orderings, sort, common_primary_key) else {
        return Ok(None);
    };

    let plan = RecordQueryPlan::Intersection {
        comparison_key,
        children: members.iter().map(|member| member.plan.clone()).collect(),
        reverse: best_ordering.reverse,
    };

    // Mid-construction complexity guard: a runaway intersection fails the
    // call rather than the final check.
    let complexity = plan.complexity();
    if complexity > config.complexity_threshold {
        return Err(PlannerError::PlanTooComplex {
            complexity,
            threshold: config.complexity_threshold,
            plan: Box::new(plan),
        });
    }

    let creates_duplicates = members.iter().any(|member| member.creates_duplicates);
    let ordering_key = best.ordering_key.clone();

    let mut scored = ScoredPlan::new(plan, best.score);
    scored.unsatisfied_filters = remaining;
    scored.creates_duplicates = creates_duplicates;
    scored.ordering_key = ordering_key;
    scored.included_rank_comparisons = best.included_rank_comparisons.clone();

    Ok(Some(scored))
}
