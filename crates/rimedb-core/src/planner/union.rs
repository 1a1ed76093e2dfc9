//! OR planning: per-disjunct subplans combined into unions.

use crate::plan::RecordQueryPlan;
use crate::planner::context::PlanContext;
use crate::planner::ordering::{PlanOrderingKey, merge_comparison_key};
use crate::planner::scored::ScoredPlan;
use crate::planner::{PlannerConfiguration, PlannerError, RecordQueryPlanner};
use crate::query::component::QueryComponent;

/// Plan a disjunction. Returns None when any disjunct fails to plan or a
/// required sort cannot be merge-aligned across the branches.
pub(crate) fn plan_or(
    planner: &RecordQueryPlanner,
    context: &PlanContext<'_>,
    config: &PlannerConfiguration,
    disjuncts: &[QueryComponent],
) -> Result<Option<ScoredPlan>, PlannerError> {
    let mut subplans = Vec::with_capacity(disjuncts.len());
    for disjunct in disjuncts {
        let Some(scored) = planner.plan_conjunct(context, config, Some(disjunct))? else {
            return Ok(None);
        };
        subplans.push(scored);
    }

    if let Some(collapsed) = collapse_same_base(&subplans) {
        return Ok(Some(collapsed));
    }

    let score = subplans.iter().map(|sub| sub.score).min().unwrap_or(0);

    // A sort demands an ordered, merge-aligned union.
    if context.query.sort.is_some() {
        let orderings: Vec<&PlanOrderingKey> = subplans
            .iter()
            .filter_map(|sub| sub.ordering_key.as_ref())
            .collect();
        if orderings.len() != subplans.len() {
            return Ok(None);
        }

        let Some(comparison_key) = merge_comparison_key(
            &orderings,
            context.query.sort.as_ref(),
            context.common_primary_key.as_ref(),
        ) else {
            return Ok(None);
        };

        let reverse = context.query.sort_reverse;
        let creates_duplicates = subplans.iter().any(|sub| sub.creates_duplicates);
        let ordering_key = subplans[0].ordering_key.clone();

        let plan = RecordQueryPlan::Union {
            comparison_key,
            children: subplans.into_iter().map(|sub| sub.plan).collect(),
            reverse,
        };

        let mut scored = ScoredPlan::new(plan, score);
        scored.creates_duplicates = creates_duplicates;
        scored.ordering_key = ordering_key;
        return Ok(Some(scored));
    }

    // No sort: concatenate branches; overlap is fenced by a distinct
    // wrapper downstream.
    let plan = RecordQueryPlan::UnorderedUnion {
        children: subplans.into_iter().map(|sub| sub.plan).collect(),
    };

    let mut scored = ScoredPlan::new(plan, score);
    scored.creates_duplicates = true;
    Ok(Some(scored))
}

// When every disjunct planned as a residual filter over the same base
// scan, one filter with the OR of the residuals does the same work.
fn collapse_same_base(subplans: &[ScoredPlan]) -> Option<ScoredPlan> {
    let mut filters = Vec::with_capacity(subplans.len());
    let mut base: Option<&RecordQueryPlan> = None;

    for sub in subplans {
        let RecordQueryPlan::Filter { filter, child } = &sub.plan else {
            return None;
        };
        match base {
            None => base = Some(child),
            Some(existing) if existing == &**child => {}
            Some(_) => return None,
        }
        filters.push(filter.clone());
    }

    let base = base?.clone();
    let score = subplans.iter().map(|sub| sub.score).min().unwrap_or(0);
    let creates_duplicates = subplans.iter().any(|sub| sub.creates_duplicates);
    let ordering_key = subplans[0].ordering_key.clone();

    let plan = RecordQueryPlan::filtered(QueryComponent::or(filters), base);

    let mut scored = ScoredPlan::new(plan, score);
    scored.creates_duplicates = creates_duplicates;
    scored.ordering_key = ordering_key;
    Some(scored)
}
