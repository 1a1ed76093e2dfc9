//! The heuristic, rule-based planner.
//!
//! Determinism: candidate indexes are considered in lexicographic name
//! order, selection tie-breaks are strict, and normalization preserves
//! source order of disjuncts, so `plan` is a pure function of (metadata,
//! store state, configuration, query).
//!
//! A planner value holds no mutable state between calls; concurrent calls
//! against the same planner are sound because every call works on its own
//! [`context::PlanContext`].

pub(crate) mod context;
pub(crate) mod in_extract;
pub(crate) mod intersection;
pub(crate) mod matcher;
pub(crate) mod ordering;
pub(crate) mod post;
pub(crate) mod scored;
pub(crate) mod special;
pub(crate) mod union;

#[cfg(test)]
mod tests;

use crate::error::InternalError;
use crate::key::{KeyExpression, KeyExpressionError};
use crate::model::{MetadataError, MetadataModel, StoreState};
use crate::plan::{
    IndexScanKind, IndexScanPlan, InValuesSource, RecordQueryPlan, ScanComparisons,
};
use crate::planner::context::{PlanContext, build_context};
use crate::planner::in_extract::{ExtractedIn, extract_in_clauses};
use crate::planner::ordering::merge_comparison_key;
use crate::planner::scored::{ScoredPlan, better_than};
use crate::query::component::QueryComponent;
use crate::query::normalize::{NormalizeOptions, estimate_dnf_terms, normalize};
use crate::query::{ComparisonCategory, RecordQuery};
use thiserror::Error as ThisError;
use tracing::{debug, trace};

///
/// IndexScanPreference
/// Tie-break between the record scan and a single-index plan.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum IndexScanPreference {
    PreferIndex,
    #[default]
    PreferScan,
    /// Prefer only indexes whose key starts with the common primary key.
    PreferPrimaryKeyIndex,
}

///
/// PlannerConfiguration
///
/// Immutable configuration passed into each planning call. No process-wide
/// state; callers clone and adjust.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlannerConfiguration {
    pub index_scan_preference: IndexScanPreference,
    /// Maximum plan complexity before rejection.
    pub complexity_threshold: usize,
    /// On a sort-incompatible IN, rewrite back into an explicit OR.
    pub attempt_failed_in_join_as_or: bool,
    /// On a sort-incompatible IN, build an ordered IN-union.
    pub attempt_failed_in_join_as_union: bool,
    /// Upper bound on per-source IN-union width.
    pub attempt_failed_in_join_as_union_max_size: usize,
    /// Enable the residual-filter push-down visitor set.
    pub defer_fetch_after_union_and_intersection: bool,
    /// Partition residuals into index-entry-evaluable vs record filters.
    pub optimize_for_index_filters: bool,
    /// Opaque index maintainers may claim the whole filter first.
    pub plan_other_attempt_whole_filter: bool,
    /// Append the primary-key suffix to value-index keys for matching.
    pub use_full_key_for_value_index: bool,
    /// Permit an in-memory sort when no index realizes the sort.
    pub allow_in_memory_sort: bool,
    /// Maximum disjunction width from AND-over-OR distribution.
    pub max_or_distribution_width: usize,
    /// Estimated-term budget for full DNF normalization.
    pub dnf_term_budget: usize,
}

impl Default for PlannerConfiguration {
    fn default() -> Self {
        Self {
            index_scan_preference: IndexScanPreference::default(),
            complexity_threshold: 3000,
            attempt_failed_in_join_as_or: true,
            attempt_failed_in_join_as_union: false,
            attempt_failed_in_join_as_union_max_size: 10,
            defer_fetch_after_union_and_intersection: false,
            optimize_for_index_filters: false,
            plan_other_attempt_whole_filter: true,
            use_full_key_for_value_index: true,
            allow_in_memory_sort: false,
            max_or_distribution_width: 9,
            dnf_term_budget: 128,
        }
    }
}

impl PlannerConfiguration {
    pub(crate) const fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            max_or_distribution_width: self.max_or_distribution_width,
            dnf_term_budget: self.dnf_term_budget,
        }
    }
}

///
/// PlannerError
///

#[derive(Debug, ThisError)]
pub enum PlannerError {
    #[error("metadata error: {message}")]
    Metadata { message: String },

    /// A sort was requested with no filter to anchor an index choice and
    /// no candidate key space ordered by it.
    #[error("no index orders records by {sort}")]
    NoIndexForSort { sort: String },

    #[error("sort {sort} cannot be satisfied by any candidate plan")]
    UnsatisfiableSort { sort: String },

    #[error("plan complexity {complexity} exceeds configured threshold {threshold}")]
    PlanTooComplex {
        complexity: usize,
        threshold: usize,
        /// The offending plan, attached for diagnostics.
        plan: Box<RecordQueryPlan>,
    },

    #[error("invalid expression: {0}")]
    InvalidExpression(#[from] KeyExpressionError),

    #[error("{0}")]
    Internal(Box<InternalError>),
}

impl From<MetadataError> for PlannerError {
    fn from(err: MetadataError) -> Self {
        Self::Metadata {
            message: err.to_string(),
        }
    }
}

impl From<InternalError> for PlannerError {
    fn from(err: InternalError) -> Self {
        Self::Internal(Box::new(err))
    }
}

///
/// RecordQueryPlanner
///
/// Entry point. Holds the immutable metadata view, the store-readability
/// snapshot, and the configuration; each `plan` call is synchronous and
/// self-contained.
///

#[derive(Clone, Debug)]
pub struct RecordQueryPlanner {
    metadata: MetadataModel,
    store_state: StoreState,
    configuration: PlannerConfiguration,
}

impl RecordQueryPlanner {
    #[must_use]
    pub fn new(metadata: MetadataModel, store_state: StoreState) -> Self {
        Self {
            metadata,
            store_state,
            configuration: PlannerConfiguration::default(),
        }
    }

    #[must_use]
    pub fn with_configuration(mut self, configuration: PlannerConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    #[must_use]
    pub const fn configuration(&self) -> &PlannerConfiguration {
        &self.configuration
    }

    pub fn set_configuration(&mut self, configuration: PlannerConfiguration) {
        self.configuration = configuration;
    }

    /// Plan one query into an executable plan tree.
    pub fn plan(&self, query: &RecordQuery) -> Result<RecordQueryPlan, PlannerError> {
        if let Some(sort) = &query.sort {
            sort.validate_sort()?;
        }

        let config = &self.configuration;
        let context = build_context(&self.metadata, &self.store_state, query)?;
        let normalized = query
            .filter
            .as_ref()
            .map(|filter| normalize(filter, &config.normalize_options()));

        let scored = self.plan_filter(&context, config, normalized.as_ref())?;
        if let Some(scored) = scored {
            return self.finish(query, context.common_primary_key.as_ref(), scored);
        }

        // Nothing realizes the sort in scan order.
        let Some(sort) = &query.sort else {
            return Err(InternalError::unexpected(
                "planning produced no plan for a sortless query",
            )
            .into());
        };
        if config.allow_in_memory_sort {
            return self.plan_with_memory_sort(query, normalized.as_ref());
        }
        if query.filter.is_none() {
            return Err(PlannerError::NoIndexForSort {
                sort: sort.to_string(),
            });
        }
        Err(PlannerError::UnsatisfiableSort {
            sort: sort.to_string(),
        })
    }

    // Sort fallback: plan without the sort and re-order in memory.
    fn plan_with_memory_sort(
        &self,
        query: &RecordQuery,
        filter: Option<&QueryComponent>,
    ) -> Result<RecordQueryPlan, PlannerError> {
        let config = &self.configuration;
        let mut sortless = query.clone();
        let sort = sortless.sort.take().unwrap_or(KeyExpression::Empty);
        let reverse = std::mem::replace(&mut sortless.sort_reverse, false);

        let context = build_context(&self.metadata, &self.store_state, &sortless)?;
        let Some(mut scored) = self.plan_filter(&context, config, filter)? else {
            return Err(InternalError::unexpected(
                "planning produced no plan for a sortless query",
            )
            .into());
        };

        debug!(sort = %sort, "falling back to in-memory sort");
        scored.plan = RecordQueryPlan::Sort {
            key: sort,
            reverse,
            child: Box::new(scored.plan),
        };
        self.finish(&sortless, context.common_primary_key.as_ref(), scored)
    }

    // Shared tail: distinct insertion, covering rewrite, filter pushdown,
    // and the complexity guard.
    fn finish(
        &self,
        query: &RecordQuery,
        common_primary_key: Option<&KeyExpression>,
        scored: ScoredPlan,
    ) -> Result<RecordQueryPlan, PlannerError> {
        let config = &self.configuration;
        let mut plan = scored.plan;

        if scored.creates_duplicates && query.remove_duplicates {
            if common_primary_key.is_none() {
                return Err(PlannerError::Metadata {
                    message: "no common primary key to remove duplicates by".to_string(),
                });
            }
            plan = RecordQueryPlan::distinct(plan);
        }

        if let Some(required) = &query.required_results
            && let Some(covering) =
                post::try_covering(&self.metadata, common_primary_key, &plan, required)
        {
            trace!("covering rewrite removed the record fetch");
            plan = covering;
        }

        if config.defer_fetch_after_union_and_intersection {
            plan = post::push_residual_filters(plan);
        }

        let complexity = plan.complexity();
        if complexity > config.complexity_threshold {
            return Err(PlannerError::PlanTooComplex {
                complexity,
                threshold: config.complexity_threshold,
                plan: Box::new(plan),
            });
        }

        debug!(complexity, plan = %plan, "plan chosen");
        Ok(plan)
    }

    // Boolean-shape dispatch: disjunctions become unions, conjunctions go
    // through IN extraction and per-candidate matching.
    fn plan_filter(
        &self,
        context: &PlanContext<'_>,
        config: &PlannerConfiguration,
        filter: Option<&QueryComponent>,
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        match filter {
            Some(QueryComponent::Or(disjuncts)) => {
                union::plan_or(self, context, config, disjuncts)
            }
            Some(single) => {
                if let Some(extraction) = extract_in_clauses(single) {
                    let in_plan = self.plan_in(context, config, &extraction)?;
                    let direct = self.plan_conjunct(context, config, Some(single))?;
                    return Ok(pick_better(in_plan, direct, config));
                }
                self.plan_conjunct(context, config, Some(single))
            }
            None => self.plan_conjunct(context, config, None),
        }
    }

    // IN-join planning: parameterize the scan, then order the outer value
    // lists so iteration order realizes the sort.
    fn plan_in(
        &self,
        context: &PlanContext<'_>,
        config: &PlannerConfiguration,
        extraction: &ExtractedIn,
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        let sub = self.plan_conjunct(context, config, Some(&extraction.sub_filter))?;

        if let Some(sub) = &sub {
            let sort_columns = context
                .query
                .sort
                .as_ref()
                .map(KeyExpression::normalized_columns)
                .unwrap_or_default();
            let bound_columns = sub
                .ordering_key
                .as_ref()
                .map(|ordering| ordering.equality_columns.clone())
                .unwrap_or_default();

            if let Some(sources) = in_extract::order_sources_for_sort(
                extraction,
                &sort_columns,
                &bound_columns,
                context.query.sort_reverse,
            ) {
                let creates_duplicates =
                    sub.creates_duplicates || has_fan_out_source(extraction);
                let plan = RecordQueryPlan::InJoin {
                    sources,
                    child: Box::new(sub.plan.clone()),
                };

                let mut scored = ScoredPlan::new(plan, sub.score);
                scored.creates_duplicates = creates_duplicates;
                return Ok(Some(scored));
            }
        }

        self.plan_in_fallback(context, config, extraction, sub.as_ref())
    }

    // Sort-incompatible IN: IN-union or explicit-OR rewrite, by config.
    fn plan_in_fallback(
        &self,
        context: &PlanContext<'_>,
        config: &PlannerConfiguration,
        extraction: &ExtractedIn,
        sub: Option<&ScoredPlan>,
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        if config.attempt_failed_in_join_as_union
            && let Some(sub) = sub
            && extraction.sources.iter().all(|source| {
                source.values.len() <= config.attempt_failed_in_join_as_union_max_size
            })
            && let Some(ordering) = &sub.ordering_key
            && let Some(comparison_key) = merge_comparison_key(
                &[ordering],
                context.query.sort.as_ref(),
                context.common_primary_key.as_ref(),
            )
        {
            let reverse = context.query.sort_reverse;
            let sources: Vec<InValuesSource> = extraction
                .sources
                .iter()
                .map(|source| {
                    let mut values = source.values.clone();
                    values.sort_by(crate::value::canonical_cmp);
                    if reverse {
                        values.reverse();
                    }
                    values.dedup();
                    InValuesSource {
                        parameter: source.parameter.clone(),
                        values,
                        sort_values: true,
                        sort_reverse: reverse,
                    }
                })
                .collect();

            let creates_duplicates = sub.creates_duplicates || has_fan_out_source(extraction);
            let plan = RecordQueryPlan::InUnion {
                sources,
                comparison_key,
                child: Box::new(sub.plan.clone()),
                reverse,
            };

            let mut scored = ScoredPlan::new(plan, sub.score);
            scored.creates_duplicates = creates_duplicates;
            scored.ordering_key = sub.ordering_key.clone();
            return Ok(Some(scored));
        }

        if config.attempt_failed_in_join_as_or {
            let expanded = in_extract::expand_as_or(extraction);
            if estimate_dnf_terms(&expanded) <= config.dnf_term_budget {
                let normalized = normalize(&expanded, &config.normalize_options());
                trace!("IN rewritten as explicit OR");
                return self.plan_filter(context, config, Some(&normalized));
            }
        }

        Ok(None)
    }

    // Per-candidate matching, selection, intersection, residual wrapping.
    pub(crate) fn plan_conjunct(
        &self,
        context: &PlanContext<'_>,
        config: &PlannerConfiguration,
        filter: Option<&QueryComponent>,
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        let mut candidates = Vec::with_capacity(context.candidate_indexes.len() + 1);

        if let Some(scored) = matcher::plan_candidate(context, config, None, filter) {
            trace!(score = scored.score, "record scan candidate");
            candidates.push(scored);
        }
        for index in context.candidate_indexes.iter().copied() {
            if let Some(mut scored) = matcher::plan_candidate(context, config, Some(index), filter)
            {
                self.partition_index_filters(context, config, &mut scored);
                trace!(index = %index.name, score = scored.score, "index candidate");
                candidates.push(scored);
            }
        }

        if candidates.is_empty() {
            return Ok(None);
        }

        let mut best_idx = 0;
        for i in 1..candidates.len() {
            if better_than(
                &candidates[i],
                &candidates[best_idx],
                config.index_scan_preference,
            ) {
                best_idx = i;
            }
        }
        let best = candidates.remove(best_idx);
        let others = candidates;

        let combined = if best.unsatisfied_filters.is_empty() {
            None
        } else {
            intersection::try_ordered_intersection(context, config, &best, &others)?
        };

        let chosen = combined.unwrap_or(best);
        Ok(Some(apply_residuals(chosen)))
    }

    // Split residuals into index-entry filters (evaluated before fetch)
    // and record filters, when enabled and the candidate is a value scan.
    fn partition_index_filters(
        &self,
        context: &PlanContext<'_>,
        config: &PlannerConfiguration,
        scored: &mut ScoredPlan,
    ) {
        if !config.optimize_for_index_filters {
            return;
        }
        let Some(index_name) = &scored.index_name else {
            return;
        };
        let Some(entry) = post::entry_columns(
            &self.metadata,
            context.common_primary_key.as_ref(),
            index_name,
        ) else {
            return;
        };

        let (entry_evaluable, residual): (Vec<_>, Vec<_>) = scored
            .unsatisfied_filters
            .drain(..)
            .partition(|component| component.is_evaluable_on_entry(&entry));
        scored.index_filters = entry_evaluable;
        scored.unsatisfied_filters = residual;
    }

    /// Plan a covering aggregate over the named grouped index: the filter
    /// must pin a prefix of the group columns with equalities. Returns
    /// None when the index cannot satisfy the aggregate requirement.
    pub fn plan_covering_aggregate(
        &self,
        query: &RecordQuery,
        index_name: &str,
    ) -> Result<Option<RecordQueryPlan>, PlannerError> {
        let index = self.metadata.index(index_name).map_err(PlannerError::from)?;
        let KeyExpression::Grouping { .. } = &index.key else {
            return Ok(None);
        };
        if query.sort.is_some() {
            return Ok(None);
        }

        let children: Vec<QueryComponent> = match &query.filter {
            None => Vec::new(),
            Some(QueryComponent::And(children)) => children.clone(),
            Some(single) => vec![single.clone()],
        };

        let (group_columns, _) = index.key.grouping_split();
        let mut comparisons = ScanComparisons::new();
        let mut consumed = vec![false; children.len()];

        for column in &group_columns {
            let found = children.iter().enumerate().find(|(i, child)| {
                !consumed[*i]
                    && child.constrained_column().as_ref() == Some(column)
                    && child
                        .comparison()
                        .is_some_and(|c| c.category() == ComparisonCategory::Equality)
            });
            let Some((i, child)) = found else {
                break;
            };
            let Some(comparison) = child.comparison() else {
                break;
            };
            if !comparisons.push_equality(comparison.clone()) {
                return Ok(None);
            }
            consumed[i] = true;
        }

        // The whole filter must be absorbed by the group prefix.
        if consumed.iter().any(|used| !used) {
            return Ok(None);
        }

        let scan = RecordQueryPlan::IndexScan(IndexScanPlan {
            index_name: index.name.clone(),
            scan_kind: IndexScanKind::ByValue,
            comparisons,
            reverse: false,
            strictly_sorted: false,
            creates_duplicates: index.creates_duplicates(),
        });
        Ok(Some(RecordQueryPlan::CoveringIndexScan(
            crate::plan::CoveringIndexScanPlan {
                inner: Box::new(scan),
                fields: group_columns,
            },
        )))
    }
}

fn apply_residuals(scored: ScoredPlan) -> ScoredPlan {
    let ScoredPlan {
        mut plan,
        score,
        unsatisfied_filters,
        index_filters,
        creates_duplicates,
        included_rank_comparisons,
        ordering_key,
        index_name,
        index_size_overhead,
        index_covers_primary_key,
    } = scored;

    if !index_filters.is_empty() {
        plan = RecordQueryPlan::IndexEntryFilter {
            filter: QueryComponent::and(index_filters.clone()),
            child: Box::new(plan),
        };
    }
    if !unsatisfied_filters.is_empty() {
        plan = RecordQueryPlan::filtered(QueryComponent::and(unsatisfied_filters.clone()), plan);
    }

    ScoredPlan {
        plan,
        score,
        unsatisfied_filters,
        index_filters,
        creates_duplicates,
        included_rank_comparisons,
        ordering_key,
        index_name,
        index_size_overhead,
        index_covers_primary_key,
    }
}

fn pick_better(
    in_plan: Option<ScoredPlan>,
    direct: Option<ScoredPlan>,
    config: &PlannerConfiguration,
) -> Option<ScoredPlan> {
    match (in_plan, direct) {
        (Some(in_plan), Some(direct)) => {
            if better_than(&direct, &in_plan, config.index_scan_preference) {
                Some(direct)
            } else {
                Some(in_plan)
            }
        }
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

fn has_fan_out_source(extraction: &ExtractedIn) -> bool {
    extraction.sources.iter().any(|source| {
        matches!(
            &source.column,
            KeyExpression::Field {
                fan: crate::key::FanType::FanOut,
                ..
            }
        )
    })
}
