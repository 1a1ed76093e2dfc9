//! Per-candidate matcher: the AndWithThen engine.
//!
//! For one candidate (the record scan or a single index) the matcher walks
//! the scan key's normalized columns left to right, binding compatible
//! filter children into the scan comparisons and consuming requested sort
//! columns along the way. State lives in one matcher value per attempt and
//! is dropped between candidates.
//!
//! "Candidate did not match" is expressed by absence, never by error.

use crate::key::{FanType, KeyExpression};
use crate::model::{IndexKind, IndexModel};
use crate::plan::{
    IndexScanKind, IndexScanPlan, RecordQueryPlan, ScanComparisons, ScanPlan,
};
use crate::planner::context::PlanContext;
use crate::planner::ordering::PlanOrderingKey;
use crate::planner::scored::ScoredPlan;
use crate::planner::{PlannerConfiguration, special};
use crate::query::comparison::{Comparison, ComparisonCategory};
use crate::query::component::QueryComponent;
use crate::value::Value;

/// Match one candidate against the filter and sort, producing a scored
/// plan when the candidate is usable.
pub(crate) fn plan_candidate(
    context: &PlanContext<'_>,
    config: &PlannerConfiguration,
    index: Option<&IndexModel>,
    filter: Option<&QueryComponent>,
) -> Option<ScoredPlan> {
    match index {
        None => match_record_scan(context, filter),
        Some(index) => match index.kind {
            IndexKind::Value => match_value_index(context, config, index, filter),
            IndexKind::Rank => special::plan_rank(context, index, filter),
            IndexKind::Text => special::plan_text(context, index, filter),
            IndexKind::Other => {
                if !config.plan_other_attempt_whole_filter {
                    return None;
                }
                // An opaque maintainer only gets used when it claims the
                // whole filter; partial matches cannot be trusted residual.
                match_value_index(context, config, index, filter)
                    .filter(|scored| scored.unsatisfied_filters.is_empty())
            }
        },
    }
}

///
/// AndWithThenMatcher
///
/// Mutable state for one matching attempt over one candidate.
///

struct AndWithThenMatcher<'a> {
    context: &'a PlanContext<'a>,
    /// Normalized single-column scan key, primary-key padding included.
    columns: Vec<KeyExpression>,
    /// Length of the indexed (scannable) part of `columns`.
    indexed_len: usize,
    children: Vec<QueryComponent>,
    consumed: Vec<bool>,
    comparisons: ScanComparisons,
    /// Comparisons that came from the filter (injections excluded).
    filter_comparison_count: usize,
    sort_columns: Vec<KeyExpression>,
    sort_idx: usize,
    /// Columns bound by a comparison, in column order.
    bound_columns: usize,
    /// Leading columns bound by equalities.
    equality_prefix: usize,
    sealed: bool,
    inequality_on_sort_tail: bool,
}

struct MatchOutcome {
    plan_comparisons: ScanComparisons,
    filter_comparison_count: usize,
    residuals: Vec<QueryComponent>,
    /// The matched scan key, as handed to the matcher.
    columns: Vec<KeyExpression>,
    bound_columns: usize,
    equality_prefix: usize,
    sort_satisfied: bool,
    inequality_on_sort_tail: bool,
    equality_columns: Vec<KeyExpression>,
    ordered_columns: Vec<KeyExpression>,
    fully_bound: bool,
}

impl<'a> AndWithThenMatcher<'a> {
    fn new(
        context: &'a PlanContext<'a>,
        columns: Vec<KeyExpression>,
        indexed_len: usize,
        filter: Option<&QueryComponent>,
    ) -> Self {
        let children = expand_children(filter);
        let consumed = vec![false; children.len()];
        let sort_columns = context
            .query
            .sort
            .as_ref()
            .map(KeyExpression::normalized_columns)
            .unwrap_or_default();

        Self {
            context,
            columns,
            indexed_len,
            children,
            consumed,
            comparisons: ScanComparisons::new(),
            filter_comparison_count: 0,
            sort_columns,
            sort_idx: 0,
            bound_columns: 0,
            equality_prefix: 0,
            sealed: false,
            inequality_on_sort_tail: false,
        }
    }

    /// Bind an equality not derived from the filter (record-type injection).
    fn inject_equality(&mut self, comparison: Comparison) -> bool {
        if !self.comparisons.push_equality(comparison) {
            return false;
        }
        self.consume_sort_column(self.bound_columns);
        self.bound_columns += 1;
        self.equality_prefix += 1;
        true
    }

    fn consume_sort_column(&mut self, column_index: usize) {
        if self.sort_idx < self.sort_columns.len()
            && self.sort_columns[self.sort_idx] == self.columns[column_index]
        {
            self.sort_idx += 1;
        }
    }

    fn sort_satisfied(&self) -> bool {
        self.sort_idx == self.sort_columns.len()
    }

    // Core column loop; see module docs for the per-column rules.
    fn run(mut self) -> Option<MatchOutcome> {
        let mut i = self.bound_columns;
        while i < self.columns.len() {
            if !self.sealed && i < self.indexed_len {
                match self.match_column(i) {
                    ColumnStep::Equality(consumed_columns) => {
                        i += consumed_columns;
                        continue;
                    }
                    ColumnStep::Inequality => {
                        // A range seals comparison matching, not sort
                        // matching: later columns may still order output.
                        i += 1;
                        continue;
                    }
                    ColumnStep::NoMatch => {}
                }
            }

            if self.sort_idx < self.sort_columns.len()
                && self.sort_columns[self.sort_idx] == self.columns[i]
            {
                self.sort_idx += 1;
                i += 1;
                continue;
            }

            break;
        }

        if !self.sort_satisfied() {
            return None;
        }

        let equality_columns: Vec<KeyExpression> =
            self.columns[..self.equality_prefix].to_vec();
        let mut ordered_columns: Vec<KeyExpression> =
            self.columns[self.equality_prefix..].to_vec();
        if let Some(primary_key) = &self.context.common_primary_key {
            for column in primary_key.normalized_columns() {
                if !equality_columns.contains(&column) && !ordered_columns.contains(&column) {
                    ordered_columns.push(column);
                }
            }
        }

        let residuals: Vec<QueryComponent> = self
            .children
            .iter()
            .zip(self.consumed.iter())
            .filter_map(|(child, consumed)| (!consumed).then(|| child.clone()))
            .collect();

        Some(MatchOutcome {
            filter_comparison_count: self.filter_comparison_count,
            residuals,
            bound_columns: self.bound_columns,
            equality_prefix: self.equality_prefix,
            sort_satisfied: true,
            inequality_on_sort_tail: self.inequality_on_sort_tail,
            equality_columns,
            ordered_columns,
            fully_bound: self.bound_columns == self.columns.len(),
            plan_comparisons: self.comparisons,
            columns: self.columns,
        })
    }

    // Attempt a comparison match on column `i`.
    fn match_column(&mut self, i: usize) -> ColumnStep {
        // Whole-key equality: a key comparison spanning several columns.
        if let Some((child_idx, width, comparison)) = self.find_key_span_match(i) {
            self.consumed[child_idx] = true;
            if !self.comparisons.push_equality(comparison) {
                return ColumnStep::NoMatch;
            }
            self.filter_comparison_count += 1;
            for offset in 0..width {
                self.consume_sort_column(i + offset);
            }
            self.bound_columns += width;
            self.equality_prefix += width;
            return ColumnStep::Equality(width);
        }

        let Some((child_idx, comparison)) = self.find_single_column_match(i) else {
            return ColumnStep::NoMatch;
        };

        match comparison.category() {
            ComparisonCategory::Equality => {
                if !self.comparisons.push_equality(comparison) {
                    return ColumnStep::NoMatch;
                }
                self.consumed[child_idx] = true;
                self.filter_comparison_count += 1;
                self.consume_sort_column(i);
                self.bound_columns += 1;
                self.equality_prefix += 1;
                ColumnStep::Equality(1)
            }
            ComparisonCategory::Inequality => {
                if !self.comparisons.push_inequality(comparison) {
                    return ColumnStep::NoMatch;
                }
                self.consumed[child_idx] = true;
                self.filter_comparison_count += 1;
                self.sealed = true;
                if self.sort_idx < self.sort_columns.len()
                    && self.sort_columns[self.sort_idx] == self.columns[i]
                {
                    self.sort_idx += 1;
                    if self.sort_satisfied() {
                        self.inequality_on_sort_tail = true;
                    }
                }
                self.bound_columns += 1;
                ColumnStep::Inequality
            }
            ComparisonCategory::Text | ComparisonCategory::Other => ColumnStep::NoMatch,
        }
    }

    // A `KeyWithComparison` whose key spans columns [i, i+width).
    fn find_key_span_match(&self, i: usize) -> Option<(usize, usize, Comparison)> {
        for (child_idx, child) in self.children.iter().enumerate() {
            if self.consumed[child_idx] {
                continue;
            }
            let QueryComponent::KeyWithComparison { key, comparison } = child else {
                continue;
            };
            if comparison.category() != ComparisonCategory::Equality {
                continue;
            }

            let span = key.normalized_columns();
            let width = span.len();
            if width > 1
                && i + width <= self.indexed_len
                && self.columns[i..i + width] == span[..]
            {
                return Some((child_idx, width, comparison.clone()));
            }
        }

        None
    }

    fn find_single_column_match(&self, i: usize) -> Option<(usize, Comparison)> {
        let column = &self.columns[i];
        for (child_idx, child) in self.children.iter().enumerate() {
            if self.consumed[child_idx] {
                continue;
            }
            if child.constrained_column().as_ref() != Some(column) {
                continue;
            }
            let Some(comparison) = child.comparison().cloned() else {
                continue;
            };
            match comparison.category() {
                ComparisonCategory::Equality | ComparisonCategory::Inequality => {
                    return Some((child_idx, comparison));
                }
                ComparisonCategory::Text | ComparisonCategory::Other => {}
            }
        }

        None
    }
}

enum ColumnStep {
    Equality(usize),
    Inequality,
    NoMatch,
}

// AND-children preparation. Children that descend into the same
// non-repeated parent are split so each nested leaf can bind its own
// column of a nested index key.
fn expand_children(filter: Option<&QueryComponent>) -> Vec<QueryComponent> {
    let mut out = Vec::new();
    let Some(filter) = filter else {
        return out;
    };

    let top: Vec<&QueryComponent> = match filter {
        QueryComponent::And(children) => children.iter().collect(),
        single => vec![single],
    };

    for child in top {
        match child {
            QueryComponent::Nested { parent, child } => match &**child {
                QueryComponent::And(grandchildren) => {
                    for grandchild in grandchildren {
                        out.push(QueryComponent::nested(parent.clone(), grandchild.clone()));
                    }
                }
                _ => out.push(QueryComponent::nested(parent.clone(), (**child).clone())),
            },
            other => out.push(other.clone()),
        }
    }

    out
}

// Unbound fan-out columns make records with empty repeated fields absent
// from the index; scanning would silently drop them.
fn has_unbound_fan_out(columns: &[KeyExpression], bound: usize, indexed_len: usize) -> bool {
    columns
        .iter()
        .take(indexed_len)
        .enumerate()
        .skip(bound)
        .any(|(_, column)| column_has_fan_out(column))
}

fn column_has_fan_out(column: &KeyExpression) -> bool {
    match column {
        KeyExpression::Field { fan, .. } => *fan == FanType::FanOut,
        KeyExpression::Nesting { fan, child, .. } => {
            *fan == FanType::FanOut || column_has_fan_out(child)
        }
        _ => false,
    }
}

fn match_value_index(
    context: &PlanContext<'_>,
    config: &PlannerConfiguration,
    index: &IndexModel,
    filter: Option<&QueryComponent>,
) -> Option<ScoredPlan> {
    let mut columns: Vec<KeyExpression> = index
        .key
        .columns()
        .iter()
        .flat_map(KeyExpression::normalized_columns)
        .collect();
    let indexed_len = columns.len();

    if config.use_full_key_for_value_index
        && let Some(primary_key) = &context.common_primary_key
    {
        for column in primary_key.normalized_columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }

    let matcher = AndWithThenMatcher::new(context, columns, indexed_len, filter);
    let outcome = matcher.run()?;

    // No comparison and no sort consumed: the index brings nothing.
    if outcome.filter_comparison_count == 0 && context.query.sort.is_none() {
        return None;
    }
    if has_unbound_fan_out(&outcome.columns, outcome.bound_columns, indexed_len) {
        return None;
    }

    let reverse = context.query.sort.is_some() && context.query.sort_reverse;
    let strictly_sorted = strictly_sorted(context, Some(index), &outcome, indexed_len);

    let scan = RecordQueryPlan::IndexScan(IndexScanPlan {
        index_name: index.name.clone(),
        scan_kind: IndexScanKind::ByValue,
        comparisons: outcome.plan_comparisons.clone(),
        reverse,
        strictly_sorted,
        creates_duplicates: index.creates_duplicates(),
    });
    let plan = wrap_type_filter_for_index(context, index, scan);

    let ordering_key = PlanOrderingKey {
        equality_columns: outcome.equality_columns.clone(),
        ordered_columns: outcome.ordered_columns.clone(),
        reverse,
    };

    let mut scored = ScoredPlan::new(plan, outcome.filter_comparison_count)
        .with_index(index, index_covers_primary_key(context, index));
    scored.unsatisfied_filters = outcome.residuals;
    scored.creates_duplicates = index.creates_duplicates();
    scored.ordering_key = Some(ordering_key);

    Some(scored)
}

fn match_record_scan(
    context: &PlanContext<'_>,
    filter: Option<&QueryComponent>,
) -> Option<ScoredPlan> {
    let columns = context
        .common_primary_key
        .as_ref()
        .map(KeyExpression::normalized_columns)
        .unwrap_or_default();
    let indexed_len = columns.len();

    let mut matcher = AndWithThenMatcher::new(context, columns, indexed_len, filter);

    // Single-type queries over a type-prefixed key space pin the type
    // column with an equality instead of a type filter.
    let mut type_bound = false;
    if let Some(record_type) = context.single_record_type()
        && matcher.columns.first() == Some(&KeyExpression::RecordTypeKey)
        && !filter_constrains_record_type(&matcher.children)
    {
        type_bound = matcher
            .inject_equality(Comparison::Equals(Value::Text(record_type.name.clone())));
    }

    let outcome = matcher.run()?;

    let reverse = context.query.sort.is_some() && context.query.sort_reverse;
    let strictly_sorted = strictly_sorted(context, None, &outcome, indexed_len);

    let scan = RecordQueryPlan::Scan(ScanPlan {
        comparisons: outcome.plan_comparisons.clone(),
        reverse,
        strictly_sorted,
    });
    let plan = if type_bound || context.query.record_types.is_empty() {
        scan
    } else {
        RecordQueryPlan::type_filtered(context.query.record_types.clone(), scan)
    };

    let ordering_key = PlanOrderingKey {
        equality_columns: outcome.equality_columns.clone(),
        ordered_columns: outcome.ordered_columns.clone(),
        reverse,
    };

    let mut scored = ScoredPlan::new(plan, outcome.filter_comparison_count);
    scored.unsatisfied_filters = outcome.residuals;
    scored.ordering_key = Some(ordering_key);

    Some(scored)
}

// Strictly-sorted rule; every branch is pinned by a spec'd scenario.
fn strictly_sorted(
    context: &PlanContext<'_>,
    index: Option<&IndexModel>,
    outcome: &MatchOutcome,
    indexed_len: usize,
) -> bool {
    if context.query.sort.is_none() || !outcome.sort_satisfied {
        return false;
    }
    if outcome.inequality_on_sort_tail {
        return true;
    }
    if let Some(index) = index
        && index.unique
        && outcome.equality_prefix >= indexed_len
    {
        return true;
    }

    outcome.fully_bound
}

fn filter_constrains_record_type(children: &[QueryComponent]) -> bool {
    children
        .iter()
        .any(|child| matches!(child, QueryComponent::RecordTypeKey(_)))
}

// Indexes shared beyond the requested types need a type filter above the
// scan so foreign records never surface.
pub(crate) fn wrap_type_filter_for_index(
    context: &PlanContext<'_>,
    index: &IndexModel,
    scan: RecordQueryPlan,
) -> RecordQueryPlan {
    let requested: Vec<&str> = context
        .record_types
        .iter()
        .map(|record_type| record_type.name.as_str())
        .collect();

    let exceeds = if index.is_universal() {
        context.metadata.record_types().count() > requested.len()
    } else {
        index
            .record_types
            .iter()
            .any(|name| !requested.contains(&name.as_str()))
    };

    if exceeds {
        RecordQueryPlan::type_filtered(
            requested.iter().map(ToString::to_string).collect(),
            scan,
        )
    } else {
        scan
    }
}

pub(crate) fn index_covers_primary_key(context: &PlanContext<'_>, index: &IndexModel) -> bool {
    context
        .common_primary_key
        .as_ref()
        .is_some_and(|primary_key| primary_key.is_prefix_of(&index.key))
}
