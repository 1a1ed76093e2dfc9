//! IN extraction: rewrite equality-with-list leaves into parameterized
//! equalities driven by an outer value list.

use crate::key::KeyExpression;
use crate::plan::InValuesSource;
use crate::query::comparison::Comparison;
use crate::query::component::QueryComponent;
use crate::value::Value;

///
/// ExtractedSource
/// One IN leaf pulled out of the filter.
///

#[derive(Clone, Debug)]
pub(crate) struct ExtractedSource {
    pub parameter: String,
    pub values: Vec<Value>,
    /// The key column the parameter equality binds in the sub-filter.
    pub column: KeyExpression,
    /// Original leaf, for OR-expansion fallback.
    pub original: QueryComponent,
}

///
/// ExtractedIn
/// The rewritten filter plus its outer value sources.
///

#[derive(Clone, Debug)]
pub(crate) struct ExtractedIn {
    pub sources: Vec<ExtractedSource>,
    pub sub_filter: QueryComponent,
}

/// Pull `field IN list` leaves out of a top-level AND, replacing each with
/// an equality against an outer-bound parameter. Returns None when the
/// filter carries no extractable IN.
pub(crate) fn extract_in_clauses(filter: &QueryComponent) -> Option<ExtractedIn> {
    let children: Vec<QueryComponent> = match filter {
        QueryComponent::And(children) => children.clone(),
        single => vec![single.clone()],
    };

    let mut sources = Vec::new();
    let mut rewritten = Vec::with_capacity(children.len());

    for child in children {
        match &child {
            QueryComponent::Field {
                field,
                comparison: Comparison::In(values),
            } if !values.is_empty() => {
                let parameter = format!("__in_{field}__{}", sources.len());
                rewritten.push(QueryComponent::field(
                    field.clone(),
                    Comparison::Parameter(parameter.clone()),
                ));
                sources.push(ExtractedSource {
                    parameter,
                    values: values.clone(),
                    column: KeyExpression::field(field.clone()),
                    original: child.clone(),
                });
            }
            QueryComponent::OneOfThem {
                field,
                comparison: Comparison::In(values),
            } if !values.is_empty() => {
                let parameter = format!("__in_{field}__{}", sources.len());
                rewritten.push(QueryComponent::one_of_them(
                    field.clone(),
                    Comparison::Parameter(parameter.clone()),
                ));
                sources.push(ExtractedSource {
                    parameter,
                    values: values.clone(),
                    column: KeyExpression::fan_out(field.clone()),
                    original: child.clone(),
                });
            }
            _ => rewritten.push(child),
        }
    }

    if sources.is_empty() {
        return None;
    }

    Some(ExtractedIn {
        sources,
        sub_filter: QueryComponent::and(rewritten),
    })
}

/// Order the extracted sources so the outer iteration, concatenated with
/// the subplan's output, realizes the requested sort.
///
/// Each sort column must be pinned by a constant equality, driven by a
/// sorted source (in sort-column order, outermost first), or provided by
/// the subplan's own ordering once no non-sort source remains.
pub(crate) fn order_sources_for_sort(
    extraction: &ExtractedIn,
    sort_columns: &[KeyExpression],
    bound_columns: &[KeyExpression],
    sort_reverse: bool,
) -> Option<Vec<InValuesSource>> {
    // Every parameter must actually be sarged into the subplan's scan.
    if extraction
        .sources
        .iter()
        .any(|source| !bound_columns.contains(&source.column))
    {
        return None;
    }

    if sort_columns.is_empty() {
        return Some(
            extraction
                .sources
                .iter()
                .map(|source| to_values_source(source, false, false))
                .collect(),
        );
    }

    let constant_bound: Vec<&KeyExpression> = bound_columns
        .iter()
        .filter(|column| {
            !extraction
                .sources
                .iter()
                .any(|source| source.column == **column)
        })
        .collect();

    let mut ordered = Vec::new();
    let mut placed = vec![false; extraction.sources.len()];

    for sort_column in sort_columns {
        if let Some((i, source)) = extraction
            .sources
            .iter()
            .enumerate()
            .find(|(i, source)| !placed[*i] && source.column == *sort_column)
        {
            placed[i] = true;
            ordered.push(to_values_source(source, true, sort_reverse));
            continue;
        }
        if constant_bound.contains(&sort_column) {
            continue;
        }

        // From here the subplan's own ordering must carry the sort; any
        // unplaced source iterating inside would reshuffle it.
        if placed.iter().any(|placed| !placed) {
            return None;
        }
        break;
    }

    // Sources on non-sort columns iterate innermost; the sort columns are
    // all pinned per combination, so order within one combination holds.
    for (i, source) in extraction.sources.iter().enumerate() {
        if !placed[i] {
            ordered.push(to_values_source(source, false, false));
        }
    }

    Some(ordered)
}

/// Expand the extracted IN leaves back into explicit ORs of equalities.
pub(crate) fn expand_as_or(extraction: &ExtractedIn) -> QueryComponent {
    let rewritten = match &extraction.sub_filter {
        QueryComponent::And(children) => children.clone(),
        single => vec![single.clone()],
    };

    let expanded = rewritten
        .into_iter()
        .map(|child| {
            let parameter = match child.comparison() {
                Some(Comparison::Parameter(name)) => Some(name.clone()),
                _ => None,
            };
            let Some(parameter) = parameter else {
                return child;
            };
            let Some(source) = extraction
                .sources
                .iter()
                .find(|source| source.parameter == parameter)
            else {
                return child;
            };

            QueryComponent::or(
                source
                    .values
                    .iter()
                    .map(|value| {
                        replace_comparison(&source.original, Comparison::Equals(value.clone()))
                    })
                    .collect(),
            )
        })
        .collect();

    QueryComponent::and(expanded)
}

fn replace_comparison(leaf: &QueryComponent, comparison: Comparison) -> QueryComponent {
    match leaf {
        QueryComponent::OneOfThem { field, .. } => {
            QueryComponent::one_of_them(field.clone(), comparison)
        }
        QueryComponent::Field { field, .. } => QueryComponent::field(field.clone(), comparison),
        other => other.clone(),
    }
}

fn to_values_source(source: &ExtractedSource, sorted: bool, reverse: bool) -> InValuesSource {
    let mut values = source.values.clone();
    if sorted {
        values.sort_by(crate::value::canonical_cmp);
        if reverse {
            values.reverse();
        }
        values.dedup();
    }

    InValuesSource {
        parameter: source.parameter.clone(),
        values,
        sort_values: sorted,
        sort_reverse: reverse,
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn in_leaf(field: &str, values: &[i64]) -> QueryComponent {
        QueryComponent::field(
            field,
            Comparison::In(values.iter().map(|n| Value::Int(*n)).collect()),
        )
    }

    fn eq(field: &str, n: i64) -> QueryComponent {
        QueryComponent::field(field, Comparison::Equals(Value::Int(n)))
    }

    #[test]
    fn extraction_replaces_in_with_parameter() {
        let filter = QueryComponent::and(vec![in_leaf("name", &[1, 2]), eq("age", 30)]);
        let extracted = extract_in_clauses(&filter).expect("one IN leaf");

        assert_eq!(extracted.sources.len(), 1);
        assert_eq!(extracted.sources[0].values.len(), 2);
        assert_eq!(
            extracted.sub_filter,
            QueryComponent::and(vec![
                QueryComponent::field(
                    "name",
                    Comparison::Parameter("__in_name__0".to_string()),
                ),
                eq("age", 30),
            ])
        );
    }

    #[test]
    fn no_in_leaves_means_no_extraction() {
        assert!(extract_in_clauses(&eq("age", 30)).is_none());
    }

    #[test]
    fn sorted_source_values_are_deduped_and_ordered() {
        let filter = in_leaf("name", &[3, 1, 3, 2]);
        let extracted = extract_in_clauses(&filter).expect("extractable");

        let sources = order_sources_for_sort(
            &extracted,
            &[KeyExpression::field("name")],
            &[KeyExpression::field("name")],
            false,
        )
        .expect("orderable");

        assert_eq!(
            sources[0].values,
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
        assert!(sources[0].sort_values);
    }

    #[test]
    fn unsargable_parameter_rejects_the_join() {
        let filter = in_leaf("name", &[1]);
        let extracted = extract_in_clauses(&filter).expect("extractable");

        assert!(order_sources_for_sort(&extracted, &[], &[], false).is_none());
    }

    #[test]
    fn subplan_provided_sort_tolerates_no_free_sources() {
        // Sort on "age" is neither constant-bound nor source-driven; the
        // "name" source would reshuffle it.
        let filter = QueryComponent::and(vec![in_leaf("name", &[1, 2]), gt_age()]);
        let extracted = extract_in_clauses(&filter).expect("extractable");

        assert!(
            order_sources_for_sort(
                &extracted,
                &[KeyExpression::field("age")],
                &[KeyExpression::field("name")],
                false,
            )
            .is_none()
        );
    }

    fn gt_age() -> QueryComponent {
        QueryComponent::field("age", Comparison::GreaterThan(Value::Int(1)))
    }

    #[test]
    fn constant_bound_sort_column_frees_source_order() {
        // age = 30 pins the sort column; the name source may iterate in
        // any order.
        let filter = QueryComponent::and(vec![in_leaf("name", &[2, 1]), eq("age", 30)]);
        let extracted = extract_in_clauses(&filter).expect("extractable");

        let sources = order_sources_for_sort(
            &extracted,
            &[KeyExpression::field("age")],
            &[KeyExpression::field("name"), KeyExpression::field("age")],
            false,
        )
        .expect("orderable");

        assert_eq!(sources.len(), 1);
        assert!(!sources[0].sort_values);
    }

    #[test]
    fn or_expansion_restores_equalities() {
        let filter = QueryComponent::and(vec![in_leaf("name", &[1, 2]), eq("age", 30)]);
        let extracted = extract_in_clauses(&filter).expect("extractable");

        assert_eq!(
            expand_as_or(&extracted),
            QueryComponent::and(vec![
                QueryComponent::or(vec![eq("name", 1), eq("name", 2)]),
                eq("age", 30),
            ])
        );
    }
}
