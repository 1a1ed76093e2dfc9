//! Canonicalize boolean filter shape without exploding size.
//!
//! Normalization guarantees:
//! - Logical equivalence is preserved
//! - Nested AND / OR nodes are flattened
//! - Double negation is eliminated; NOT pushes into complementable leaves
//! - Disjunct order is preserved (union plans keep source order)
//!
//! Full disjunctive normal form is attempted only while the estimated term
//! count stays within `dnf_term_budget`. Below that, one AND-over-OR
//! distribution is applied when it makes a union plan reachable.

use crate::query::component::QueryComponent;

///
/// NormalizeOptions
/// Expansion budgets; both bound the output size, not the input size.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NormalizeOptions {
    /// Maximum disjunction width produced by AND-over-OR distribution.
    pub max_or_distribution_width: usize,
    /// Maximum estimated DNF term count before conversion is abandoned.
    pub dnf_term_budget: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_or_distribution_width: 9,
            dnf_term_budget: 128,
        }
    }
}

/// Normalize a filter into the planner's canonical form.
#[must_use]
pub fn normalize(component: &QueryComponent, options: &NormalizeOptions) -> QueryComponent {
    let simplified = simplify(component);

    if estimate_dnf_terms(&simplified) <= options.dnf_term_budget {
        let dnf = to_dnf(&simplified);
        if estimate_dnf_terms(&dnf) <= options.dnf_term_budget {
            return dnf;
        }
    }

    distribute_single_or(simplified, options.max_or_distribution_width)
}

// Structural pass: flatten, drop double negation, push NOT into leaves.
fn simplify(component: &QueryComponent) -> QueryComponent {
    match component {
        QueryComponent::And(children) => {
            QueryComponent::and(children.iter().map(simplify).collect())
        }
        QueryComponent::Or(children) => {
            QueryComponent::or(children.iter().map(simplify).collect())
        }
        QueryComponent::Not(child) => simplify_not(child),
        leaf => leaf.clone(),
    }
}

fn simplify_not(child: &QueryComponent) -> QueryComponent {
    match simplify(child) {
        QueryComponent::Not(inner) => *inner,
        leaf => {
            if let Some(comparison) = leaf.comparison()
                && let Some(complement) = comparison.complement()
            {
                return with_comparison(&leaf, complement);
            }

            QueryComponent::not(leaf)
        }
    }
}

// Rebuild a scalar comparison leaf with the complemented comparison.
// Repeated-field leaves stay residual: NOT(any element = x) is not
// "any element != x".
fn with_comparison(
    leaf: &QueryComponent,
    comparison: crate::query::comparison::Comparison,
) -> QueryComponent {
    match leaf {
        QueryComponent::Field { field, .. } => QueryComponent::Field {
            field: field.clone(),
            comparison,
        },
        QueryComponent::RecordTypeKey(_) => QueryComponent::RecordTypeKey(comparison),
        QueryComponent::KeyWithComparison { key, .. } if !key.creates_duplicates() => {
            QueryComponent::KeyWithComparison {
                key: key.clone(),
                comparison,
            }
        }
        QueryComponent::RecordFunction { function, .. } => QueryComponent::RecordFunction {
            function: function.clone(),
            comparison,
        },
        other => QueryComponent::not(other.clone()),
    }
}

/// Structural estimate of the DNF term count, saturating.
#[must_use]
pub fn estimate_dnf_terms(component: &QueryComponent) -> usize {
    match component {
        QueryComponent::And(children) => children
            .iter()
            .map(estimate_dnf_terms)
            .fold(1usize, usize::saturating_mul),
        QueryComponent::Or(children) => children
            .iter()
            .map(estimate_dnf_terms)
            .fold(0usize, usize::saturating_add),
        QueryComponent::Not(child) => estimate_dnf_terms(child),
        _ => 1,
    }
}

// Full DNF by distribution; NOT over And/Or obeys De Morgan. The caller
// has already bounded the estimated term count.
fn to_dnf(component: &QueryComponent) -> QueryComponent {
    match component {
        QueryComponent::Or(children) => {
            QueryComponent::or(children.iter().map(to_dnf).collect())
        }
        QueryComponent::And(children) => {
            let mut terms: Vec<Vec<QueryComponent>> = vec![Vec::new()];
            for child in children {
                let disjuncts = match to_dnf(child) {
                    QueryComponent::Or(ds) => ds,
                    other => vec![other],
                };

                let mut next = Vec::with_capacity(terms.len() * disjuncts.len());
                for term in &terms {
                    for disjunct in &disjuncts {
                        let mut extended = term.clone();
                        extended.push(disjunct.clone());
                        next.push(extended);
                    }
                }
                terms = next;
            }

            QueryComponent::or(terms.into_iter().map(QueryComponent::and).collect())
        }
        QueryComponent::Not(child) => match &**child {
            QueryComponent::And(children) => to_dnf(&QueryComponent::or(
                children.iter().cloned().map(QueryComponent::not).collect(),
            )),
            QueryComponent::Or(children) => to_dnf(&QueryComponent::and(
                children.iter().cloned().map(QueryComponent::not).collect(),
            )),
            leaf => simplify_not(leaf),
        },
        leaf => leaf.clone(),
    }
}

// The limited distribution of spec'd shape: AND with exactly one OR child
// and only comparison-leaf siblings. Applied at most once.
fn distribute_single_or(component: QueryComponent, max_width: usize) -> QueryComponent {
    let QueryComponent::And(children) = &component else {
        return component;
    };

    let or_positions: Vec<usize> = children
        .iter()
        .enumerate()
        .filter_map(|(i, child)| matches!(child, QueryComponent::Or(_)).then_some(i))
        .collect();
    let [or_position] = or_positions.as_slice() else {
        return component;
    };

    let siblings_are_leaves = children
        .iter()
        .enumerate()
        .all(|(i, child)| i == *or_position || child.comparison().is_some());
    if !siblings_are_leaves {
        return component;
    }

    let QueryComponent::Or(disjuncts) = &children[*or_position] else {
        return component;
    };
    if disjuncts.len() > max_width {
        return component;
    }

    let siblings: Vec<QueryComponent> = children
        .iter()
        .enumerate()
        .filter_map(|(i, child)| (i != *or_position).then(|| child.clone()))
        .collect();

    QueryComponent::or(
        disjuncts
            .iter()
            .map(|disjunct| {
                let mut term = siblings.clone();
                term.push(disjunct.clone());
                QueryComponent::and(term)
            })
            .collect(),
    )
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::comparison::Comparison;
    use crate::value::Value;

    fn eq(field: &str, n: i64) -> QueryComponent {
        QueryComponent::field(field, Comparison::Equals(Value::Int(n)))
    }

    fn gt(field: &str, n: i64) -> QueryComponent {
        QueryComponent::field(field, Comparison::GreaterThan(Value::Int(n)))
    }

    #[test]
    fn double_negation_is_eliminated() {
        let filter = QueryComponent::not(QueryComponent::not(eq("a", 1)));
        assert_eq!(normalize(&filter, &NormalizeOptions::default()), eq("a", 1));
    }

    #[test]
    fn not_pushes_into_complementable_leaf() {
        let filter = QueryComponent::not(gt("a", 1));
        assert_eq!(
            normalize(&filter, &NormalizeOptions::default()),
            QueryComponent::field("a", Comparison::LessThanOrEquals(Value::Int(1)))
        );
    }

    #[test]
    fn not_without_complement_stays_residual() {
        let filter = QueryComponent::not(QueryComponent::field(
            "a",
            Comparison::In(vec![Value::Int(1)]),
        ));
        assert_eq!(
            normalize(&filter, &NormalizeOptions::default()),
            QueryComponent::not(QueryComponent::field(
                "a",
                Comparison::In(vec![Value::Int(1)]),
            ))
        );
    }

    #[test]
    fn and_over_or_distributes_within_budget() {
        let filter = QueryComponent::and(vec![
            eq("x", 1),
            QueryComponent::or(vec![eq("a", 2), eq("b", 3)]),
        ]);

        let normalized = normalize(&filter, &NormalizeOptions::default());
        assert_eq!(
            normalized,
            QueryComponent::or(vec![
                QueryComponent::and(vec![eq("x", 1), eq("a", 2)]),
                QueryComponent::and(vec![eq("x", 1), eq("b", 3)]),
            ])
        );
    }

    #[test]
    fn dnf_respects_term_budget() {
        // 2^8 = 256 terms, over the default budget of 128: shape is kept.
        let wide = QueryComponent::and(
            (0..8)
                .map(|i| {
                    QueryComponent::or(vec![
                        eq(&format!("a{i}"), 0),
                        eq(&format!("b{i}"), 1),
                    ])
                })
                .collect(),
        );

        let normalized = normalize(&wide, &NormalizeOptions::default());
        assert!(matches!(normalized, QueryComponent::And(_)));
    }

    #[test]
    fn de_morgan_applies_inside_dnf() {
        let filter = QueryComponent::not(QueryComponent::and(vec![eq("a", 1), eq("b", 2)]));
        let normalized = normalize(&filter, &NormalizeOptions::default());

        assert_eq!(
            normalized,
            QueryComponent::or(vec![
                QueryComponent::field("a", Comparison::NotEquals(Value::Int(1))),
                QueryComponent::field("b", Comparison::NotEquals(Value::Int(2))),
            ])
        );
    }

    #[test]
    fn estimate_counts_products_and_sums() {
        let filter = QueryComponent::and(vec![
            QueryComponent::or(vec![eq("a", 1), eq("b", 2)]),
            QueryComponent::or(vec![eq("c", 3), eq("d", 4), eq("e", 5)]),
        ]);
        assert_eq!(estimate_dnf_terms(&filter), 6);
    }
}
