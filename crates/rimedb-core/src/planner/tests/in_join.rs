//! IN extraction: IN-joins, IN-unions, and the explicit-OR fallback.

use crate::key::KeyExpression;
use crate::model::IndexModel;
use crate::plan::RecordQueryPlan;
use crate::planner::PlannerConfiguration;
use crate::query::RecordQuery;
use crate::query::component::QueryComponent;
use crate::test_fixtures::*;
use crate::value::Value;

fn name_age_metadata() -> crate::model::MetadataModel {
    single_type_metadata(vec![
        IndexModel::value(
            "ix",
            KeyExpression::then(vec![
                KeyExpression::field("name"),
                KeyExpression::field("age"),
            ]),
        )
        .for_types(["A"]),
    ])
}

#[test]
fn in_with_bound_sort_column_becomes_an_in_join() {
    // name IN {x, y} AND age = 30, sorted by age: age is pinned, so the
    // outer list may iterate freely.
    let planner = planner(name_age_metadata());
    let query = RecordQuery::new(["A"])
        .with_filter(QueryComponent::and(vec![
            in_list("name", vec![Value::from("x"), Value::from("y")]),
            eq("age", 30),
        ]))
        .with_sort(KeyExpression::field("age"));
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::InJoin { sources, child } = plan else {
        panic!("expected an IN-join, got {plan}");
    };
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].values, vec![Value::from("x"), Value::from("y")]);
    assert!(!sources[0].sort_values);

    let RecordQueryPlan::IndexScan(scan) = *child else {
        panic!("expected the parameterized index scan");
    };
    assert_eq!(scan.comparisons.equality_size(), 2);
    assert!(
        scan.comparisons
            .equalities()
            .iter()
            .any(|c| matches!(c, crate::query::comparison::Comparison::Parameter(_)))
    );
}

#[test]
fn in_on_the_sort_column_iterates_sources_in_order() {
    let planner = planner(name_age_metadata());
    let query = RecordQuery::new(["A"])
        .with_filter(in_list(
            "name",
            vec![Value::from("y"), Value::from("x"), Value::from("y")],
        ))
        .with_sort(KeyExpression::field("name"));
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::InJoin { sources, .. } = plan else {
        panic!("expected an IN-join, got {plan}");
    };
    assert!(sources[0].sort_values);
    assert_eq!(sources[0].values, vec![Value::from("x"), Value::from("y")]);
}

#[test]
fn sort_incompatible_in_rewrites_to_an_ordered_union() {
    let mut config = PlannerConfiguration::default();
    config.attempt_failed_in_join_as_union = true;
    config.attempt_failed_in_join_as_or = false;

    let planner = planner(name_age_metadata()).with_configuration(config);
    // Sort on age is provided by the subplan's ordering, not by a bound
    // column, so the outer name iteration would reshuffle it.
    let query = RecordQuery::new(["A"])
        .with_filter(QueryComponent::and(vec![
            in_list("name", vec![Value::from("x"), Value::from("y")]),
            gt("age", 10),
        ]))
        .with_sort(KeyExpression::field("age"));
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::InUnion {
        sources,
        comparison_key,
        child,
        reverse,
    } = plan
    else {
        panic!("expected an IN-union, got {plan}");
    };
    assert_eq!(sources.len(), 1);
    assert!(sources[0].sort_values);
    assert_eq!(
        comparison_key,
        vec![KeyExpression::field("age"), KeyExpression::field("id")]
    );
    assert!(!reverse);
    assert!(matches!(*child, RecordQueryPlan::IndexScan(_)));
}

#[test]
fn in_union_respects_the_source_width_bound() {
    let mut config = PlannerConfiguration::default();
    config.attempt_failed_in_join_as_union = true;
    config.attempt_failed_in_join_as_union_max_size = 1;
    config.attempt_failed_in_join_as_or = false;

    let planner = planner(name_age_metadata()).with_configuration(config);
    let query = RecordQuery::new(["A"])
        .with_filter(QueryComponent::and(vec![
            in_list("name", vec![Value::from("x"), Value::from("y")]),
            gt("age", 10),
        ]))
        .with_sort(KeyExpression::field("age"));

    assert!(matches!(
        planner.plan(&query),
        Err(crate::planner::PlannerError::UnsatisfiableSort { .. })
    ));
}

#[test]
fn sort_incompatible_in_expands_to_explicit_or() {
    // Default configuration: rewrite as OR and plan an ordered union.
    let planner = planner(name_age_metadata());
    let query = RecordQuery::new(["A"])
        .with_filter(QueryComponent::and(vec![
            in_list("name", vec![Value::from("x"), Value::from("y")]),
            gt("age", 10),
        ]))
        .with_sort(KeyExpression::field("age"));
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::Union { children, .. } = plan else {
        panic!("expected the OR-expanded ordered union, got {plan}");
    };
    assert_eq!(children.len(), 2);
}

#[test]
fn in_without_sort_plans_an_unsorted_in_join() {
    let planner = planner(name_age_metadata());
    let query = RecordQuery::new(["A"]).with_filter(in_list(
        "name",
        vec![Value::from("x"), Value::from("y")],
    ));
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::InJoin { sources, .. } = plan else {
        panic!("expected an IN-join, got {plan}");
    };
    assert!(!sources[0].sort_values);
}
