//! Planner scenario tests: single-candidate matching.

mod in_join;

use crate::key::KeyExpression;
use crate::model::IndexModel;
use crate::plan::{IndexScanKind, IndexScanPlan, RecordQueryPlan, ScanComparisons, ScanPlan};
use crate::query::comparison::Comparison;
use crate::query::component::QueryComponent;
use crate::query::RecordQuery;
use crate::test_fixtures::*;
use crate::value::Value;

fn text_value(text: &str) -> Value {
    Value::Text(text.to_string())
}

#[test]
fn one_type_scan_injects_record_type_prefix() {
    // Types = {"A"}, primary key leads with the type column, no indexes.
    let planner = planner(metadata_with_primary_key(
        type_prefixed_primary_key(),
        vec![],
    ));
    let plan = planner.plan(&RecordQuery::new(["A"])).unwrap();

    assert_eq!(
        plan,
        RecordQueryPlan::Scan(ScanPlan {
            comparisons: ScanComparisons::single_equality(Comparison::Equals(text_value("A"))),
            reverse: false,
            strictly_sorted: false,
        })
    );
}

#[test]
fn plain_primary_key_scan_gets_a_type_filter() {
    let planner = planner(single_type_metadata(vec![]));
    let plan = planner.plan(&RecordQuery::new(["A"])).unwrap();

    let RecordQueryPlan::TypeFilter {
        record_types,
        child,
    } = plan
    else {
        panic!("expected a type filter over the scan");
    };
    assert_eq!(record_types, vec!["A".to_string()]);
    assert!(matches!(*child, RecordQueryPlan::Scan(_)));
}

#[test]
fn single_column_equality_matches_the_index() {
    let planner = planner(single_type_metadata(vec![
        IndexModel::value("ix", KeyExpression::field("name")).for_types(["A"]),
    ]));
    let query = RecordQuery::new(["A"]).with_filter(eq("name", "x"));
    let plan = planner.plan(&query).unwrap();

    assert_eq!(
        plan,
        RecordQueryPlan::IndexScan(IndexScanPlan {
            index_name: "ix".to_string(),
            scan_kind: IndexScanKind::ByValue,
            comparisons: ScanComparisons::single_equality(Comparison::Equals(text_value("x"))),
            reverse: false,
            strictly_sorted: false,
            creates_duplicates: false,
        })
    );
}

#[test]
fn equality_prefix_enables_sort_on_next_column() {
    let planner = planner(single_type_metadata(vec![
        IndexModel::value(
            "ix",
            KeyExpression::then(vec![
                KeyExpression::field("name"),
                KeyExpression::field("age"),
            ]),
        )
        .for_types(["A"]),
    ]));
    let query = RecordQuery::new(["A"])
        .with_filter(eq("name", "x"))
        .with_sort(KeyExpression::field("age"));
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::IndexScan(scan) = plan else {
        panic!("expected an index scan");
    };
    assert_eq!(scan.index_name, "ix");
    assert_eq!(scan.comparisons.equality_size(), 1);
    assert!(!scan.strictly_sorted);
}

#[test]
fn inequality_with_sort_on_same_column_is_strictly_sorted() {
    let planner = planner(single_type_metadata(vec![
        IndexModel::value(
            "ix",
            KeyExpression::then(vec![
                KeyExpression::field("name"),
                KeyExpression::field("age"),
            ]),
        )
        .for_types(["A"]),
    ]));
    let query = RecordQuery::new(["A"])
        .with_filter(gt("name", "x"))
        .with_sort(KeyExpression::field("name"));
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::IndexScan(scan) = plan else {
        panic!("expected an index scan");
    };
    assert_eq!(
        scan.comparisons.inequalities(),
        &[Comparison::GreaterThan(text_value("x"))]
    );
    assert!(scan.strictly_sorted);
}

#[test]
fn unique_index_equality_covering_the_key_is_strictly_sorted() {
    let planner = planner(single_type_metadata(vec![
        IndexModel::value("uname", KeyExpression::field("name"))
            .unique()
            .for_types(["A"]),
    ]));
    let query = RecordQuery::new(["A"])
        .with_filter(eq("name", "x"))
        .with_sort(KeyExpression::field("name"));
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::IndexScan(scan) = plan else {
        panic!("expected an index scan");
    };
    assert!(scan.strictly_sorted);
}

#[test]
fn reversed_sort_reverses_the_scan() {
    let planner = planner(single_type_metadata(vec![
        IndexModel::value("ix", KeyExpression::field("name")).for_types(["A"]),
    ]));
    let query = RecordQuery::new(["A"]).with_sort_reversed(KeyExpression::field("name"));
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::IndexScan(scan) = plan else {
        panic!("expected a sort-only index scan");
    };
    assert!(scan.reverse);
    assert!(scan.comparisons.is_empty());
}

#[test]
fn nested_and_children_bind_separate_nested_columns() {
    let planner = planner(single_type_metadata(vec![
        IndexModel::value(
            "addr",
            KeyExpression::nest(
                "address",
                KeyExpression::then(vec![
                    KeyExpression::field("city"),
                    KeyExpression::field("zip"),
                ]),
            ),
        )
        .for_types(["A"]),
    ]));
    let query = RecordQuery::new(["A"]).with_filter(QueryComponent::nested(
        "address",
        QueryComponent::and(vec![eq("city", "here"), eq("zip", 12_345_i64)]),
    ));
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::IndexScan(scan) = plan else {
        panic!("expected an index scan, not a residual filter");
    };
    assert_eq!(scan.comparisons.equality_size(), 2);
}

#[test]
fn whole_key_comparison_spans_multiple_columns() {
    let key = KeyExpression::then(vec![KeyExpression::field("a"), KeyExpression::field("b")]);
    let planner = planner(single_type_metadata(vec![
        IndexModel::value("ab", key.clone()).for_types(["A"]),
    ]));

    let query = RecordQuery::new(["A"]).with_filter(QueryComponent::KeyWithComparison {
        key,
        comparison: Comparison::Equals(Value::List(vec![Value::Int(1), Value::Int(2)])),
    });
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::IndexScan(scan) = plan else {
        panic!("expected an index scan");
    };
    assert_eq!(scan.comparisons.equality_size(), 1);
}

#[test]
fn unbound_fan_out_column_rejects_the_index() {
    // Records with an empty `tags` list are absent from the index, so a
    // name-only scan over it would silently drop them.
    let planner = planner(single_type_metadata(vec![
        IndexModel::value(
            "name_tags",
            KeyExpression::then(vec![
                KeyExpression::field("name"),
                KeyExpression::fan_out("tags"),
            ]),
        )
        .for_types(["A"]),
    ]));
    let query = RecordQuery::new(["A"]).with_filter(eq("name", "x"));
    let plan = planner.plan(&query).unwrap();

    assert!(plan.used_indexes().is_empty());
}

#[test]
fn one_of_them_on_fan_out_column_gets_a_distinct_wrapper() {
    let planner = planner(single_type_metadata(vec![
        IndexModel::value("tags_ix", KeyExpression::fan_out("tags")).for_types(["A"]),
    ]));
    let query = RecordQuery::new(["A"])
        .with_filter(QueryComponent::one_of_them(
            "tags",
            Comparison::Equals(Value::Int(5)),
        ));
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::PrimaryKeyDistinct { child } = plan else {
        panic!("duplicate-creating scan must be fenced by a distinct");
    };
    let RecordQueryPlan::IndexScan(scan) = *child else {
        panic!("expected an index scan under the distinct");
    };
    assert!(scan.creates_duplicates);
    assert_eq!(scan.index_name, "tags_ix");
}

#[test]
fn version_function_matches_the_version_column() {
    let planner = planner(single_type_metadata(vec![
        IndexModel::value(
            "ver",
            KeyExpression::then(vec![KeyExpression::Version, KeyExpression::field("id")]),
        )
        .for_types(["A"]),
    ]));
    let query = RecordQuery::new(["A"]).with_filter(QueryComponent::RecordFunction {
        function: crate::query::component::QueryRecordFunction::Version,
        comparison: Comparison::GreaterThan(Value::Version(100)),
    });
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::IndexScan(scan) = plan else {
        panic!("expected an index scan");
    };
    assert_eq!(scan.index_name, "ver");
    assert_eq!(scan.comparisons.size(), 1);
}

#[test]
fn residual_filter_wraps_the_unmatched_remainder() {
    let planner = planner(single_type_metadata(vec![
        IndexModel::value("ix", KeyExpression::field("name")).for_types(["A"]),
    ]));
    let query = RecordQuery::new(["A"])
        .with_filter(QueryComponent::and(vec![eq("name", "x"), gt("height", 10)]));
    let plan = planner.plan(&query).unwrap();

    let RecordQueryPlan::Filter { filter, child } = plan else {
        panic!("expected a residual filter");
    };
    assert_eq!(filter, gt("height", 10));
    assert!(matches!(*child, RecordQueryPlan::IndexScan(_)));
}

#[test]
fn sargable_equalities_leave_the_residual_list() {
    let metadata = single_type_metadata(vec![
        IndexModel::value(
            "ix",
            KeyExpression::then(vec![
                KeyExpression::field("name"),
                KeyExpression::field("age"),
            ]),
        )
        .for_types(["A"]),
    ]);
    let planner = planner(metadata);
    let query = RecordQuery::new(["A"]).with_filter(QueryComponent::and(vec![
        eq("name", "x"),
        eq("age", 30),
    ]));
    let plan = planner.plan(&query).unwrap();

    // Both equalities sarged: no Filter node anywhere.
    assert!(matches!(plan, RecordQueryPlan::IndexScan(_)));
}
