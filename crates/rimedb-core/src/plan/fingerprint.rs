//! Deterministic structural plan hashing.
//!
//! The hash is a stable identifier for explain surfaces and plan
//! comparison across runs. It covers operator tags, scan comparisons,
//! comparison keys, and child structure, with length-prefixed encoding so
//! adjacent fields cannot alias.

use crate::key::KeyExpression;
use crate::plan::{RecordQueryPlan, ScanComparisons};
use crate::query::comparison::Comparison;
use xxhash_rust::xxh3::Xxh3;

pub(crate) fn plan_hash(plan: &RecordQueryPlan) -> u64 {
    let mut hasher = Xxh3::new();
    hash_plan(&mut hasher, plan);
    hasher.digest()
}

fn hash_plan(hasher: &mut Xxh3, plan: &RecordQueryPlan) {
    match plan {
        RecordQueryPlan::Scan(scan) => {
            write_tag(hasher, 0x01);
            hash_comparisons(hasher, &scan.comparisons);
            write_bool(hasher, scan.reverse);
        }
        RecordQueryPlan::IndexScan(scan) => {
            write_tag(hasher, 0x02);
            write_str(hasher, &scan.index_name);
            hash_comparisons(hasher, &scan.comparisons);
            write_bool(hasher, scan.reverse);
        }
        RecordQueryPlan::TextIndexScan(scan) => {
            write_tag(hasher, 0x03);
            write_str(hasher, &scan.index_name);
            hash_comparisons(hasher, &scan.prefix);
            for token in &scan.text.tokens {
                write_str(hasher, token);
            }
        }
        RecordQueryPlan::CoveringIndexScan(covering) => {
            write_tag(hasher, 0x04);
            hash_plan(hasher, &covering.inner);
        }
        RecordQueryPlan::TypeFilter {
            record_types,
            child,
        } => {
            write_tag(hasher, 0x05);
            for record_type in record_types {
                write_str(hasher, record_type);
            }
            hash_plan(hasher, child);
        }
        RecordQueryPlan::Filter { filter, child } => {
            write_tag(hasher, 0x06);
            write_str(hasher, &filter.to_string());
            hash_plan(hasher, child);
        }
        RecordQueryPlan::IndexEntryFilter { filter, child } => {
            write_tag(hasher, 0x07);
            write_str(hasher, &filter.to_string());
            hash_plan(hasher, child);
        }
        RecordQueryPlan::InJoin { sources, child } => {
            write_tag(hasher, 0x08);
            for source in sources {
                write_str(hasher, &source.parameter);
                write_usize(hasher, source.values.len());
            }
            hash_plan(hasher, child);
        }
        RecordQueryPlan::InUnion {
            sources,
            comparison_key,
            child,
            reverse,
        } => {
            write_tag(hasher, 0x09);
            for source in sources {
                write_str(hasher, &source.parameter);
                write_usize(hasher, source.values.len());
            }
            hash_key(hasher, comparison_key);
            write_bool(hasher, *reverse);
            hash_plan(hasher, child);
        }
        RecordQueryPlan::Intersection {
            comparison_key,
            children,
            reverse,
        } => {
            write_tag(hasher, 0x0a);
            hash_key(hasher, comparison_key);
            write_bool(hasher, *reverse);
            hash_children(hasher, children);
        }
        RecordQueryPlan::Union {
            comparison_key,
            children,
            reverse,
        } => {
            write_tag(hasher, 0x0b);
            hash_key(hasher, comparison_key);
            write_bool(hasher, *reverse);
            hash_children(hasher, children);
        }
        RecordQueryPlan::UnorderedUnion { children } => {
            write_tag(hasher, 0x0c);
            hash_children(hasher, children);
        }
        RecordQueryPlan::PrimaryKeyDistinct { child } => {
            write_tag(hasher, 0x0d);
            hash_plan(hasher, child);
        }
        RecordQueryPlan::Sort { key, reverse, child } => {
            write_tag(hasher, 0x0e);
            write_str(hasher, &key.to_string());
            write_bool(hasher, *reverse);
            hash_plan(hasher, child);
        }
    }
}

fn hash_children(hasher: &mut Xxh3, children: &[RecordQueryPlan]) {
    write_usize(hasher, children.len());
    for child in children {
        hash_plan(hasher, child);
    }
}

fn hash_comparisons(hasher: &mut Xxh3, comparisons: &ScanComparisons) {
    write_usize(hasher, comparisons.equality_size());
    for comparison in comparisons
        .equalities()
        .iter()
        .chain(comparisons.inequalities())
    {
        hash_comparison(hasher, comparison);
    }
}

fn hash_comparison(hasher: &mut Xxh3, comparison: &Comparison) {
    write_str(hasher, &comparison.to_string());
}

fn hash_key(hasher: &mut Xxh3, columns: &[KeyExpression]) {
    write_usize(hasher, columns.len());
    for column in columns {
        write_str(hasher, &column.to_string());
    }
}

fn write_tag(hasher: &mut Xxh3, tag: u8) {
    hasher.update(&[tag]);
}

fn write_bool(hasher: &mut Xxh3, value: bool) {
    hasher.update(&[u8::from(value)]);
}

fn write_usize(hasher: &mut Xxh3, value: usize) {
    hasher.update(&(value as u64).to_le_bytes());
}

fn write_str(hasher: &mut Xxh3, value: &str) {
    write_usize(hasher, value.len());
    hasher.update(value.as_bytes());
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use crate::plan::{IndexScanKind, IndexScanPlan, RecordQueryPlan, ScanComparisons};
    use crate::query::comparison::Comparison;
    use crate::value::Value;

    fn index_scan(name: &str, value: i64) -> RecordQueryPlan {
        RecordQueryPlan::IndexScan(IndexScanPlan {
            index_name: name.to_string(),
            scan_kind: IndexScanKind::ByValue,
            comparisons: ScanComparisons::single_equality(Comparison::Equals(Value::Int(value))),
            reverse: false,
            strictly_sorted: false,
            creates_duplicates: false,
        })
    }

    #[test]
    fn hash_is_stable_for_equal_plans() {
        assert_eq!(index_scan("ix", 1).plan_hash(), index_scan("ix", 1).plan_hash());
    }

    #[test]
    fn hash_distinguishes_index_and_values() {
        assert_ne!(index_scan("ix", 1).plan_hash(), index_scan("iy", 1).plan_hash());
        assert_ne!(index_scan("ix", 1).plan_hash(), index_scan("ix", 2).plan_hash());
    }
}
