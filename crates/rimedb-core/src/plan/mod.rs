//! Plan operator tree.
//!
//! A [`RecordQueryPlan`] is a purely functional value tree: the top-level
//! plan owns its sub-plans, nodes hold no back-references, and every
//! structural question (complexity, duplicate creation, ordering direction)
//! is answered by walking the owned tree.

pub(crate) mod fingerprint;
mod scan_comparisons;

use crate::key::KeyExpression;
use crate::query::comparison::TextComparison;
use crate::query::component::QueryComponent;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use scan_comparisons::ScanComparisons;

///
/// IndexScanKind
/// Key space an index scan iterates: stored values or rank positions.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum IndexScanKind {
    ByValue,
    ByRank,
}

///
/// ScanPlan
/// Scan over the primary-key space of the requested record types.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ScanPlan {
    pub comparisons: ScanComparisons,
    pub reverse: bool,
    pub strictly_sorted: bool,
}

///
/// IndexScanPlan
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexScanPlan {
    pub index_name: String,
    pub scan_kind: IndexScanKind,
    pub comparisons: ScanComparisons,
    pub reverse: bool,
    pub strictly_sorted: bool,
    /// True when a consumed fan-out column can emit one record repeatedly.
    pub creates_duplicates: bool,
}

///
/// TextIndexScanPlan
/// Token scan with an opaque text comparison; grouping columns may carry a
/// sarged prefix. Token entries repeat records, so duplicates are a given.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TextIndexScanPlan {
    pub index_name: String,
    pub prefix: ScanComparisons,
    pub text: TextComparison,
    pub reverse: bool,
}

///
/// CoveringIndexScanPlan
/// Index scan whose results are served from the entry; no record fetch.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CoveringIndexScanPlan {
    pub inner: Box<RecordQueryPlan>,
    /// Fields the entry serves to consumers.
    pub fields: Vec<KeyExpression>,
}

///
/// InValuesSource
/// One outer value list of an IN-join / IN-union.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct InValuesSource {
    pub parameter: String,
    pub values: Vec<Value>,
    pub sort_values: bool,
    pub sort_reverse: bool,
}

///
/// RecordQueryPlan
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RecordQueryPlan {
    Scan(ScanPlan),
    IndexScan(IndexScanPlan),
    TextIndexScan(TextIndexScanPlan),
    CoveringIndexScan(CoveringIndexScanPlan),
    /// Keep only records of the given types.
    TypeFilter {
        record_types: Vec<String>,
        child: Box<Self>,
    },
    /// Residual predicate evaluated per fetched record.
    Filter {
        filter: QueryComponent,
        child: Box<Self>,
    },
    /// Predicate evaluated on index entries before the fetch.
    IndexEntryFilter {
        filter: QueryComponent,
        child: Box<Self>,
    },
    /// For each element of each source, re-bind parameters and run the child.
    InJoin {
        sources: Vec<InValuesSource>,
        child: Box<Self>,
    },
    /// Multi-way merge of per-element child iterations on a comparison key.
    InUnion {
        sources: Vec<InValuesSource>,
        comparison_key: Vec<KeyExpression>,
        child: Box<Self>,
        reverse: bool,
    },
    /// Ordered intersection on a comparison key.
    Intersection {
        comparison_key: Vec<KeyExpression>,
        children: Vec<Self>,
        reverse: bool,
    },
    /// Ordered union on a comparison key; ties across branches collapse.
    Union {
        comparison_key: Vec<KeyExpression>,
        children: Vec<Self>,
        reverse: bool,
    },
    /// Concatenation without order; branches may overlap.
    UnorderedUnion { children: Vec<Self> },
    /// Drop records whose primary key was already emitted.
    PrimaryKeyDistinct { child: Box<Self> },
    /// In-memory sort fallback.
    Sort {
        key: KeyExpression,
        reverse: bool,
        child: Box<Self>,
    },
}

impl RecordQueryPlan {
    pub(crate) fn filtered(filter: QueryComponent, child: Self) -> Self {
        Self::Filter {
            filter,
            child: Box::new(child),
        }
    }

    pub(crate) fn type_filtered(record_types: Vec<String>, child: Self) -> Self {
        Self::TypeFilter {
            record_types,
            child: Box::new(child),
        }
    }

    pub(crate) fn distinct(child: Self) -> Self {
        Self::PrimaryKeyDistinct {
            child: Box::new(child),
        }
    }

    /// Structural complexity: children sum plus one, plus the comparison
    /// count on scan leaves.
    #[must_use]
    pub fn complexity(&self) -> usize {
        match self {
            Self::Scan(scan) => 1 + scan.comparisons.size(),
            Self::IndexScan(scan) => 1 + scan.comparisons.size(),
            Self::TextIndexScan(scan) => 1 + scan.prefix.size() + 1,
            Self::CoveringIndexScan(covering) => 1 + covering.inner.complexity(),
            Self::TypeFilter { child, .. }
            | Self::Filter { child, .. }
            | Self::IndexEntryFilter { child, .. }
            | Self::InJoin { child, .. }
            | Self::InUnion { child, .. }
            | Self::PrimaryKeyDistinct { child }
            | Self::Sort { child, .. } => 1 + child.complexity(),
            Self::Intersection { children, .. }
            | Self::Union { children, .. }
            | Self::UnorderedUnion { children } => {
                1 + children.iter().map(Self::complexity).sum::<usize>()
            }
        }
    }

    /// True when the plan can emit one record more than once.
    #[must_use]
    pub fn creates_duplicates(&self) -> bool {
        match self {
            Self::Scan(_) => false,
            Self::IndexScan(scan) => scan.creates_duplicates,
            Self::TextIndexScan(_) | Self::UnorderedUnion { .. } => true,
            Self::CoveringIndexScan(covering) => covering.inner.creates_duplicates(),
            Self::TypeFilter { child, .. }
            | Self::Filter { child, .. }
            | Self::IndexEntryFilter { child, .. }
            | Self::InJoin { child, .. }
            | Self::InUnion { child, .. }
            | Self::Sort { child, .. } => child.creates_duplicates(),
            Self::PrimaryKeyDistinct { .. } => false,
            Self::Intersection { children, .. } | Self::Union { children, .. } => {
                children.iter().any(Self::creates_duplicates)
            }
        }
    }

    /// Scan direction, where one is defined.
    #[must_use]
    pub fn reverse(&self) -> bool {
        match self {
            Self::Scan(scan) => scan.reverse,
            Self::IndexScan(scan) => scan.reverse,
            Self::TextIndexScan(scan) => scan.reverse,
            Self::CoveringIndexScan(covering) => covering.inner.reverse(),
            Self::TypeFilter { child, .. }
            | Self::Filter { child, .. }
            | Self::IndexEntryFilter { child, .. }
            | Self::InJoin { child, .. }
            | Self::PrimaryKeyDistinct { child } => child.reverse(),
            Self::InUnion { reverse, .. }
            | Self::Intersection { reverse, .. }
            | Self::Union { reverse, .. }
            | Self::Sort { reverse, .. } => *reverse,
            Self::UnorderedUnion { .. } => false,
        }
    }

    /// True when results carry the full sort order as a strict total order.
    #[must_use]
    pub fn is_strictly_sorted(&self) -> bool {
        match self {
            Self::Scan(scan) => scan.strictly_sorted,
            Self::IndexScan(scan) => scan.strictly_sorted,
            Self::CoveringIndexScan(covering) => covering.inner.is_strictly_sorted(),
            Self::TypeFilter { child, .. }
            | Self::Filter { child, .. }
            | Self::IndexEntryFilter { child, .. }
            | Self::PrimaryKeyDistinct { child } => child.is_strictly_sorted(),
            Self::Sort { .. } => true,
            _ => false,
        }
    }

    /// Names of indexes this plan scans, in tree order.
    #[must_use]
    pub fn used_indexes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_indexes(&mut out);
        out
    }

    fn collect_indexes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Scan(_) => {}
            Self::IndexScan(scan) => out.push(&scan.index_name),
            Self::TextIndexScan(scan) => out.push(&scan.index_name),
            Self::CoveringIndexScan(covering) => covering.inner.collect_indexes(out),
            Self::TypeFilter { child, .. }
            | Self::Filter { child, .. }
            | Self::IndexEntryFilter { child, .. }
            | Self::InJoin { child, .. }
            | Self::InUnion { child, .. }
            | Self::PrimaryKeyDistinct { child }
            | Self::Sort { child, .. } => child.collect_indexes(out),
            Self::Intersection { children, .. }
            | Self::Union { children, .. }
            | Self::UnorderedUnion { children } => {
                for child in children {
                    child.collect_indexes(out);
                }
            }
        }
    }

    /// Stable structural identifier for explainability and plan comparison.
    #[must_use]
    pub fn plan_hash(&self) -> u64 {
        fingerprint::plan_hash(self)
    }
}

impl fmt::Display for RecordQueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan(scan) => {
                write!(f, "Scan({}{})", scan.comparisons, reverse_tag(scan.reverse))
            }
            Self::IndexScan(scan) => {
                let kind = match scan.scan_kind {
                    IndexScanKind::ByValue => "",
                    IndexScanKind::ByRank => " BY_RANK",
                };
                write!(
                    f,
                    "Index({} {}{kind}{})",
                    scan.index_name,
                    scan.comparisons,
                    reverse_tag(scan.reverse)
                )
            }
            Self::TextIndexScan(scan) => write!(
                f,
                "TextIndex({} {} {})",
                scan.index_name, scan.prefix, scan.text
            ),
            Self::CoveringIndexScan(covering) => write!(f, "Covering({})", covering.inner),
            Self::TypeFilter {
                record_types,
                child,
            } => write!(f, "TypeFilter([{}] over {child})", record_types.join(", ")),
            Self::Filter { filter, child } => write!(f, "Filter({filter} over {child})"),
            Self::IndexEntryFilter { filter, child } => {
                write!(f, "EntryFilter({filter} over {child})")
            }
            Self::InJoin { sources, child } => {
                write!(f, "InJoin(")?;
                write_sources(f, sources)?;
                write!(f, " over {child})")
            }
            Self::InUnion {
                sources,
                comparison_key,
                child,
                ..
            } => {
                write!(f, "InUnion(")?;
                write_sources(f, sources)?;
                write!(f, " by {} over {child})", key_list(comparison_key))
            }
            Self::Intersection {
                comparison_key,
                children,
                ..
            } => write_merge(f, "Intersection", comparison_key, children),
            Self::Union {
                comparison_key,
                children,
                ..
            } => write_merge(f, "Union", comparison_key, children),
            Self::UnorderedUnion { children } => {
                write!(f, "UnorderedUnion(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            Self::PrimaryKeyDistinct { child } => write!(f, "Distinct({child})"),
            Self::Sort { key, reverse, child } => {
                write!(f, "Sort({key}{} over {child})", reverse_tag(*reverse))
            }
        }
    }
}

const fn reverse_tag(reverse: bool) -> &'static str {
    if reverse { " REVERSE" } else { "" }
}

fn key_list(columns: &[KeyExpression]) -> String {
    let parts: Vec<String> = columns.iter().map(ToString::to_string).collect();
    parts.join(", ")
}

fn write_sources(f: &mut fmt::Formatter<'_>, sources: &[InValuesSource]) -> fmt::Result {
    for (i, source) in sources.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "${} in [", source.parameter)?;
        for (j, value) in source.values.iter().enumerate() {
            if j > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")?;
    }
    Ok(())
}

fn write_merge(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    comparison_key: &[KeyExpression],
    children: &[RecordQueryPlan],
) -> fmt::Result {
    write!(f, "{label}<{}>(", key_list(comparison_key))?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{child}")?;
    }
    write!(f, ")")
}

///
/// TESTS
///
