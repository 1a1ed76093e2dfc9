//! Scan-comparison algebra.
//!
//! A [`ScanComparisons`] is an ordered tuple of equality comparisons
//! followed by at most one compound inequality range. The equality length
//! is the sarged prefix length of the scan; once an inequality is present
//! the tuple is sealed against further equalities.

use crate::query::comparison::{Comparison, ComparisonCategory};
use crate::value::canonical_cmp;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

///
/// ScanComparisons
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ScanComparisons {
    equalities: Vec<Comparison>,
    inequalities: Vec<Comparison>,
}

impl ScanComparisons {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            equalities: Vec::new(),
            inequalities: Vec::new(),
        }
    }

    #[must_use]
    pub fn single_equality(comparison: Comparison) -> Self {
        let mut out = Self::new();
        out.push_equality(comparison);
        out
    }

    #[must_use]
    pub fn equalities(&self) -> &[Comparison] {
        &self.equalities
    }

    #[must_use]
    pub fn inequalities(&self) -> &[Comparison] {
        &self.inequalities
    }

    /// Sarged prefix length.
    #[must_use]
    pub fn equality_size(&self) -> usize {
        self.equalities.len()
    }

    /// Total comparison count, used in plan complexity.
    #[must_use]
    pub fn size(&self) -> usize {
        self.equalities.len() + self.inequalities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.equalities.is_empty() && self.inequalities.is_empty()
    }

    #[must_use]
    pub fn is_equality_only(&self) -> bool {
        self.inequalities.is_empty()
    }

    /// Append an equality for the next column. Returns false once the tuple
    /// is sealed by an inequality or the comparison is not an equality.
    pub fn push_equality(&mut self, comparison: Comparison) -> bool {
        if !self.inequalities.is_empty() {
            return false;
        }
        if comparison.category() != ComparisonCategory::Equality {
            return false;
        }

        self.equalities.push(comparison);
        true
    }

    /// Merge an inequality into the terminal range. Bounds on the same side
    /// keep the tighter value; duplicates collapse.
    pub fn push_inequality(&mut self, comparison: Comparison) -> bool {
        if comparison.category() != ComparisonCategory::Inequality {
            return false;
        }
        if self.inequalities.contains(&comparison) {
            return true;
        }

        match bound_side(&comparison) {
            Some(side) => {
                if let Some(existing) = self
                    .inequalities
                    .iter_mut()
                    .find(|existing| bound_side(existing) == Some(side))
                {
                    if tighter(&comparison, existing, side) {
                        *existing = comparison;
                    }
                    return true;
                }
                self.inequalities.push(comparison);
            }
            None => self.inequalities.push(comparison),
        }

        true
    }

    /// Union two compatible comparison tuples on the same column layout:
    /// identical equality prefixes, inequalities merged range-wise.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Option<Self> {
        if self.equalities != other.equalities {
            return None;
        }

        let mut merged = self.clone();
        for inequality in &other.inequalities {
            if !merged.push_inequality(inequality.clone()) {
                return None;
            }
        }

        Some(merged)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BoundSide {
    Lower,
    Upper,
}

const fn bound_side(comparison: &Comparison) -> Option<BoundSide> {
    match comparison {
        Comparison::GreaterThan(_) | Comparison::GreaterThanOrEquals(_) => Some(BoundSide::Lower),
        Comparison::LessThan(_) | Comparison::LessThanOrEquals(_) => Some(BoundSide::Upper),
        _ => None,
    }
}

const fn bound_value(comparison: &Comparison) -> Option<&crate::value::Value> {
    match comparison {
        Comparison::GreaterThan(value)
        | Comparison::GreaterThanOrEquals(value)
        | Comparison::LessThan(value)
        | Comparison::LessThanOrEquals(value) => Some(value),
        _ => None,
    }
}

// True when `candidate` narrows the range more than `existing` on `side`.
fn tighter(candidate: &Comparison, existing: &Comparison, side: BoundSide) -> bool {
    let (Some(candidate_value), Some(existing_value)) =
        (bound_value(candidate), bound_value(existing))
    else {
        return false;
    };

    match canonical_cmp(candidate_value, existing_value) {
        Ordering::Equal => {
            // Exclusive beats inclusive at the same endpoint.
            matches!(
                candidate,
                Comparison::GreaterThan(_) | Comparison::LessThan(_)
            ) && matches!(
                existing,
                Comparison::GreaterThanOrEquals(_) | Comparison::LessThanOrEquals(_)
            )
        }
        Ordering::Greater => side == BoundSide::Lower,
        Ordering::Less => side == BoundSide::Upper,
    }
}

// Scans render as `[EQ "x", > 5]`.
impl fmt::Display for ScanComparisons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        let mut first = true;
        for comparison in self.equalities.iter().chain(self.inequalities.iter()) {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{comparison}")?;
        }
        write!(f, "]")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn equality_is_sealed_by_inequality() {
        let mut comparisons = ScanComparisons::new();
        assert!(comparisons.push_equality(Comparison::Equals(Value::Int(1))));
        assert!(comparisons.push_inequality(Comparison::GreaterThan(Value::Int(2))));
        assert!(!comparisons.push_equality(Comparison::Equals(Value::Int(3))));

        assert_eq!(comparisons.equality_size(), 1);
        assert_eq!(comparisons.size(), 2);
    }

    #[test]
    fn same_side_bounds_keep_the_tighter() {
        let mut comparisons = ScanComparisons::new();
        assert!(comparisons.push_inequality(Comparison::GreaterThanOrEquals(Value::Int(3))));
        assert!(comparisons.push_inequality(Comparison::GreaterThan(Value::Int(5))));

        assert_eq!(
            comparisons.inequalities(),
            &[Comparison::GreaterThan(Value::Int(5))]
        );
    }

    #[test]
    fn exclusive_beats_inclusive_at_same_endpoint() {
        let mut comparisons = ScanComparisons::new();
        assert!(comparisons.push_inequality(Comparison::LessThanOrEquals(Value::Int(9))));
        assert!(comparisons.push_inequality(Comparison::LessThan(Value::Int(9))));

        assert_eq!(
            comparisons.inequalities(),
            &[Comparison::LessThan(Value::Int(9))]
        );
    }

    #[test]
    fn merge_requires_identical_equality_prefix() {
        let left = ScanComparisons::single_equality(Comparison::Equals(Value::Int(1)));
        let right = ScanComparisons::single_equality(Comparison::Equals(Value::Int(2)));
        assert_eq!(left.merge(&right), None);

        let mut lower = left.clone();
        assert!(lower.push_inequality(Comparison::GreaterThan(Value::Int(0))));
        let mut upper = left.clone();
        assert!(upper.push_inequality(Comparison::LessThan(Value::Int(10))));

        let merged = lower.merge(&upper).expect("compatible");
        assert_eq!(merged.equality_size(), 1);
        assert_eq!(merged.inequalities().len(), 2);
    }

    #[test]
    fn non_equality_is_rejected_from_the_prefix() {
        let mut comparisons = ScanComparisons::new();
        assert!(!comparisons.push_equality(Comparison::GreaterThan(Value::Int(1))));
        assert!(comparisons.is_empty());
    }
}
