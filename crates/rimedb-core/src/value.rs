//! Literal value algebra shared by comparisons, scan bounds, and plan
//! rendering.
//!
//! Values carry no schema knowledge. Ordering questions are answered by
//! [`canonical_cmp`], a total order over all variants; planner determinism
//! depends on that order never changing between calls.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

///
/// Float64
///
/// Total-ordered float wrapper so values stay `Eq`/`Ord` end to end.
/// Ordering follows IEEE 754 `totalOrder`; NaN sorts above all numbers.
///

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Float64(pub f64);

impl PartialEq for Float64 {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Float64 {}

impl PartialOrd for Float64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Float64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Float64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

///
/// Value
///
/// Literal operand of a comparison or scan bound.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(Float64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Commit-version literal used by version-index comparisons.
    Version(u64),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    // Stable variant rank used when comparing across variants.
    const fn variant_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Uint(_) => 3,
            Self::Float(_) => 4,
            Self::Text(_) => 5,
            Self::Bytes(_) => 6,
            Self::List(_) => 7,
            Self::Version(_) => 8,
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Uint(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => {
                write!(f, "0x")?;
                for byte in v {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Version(v) => write!(f, "version({v})"),
        }
    }
}

/// Total, deterministic order over all value variants.
///
/// Within a variant the natural order applies; across variants the stable
/// variant rank decides. Numeric variants are NOT widened into a common
/// domain here; scan-bound construction compares like against like.
#[must_use]
pub fn canonical_cmp(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Uint(a), Value::Uint(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.cmp(b),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ord = canonical_cmp(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Version(a), Value::Version(b)) => a.cmp(b),
        _ => left.variant_rank().cmp(&right.variant_rank()),
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_cmp_is_total_within_variants() {
        assert_eq!(
            canonical_cmp(&Value::Int(1), &Value::Int(2)),
            Ordering::Less
        );
        assert_eq!(
            canonical_cmp(&Value::Text("b".into()), &Value::Text("a".into())),
            Ordering::Greater
        );
        assert_eq!(
            canonical_cmp(&Value::Null, &Value::Null),
            Ordering::Equal
        );
    }

    #[test]
    fn canonical_cmp_orders_across_variants_by_rank() {
        assert_eq!(
            canonical_cmp(&Value::Null, &Value::Bool(false)),
            Ordering::Less
        );
        assert_eq!(
            canonical_cmp(&Value::Text("a".into()), &Value::Int(7)),
            Ordering::Greater
        );
    }

    #[test]
    fn float_order_is_total_with_nan_high() {
        let nan = Value::Float(Float64(f64::NAN));
        let one = Value::Float(Float64(1.0));
        assert_eq!(canonical_cmp(&one, &nan), Ordering::Less);
        assert_eq!(canonical_cmp(&nan, &nan), Ordering::Equal);
    }

    #[test]
    fn list_compare_is_lexicographic() {
        let short = Value::List(vec![Value::Int(1)]);
        let long = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(canonical_cmp(&short, &long), Ordering::Less);
    }
}
