//! Plan ordering keys.
//!
//! A [`PlanOrderingKey`] describes the column order of a subplan's output:
//! an equality-bound prefix (constant per scan, free for ordering purposes)
//! and the columns that actually order the stream. Merge operators consult
//! it to decide whether subplans can share a comparison key.

use crate::key::KeyExpression;

///
/// PlanOrderingKey
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct PlanOrderingKey {
    /// Columns bound to a single value by the scan's equality prefix.
    pub equality_columns: Vec<KeyExpression>,
    /// Columns the output is ordered by, after the bound prefix.
    pub ordered_columns: Vec<KeyExpression>,
    pub reverse: bool,
}

impl PlanOrderingKey {
    /// True when the output order implies order on `column`: either the
    /// column is constant, or it is the next ordered column at `position`.
    fn provides(&self, column: &KeyExpression, position: &mut usize) -> bool {
        if self.equality_columns.contains(column) {
            return true;
        }

        let remaining = &self.ordered_columns[*position..];
        match remaining.iter().position(|ordered| ordered == column) {
            Some(offset) if offset == 0 => {
                *position += 1;
                true
            }
            // A gap in the ordered columns breaks the comparison key.
            _ => false,
        }
    }
}

/// The merge comparison key for a set of order-compatible subplans:
/// requested sort columns followed by the common primary key, duplicates
/// removed. Returns None when any plan cannot provide the key in order or
/// the directions disagree.
pub(crate) fn merge_comparison_key(
    orderings: &[&PlanOrderingKey],
    sort: Option<&KeyExpression>,
    common_primary_key: Option<&KeyExpression>,
) -> Option<Vec<KeyExpression>> {
    let [first, rest @ ..] = orderings else {
        return None;
    };
    if rest.iter().any(|ordering| ordering.reverse != first.reverse) {
        return None;
    }

    let mut key = Vec::new();
    if let Some(sort) = sort {
        key.extend(sort.normalized_columns());
    }
    if let Some(primary_key) = common_primary_key {
        for column in primary_key.normalized_columns() {
            if !key.contains(&column) {
                key.push(column);
            }
        }
    }
    if key.is_empty() {
        return None;
    }

    let mut positions = vec![0usize; orderings.len()];
    for column in &key {
        for (ordering, position) in orderings.iter().zip(positions.iter_mut()) {
            if !ordering.provides(column, position) {
                return None;
            }
        }
    }

    Some(key)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> KeyExpression {
        KeyExpression::field(name)
    }

    fn ordering(equality: &[&str], ordered: &[&str]) -> PlanOrderingKey {
        PlanOrderingKey {
            equality_columns: equality.iter().map(|name| field(name)).collect(),
            ordered_columns: ordered.iter().map(|name| field(name)).collect(),
            reverse: false,
        }
    }

    #[test]
    fn primary_key_suffix_merges_when_ordered() {
        let left = ordering(&["a"], &["id"]);
        let right = ordering(&["b"], &["id"]);

        let key = merge_comparison_key(&[&left, &right], None, Some(&field("id")));
        assert_eq!(key, Some(vec![field("id")]));
    }

    #[test]
    fn sort_prefixes_the_comparison_key() {
        let left = ordering(&[], &["age", "id"]);
        let right = ordering(&["name"], &["age", "id"]);

        let key = merge_comparison_key(&[&left, &right], Some(&field("age")), Some(&field("id")));
        assert_eq!(key, Some(vec![field("age"), field("id")]));
    }

    #[test]
    fn equality_bound_columns_are_free() {
        // "id" is constant on the left plan, ordered on the right: both
        // provide order on it.
        let left = ordering(&["id"], &[]);
        let right = ordering(&[], &["id"]);

        let key = merge_comparison_key(&[&left, &right], None, Some(&field("id")));
        assert_eq!(key, Some(vec![field("id")]));
    }

    #[test]
    fn gap_in_ordered_columns_rejects_the_merge() {
        // The plan orders by (age, id); asking for (id) alone skips "age".
        let plan = ordering(&[], &["age", "id"]);

        let key = merge_comparison_key(&[&plan], None, Some(&field("id")));
        assert_eq!(key, None);
    }

    #[test]
    fn direction_mismatch_rejects_the_merge() {
        let forward = ordering(&[], &["id"]);
        let mut backward = ordering(&[], &["id"]);
        backward.reverse = true;

        assert_eq!(
            merge_comparison_key(&[&forward, &backward], None, Some(&field("id"))),
            None
        );
    }
}
