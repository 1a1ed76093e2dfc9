//! Scored intermediate plans and the selection comparator.

use crate::model::IndexModel;
use crate::plan::RecordQueryPlan;
use crate::planner::IndexScanPreference;
use crate::planner::ordering::PlanOrderingKey;
use crate::query::component::QueryComponent;

///
/// ScoredPlan
///
/// Candidate plan carried through matching. Held by value and re-owned on
/// each transformation step; "with" methods are cheap struct moves.
///

#[derive(Clone, Debug)]
pub(crate) struct ScoredPlan {
    pub plan: RecordQueryPlan,
    /// Number of comparisons sarged into the scan.
    pub score: usize,
    /// Filters that must run on fetched records.
    pub unsatisfied_filters: Vec<QueryComponent>,
    /// Filters evaluable on index entries before the fetch.
    pub index_filters: Vec<QueryComponent>,
    pub creates_duplicates: bool,
    /// Rank comparisons satisfied by the scan itself.
    pub included_rank_comparisons: Vec<QueryComponent>,
    pub ordering_key: Option<PlanOrderingKey>,
    /// Candidate identity: the scanned index, or None for the record scan.
    pub index_name: Option<String>,
    /// Selection weight of the scanned index; None for the record scan.
    pub index_size_overhead: Option<usize>,
    /// True when the scanned index key starts with the common primary key.
    pub index_covers_primary_key: bool,
}

impl ScoredPlan {
    pub fn new(plan: RecordQueryPlan, score: usize) -> Self {
        Self {
            plan,
            score,
            unsatisfied_filters: Vec::new(),
            index_filters: Vec::new(),
            creates_duplicates: false,
            included_rank_comparisons: Vec::new(),
            ordering_key: None,
            index_name: None,
            index_size_overhead: None,
            index_covers_primary_key: false,
        }
    }

    #[must_use]
    pub fn with_index(mut self, index: &IndexModel, covers_primary_key: bool) -> Self {
        self.index_name = Some(index.name.clone());
        self.index_size_overhead = Some(index.size_overhead());
        self.index_covers_primary_key = covers_primary_key;
        self
    }

    pub fn num_non_sargables(&self) -> usize {
        self.unsatisfied_filters.len() + self.index_filters.len()
    }
}

/// Strict selection order between two scored plans (spec comparator).
///
/// Returns true when `candidate` should replace `current`. The final
/// tie-break on index identity keeps the order total, so plan output is a
/// pure function of the input.
pub(crate) fn better_than(
    candidate: &ScoredPlan,
    current: &ScoredPlan,
    preference: IndexScanPreference,
) -> bool {
    if candidate.score != current.score {
        return candidate.score > current.score;
    }
    if candidate.num_non_sargables() != current.num_non_sargables() {
        return candidate.num_non_sargables() < current.num_non_sargables();
    }
    if candidate.index_filters.len() != current.index_filters.len() {
        return candidate.index_filters.len() > current.index_filters.len();
    }

    match (&candidate.index_name, &current.index_name) {
        (Some(_), None) => prefer_index(candidate, preference),
        (None, Some(_)) => !prefer_index(current, preference),
        (Some(candidate_name), Some(current_name)) => {
            let candidate_size = candidate.index_size_overhead.unwrap_or(usize::MAX);
            let current_size = current.index_size_overhead.unwrap_or(usize::MAX);
            if candidate_size != current_size {
                return candidate_size < current_size;
            }
            candidate_name < current_name
        }
        (None, None) => false,
    }
}

// Scan-vs-index preference policy for otherwise equal candidates.
fn prefer_index(indexed: &ScoredPlan, preference: IndexScanPreference) -> bool {
    match preference {
        IndexScanPreference::PreferIndex => true,
        IndexScanPreference::PreferScan => false,
        IndexScanPreference::PreferPrimaryKeyIndex => indexed.index_covers_primary_key,
    }
}

///
/// TESTS
///
