use std::collections::BTreeSet;

///
/// StoreState
///
/// Read-only snapshot of store readability at planning time. Indexes still
/// being built (or disabled) must not be scanned; the planner filters them
/// out of the candidate set.
///

#[derive(Clone, Debug, Default)]
pub struct StoreState {
    unreadable: BTreeSet<String>,
}

impl StoreState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_unreadable<I, S>(indexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unreadable: indexes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn mark_unreadable(&mut self, index: impl Into<String>) {
        self.unreadable.insert(index.into());
    }

    #[must_use]
    pub fn is_readable(&self, index: &str) -> bool {
        !self.unreadable.contains(index)
    }
}
