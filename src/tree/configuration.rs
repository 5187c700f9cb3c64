//! Active configuration: the deepest active state of every live region.

use super::state_tree::StateIndex;
use std::collections::BTreeSet;

/// Set of active leaves, one per live region.
///
/// Composite ancestors are implied; use
/// [`StateTree::activation`](super::StateTree::activation) for the full set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    leaves: BTreeSet<StateIndex>,
}

impl Configuration {
    pub(crate) fn from_leaves(leaves: impl IntoIterator<Item = StateIndex>) -> Self {
        Self {
            leaves: leaves.into_iter().collect(),
        }
    }

    /// Leaves in index order.
    pub fn leaves(&self) -> impl Iterator<Item = StateIndex> + '_ {
        self.leaves.iter().copied()
    }

    pub fn contains_leaf(&self, idx: StateIndex) -> bool {
        self.leaves.contains(&idx)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub(crate) fn remove(&mut self, idx: StateIndex) -> bool {
        self.leaves.remove(&idx)
    }

    pub(crate) fn insert(&mut self, idx: StateIndex) {
        self.leaves.insert(idx);
    }
}
