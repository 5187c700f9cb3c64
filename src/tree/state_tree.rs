//! Arena representation of the state hierarchy.
//!
//! States live in a flat vector addressed by [`StateIndex`]. Parent links and
//! region membership are index fields, so the tree has no back-references and
//! can be shared freely between machines.

use super::configuration::Configuration;
use super::transition::Transition;
use crate::core::{Action, EventId, StateId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Stable position of a state in the arena. Indices follow definition order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateIndex(pub(crate) usize);

impl StateIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

/// Structural kind of a state, derived from how many regions it owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateKind {
    Simple,
    Composite,
    Orthogonal,
}

/// Mutually exclusive sibling states with a designated initial state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub(crate) states: Vec<StateIndex>,
    pub(crate) initial: StateIndex,
}

impl Region {
    pub fn states(&self) -> &[StateIndex] {
        &self.states
    }

    pub fn initial(&self) -> StateIndex {
        self.initial
    }
}

pub(crate) struct StateNode<S: StateId, E: EventId> {
    pub(crate) id: S,
    pub(crate) parent: Option<StateIndex>,
    pub(crate) depth: usize,
    pub(crate) regions: Vec<Region>,
    pub(crate) entry: Vec<Action<S, E>>,
    pub(crate) exit: Vec<Action<S, E>>,
}

impl<S: StateId, E: EventId> StateNode<S, E> {
    pub(crate) fn kind(&self) -> StateKind {
        match self.regions.len() {
            0 => StateKind::Simple,
            1 => StateKind::Composite,
            _ => StateKind::Orthogonal,
        }
    }
}

/// Immutable state graph plus its transitions.
///
/// Built and validated by [`StateTreeBuilder`](crate::builder::StateTreeBuilder).
pub struct StateTree<S: StateId, E: EventId> {
    pub(crate) nodes: Vec<StateNode<S, E>>,
    pub(crate) index: HashMap<S, StateIndex>,
    pub(crate) roots: Vec<Region>,
    pub(crate) transitions: Vec<Transition<S, E>>,
    pub(crate) by_source: HashMap<StateIndex, Vec<usize>>,
}

impl<S: StateId, E: EventId> StateTree<S, E> {
    pub(crate) fn from_parts(
        nodes: Vec<StateNode<S, E>>,
        roots: Vec<Region>,
        transitions: Vec<Transition<S, E>>,
    ) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), StateIndex(i)))
            .collect();
        let mut by_source: HashMap<StateIndex, Vec<usize>> = HashMap::new();
        for (i, transition) in transitions.iter().enumerate() {
            by_source.entry(transition.source).or_default().push(i);
        }
        Self {
            nodes,
            index,
            roots,
            transitions,
            by_source,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, id: &S) -> Option<StateIndex> {
        self.index.get(id).copied()
    }

    pub fn id_of(&self, idx: StateIndex) -> &S {
        &self.nodes[idx.0].id
    }

    pub fn contains(&self, id: &S) -> bool {
        self.index.contains_key(id)
    }

    pub fn kind(&self, idx: StateIndex) -> StateKind {
        self.nodes[idx.0].kind()
    }

    pub fn parent(&self, idx: StateIndex) -> Option<StateIndex> {
        self.nodes[idx.0].parent
    }

    pub fn regions(&self, idx: StateIndex) -> &[Region] {
        &self.nodes[idx.0].regions
    }

    /// Top-level regions of the machine.
    pub fn root_regions(&self) -> &[Region] {
        &self.roots
    }

    pub fn transitions(&self) -> &[Transition<S, E>] {
        &self.transitions
    }

    pub(crate) fn node(&self, idx: StateIndex) -> &StateNode<S, E> {
        &self.nodes[idx.0]
    }

    pub(crate) fn depth(&self, idx: StateIndex) -> usize {
        self.nodes[idx.0].depth
    }

    /// Transitions whose source is `idx`, in definition order.
    pub(crate) fn transitions_from(&self, idx: StateIndex) -> impl Iterator<Item = usize> + '_ {
        self.by_source
            .get(&idx)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
    }

    /// `idx` followed by its ancestors, leaf to root.
    pub(crate) fn ancestry(&self, idx: StateIndex) -> Vec<StateIndex> {
        let mut chain = vec![idx];
        let mut current = idx;
        while let Some(parent) = self.nodes[current.0].parent {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Ids of `id` and its ancestors, leaf to root.
    pub fn ancestors_of(&self, id: &S) -> Option<Vec<&S>> {
        let idx = self.index_of(id)?;
        Some(self.ancestry(idx).into_iter().map(|i| self.id_of(i)).collect())
    }

    pub(crate) fn is_descendant_or_self(&self, idx: StateIndex, of: StateIndex) -> bool {
        let mut current = Some(idx);
        while let Some(c) = current {
            if c == of {
                return true;
            }
            current = self.nodes[c.0].parent;
        }
        false
    }

    /// Regions owned by `scope`, or the top-level regions for `None`.
    pub(crate) fn regions_of_scope(&self, scope: Option<StateIndex>) -> &[Region] {
        match scope {
            Some(idx) => &self.nodes[idx.0].regions,
            None => &self.roots,
        }
    }

    /// Position of the region under `scope` that contains `idx`.
    pub(crate) fn region_containing(&self, scope: Option<StateIndex>, idx: StateIndex) -> Option<usize> {
        self.regions_of_scope(scope).iter().position(|region| {
            region
                .states
                .iter()
                .any(|&s| self.is_descendant_or_self(idx, s))
        })
    }

    /// Enter `idx` and descend to leaves.
    ///
    /// In every region below `idx` the child leading to one of `targets` is
    /// chosen; regions without a target fall back to their initial state.
    /// `entered` receives states ancestor-to-leaf, `leaves` the resolved leaves.
    pub(crate) fn descend(
        &self,
        idx: StateIndex,
        targets: &[StateIndex],
        entered: &mut Vec<StateIndex>,
        leaves: &mut Vec<StateIndex>,
    ) {
        entered.push(idx);
        let node = &self.nodes[idx.0];
        if node.regions.is_empty() {
            leaves.push(idx);
            return;
        }
        for region in &node.regions {
            let next = self.pick_in_region(region, targets);
            self.descend(next, targets, entered, leaves);
        }
    }

    pub(crate) fn pick_in_region(&self, region: &Region, targets: &[StateIndex]) -> StateIndex {
        region
            .states
            .iter()
            .copied()
            .find(|&s| targets.iter().any(|&t| self.is_descendant_or_self(t, s)))
            .unwrap_or(region.initial)
    }

    /// Leaves reached by entering every top-level region towards `targets`.
    pub(crate) fn resolve(&self, targets: &[StateIndex], entered: &mut Vec<StateIndex>) -> Configuration {
        let mut leaves = Vec::new();
        for region in &self.roots {
            let start = self.pick_in_region(region, targets);
            self.descend(start, targets, entered, &mut leaves);
        }
        Configuration::from_leaves(leaves)
    }

    /// Default configuration: one leaf per live region, reached through initial states.
    ///
    /// # Example
    ///
    /// ```rust
    /// use chorus::builder::StateTreeBuilder;
    ///
    /// let tree = StateTreeBuilder::<String, String>::new()
    ///     .initial("S0".to_string())
    ///     .state("S0".to_string())
    ///     .child_initial("S0".to_string(), "S1".to_string())
    ///     .child("S0".to_string(), "S2".to_string())
    ///     .build()
    ///     .unwrap();
    ///
    /// let config = tree.resolve_initial_configuration();
    /// assert_eq!(tree.leaf_ids(&config), vec![&"S1".to_string()]);
    /// ```
    pub fn resolve_initial_configuration(&self) -> Configuration {
        self.resolve(&[], &mut Vec::new())
    }

    /// Every active state: the leaves plus all their ancestors, in index order.
    pub fn activation(&self, config: &Configuration) -> BTreeSet<StateIndex> {
        config
            .leaves()
            .flat_map(|leaf| self.ancestry(leaf))
            .collect()
    }

    pub fn is_active(&self, id: &S, config: &Configuration) -> bool {
        match self.index_of(id) {
            Some(idx) => config
                .leaves()
                .any(|leaf| self.is_descendant_or_self(leaf, idx)),
            None => false,
        }
    }

    pub fn leaf_ids(&self, config: &Configuration) -> Vec<&S> {
        config.leaves().map(|leaf| self.id_of(leaf)).collect()
    }

    pub fn active_ids(&self, config: &Configuration) -> Vec<&S> {
        self.activation(config)
            .into_iter()
            .map(|idx| self.id_of(idx))
            .collect()
    }
}

impl<S: StateId, E: EventId> fmt::Debug for StateTree<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTree")
            .field("states", &self.nodes.iter().map(|n| &n.id).collect::<Vec<_>>())
            .field("roots", &self.roots)
            .field("transitions", &self.transitions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateTreeBuilder;

    fn s(name: &str) -> String {
        name.to_string()
    }

    // S0{S1{S11, S12}, S2{S21{S211, S212}}}
    fn nested() -> StateTree<String, String> {
        StateTreeBuilder::new()
            .initial(s("S0"))
            .state(s("S0"))
            .child_initial(s("S0"), s("S1"))
            .child(s("S0"), s("S2"))
            .child_initial(s("S1"), s("S11"))
            .child(s("S1"), s("S12"))
            .child_initial(s("S2"), s("S21"))
            .child_initial(s("S21"), s("S211"))
            .child(s("S21"), s("S212"))
            .build()
            .unwrap()
    }

    // P orthogonal {A1, A2} | {B1, B2}
    fn orthogonal() -> StateTree<String, String> {
        StateTreeBuilder::new()
            .initial(s("P"))
            .state(s("P"))
            .region_initial(s("P"), 0, s("A1"))
            .region_child(s("P"), 0, s("A2"))
            .region_initial(s("P"), 1, s("B1"))
            .region_child(s("P"), 1, s("B2"))
            .build()
            .unwrap()
    }

    #[test]
    fn initial_configuration_descends_through_composites() {
        let tree = nested();
        let config = tree.resolve_initial_configuration();

        assert_eq!(tree.leaf_ids(&config), vec![&s("S11")]);
        assert_eq!(tree.active_ids(&config), vec![&s("S0"), &s("S1"), &s("S11")]);
    }

    #[test]
    fn initial_configuration_has_one_leaf_per_region() {
        let tree = orthogonal();
        let config = tree.resolve_initial_configuration();

        assert_eq!(tree.leaf_ids(&config), vec![&s("A1"), &s("B1")]);
        assert!(tree.is_active(&s("P"), &config));
        assert!(!tree.is_active(&s("A2"), &config));
    }

    #[test]
    fn ancestors_run_leaf_to_root() {
        let tree = nested();
        let chain = tree.ancestors_of(&s("S211")).unwrap();

        assert_eq!(chain, vec![&s("S211"), &s("S21"), &s("S2"), &s("S0")]);
        assert!(tree.ancestors_of(&s("nope")).is_none());
    }

    #[test]
    fn resolve_lands_on_deep_target() {
        let tree = nested();
        let target = tree.index_of(&s("S12")).unwrap();
        let config = tree.resolve(&[target], &mut Vec::new());

        assert_eq!(tree.active_ids(&config), vec![&s("S0"), &s("S1"), &s("S12")]);
    }

    #[test]
    fn resolve_on_composite_target_takes_initial_children() {
        let tree = nested();
        let target = tree.index_of(&s("S2")).unwrap();
        let config = tree.resolve(&[target], &mut Vec::new());

        assert_eq!(
            tree.active_ids(&config),
            vec![&s("S0"), &s("S2"), &s("S21"), &s("S211")]
        );
    }

    #[test]
    fn descend_reports_entry_order() {
        let tree = orthogonal();
        let mut entered = Vec::new();
        let b2 = tree.index_of(&s("B2")).unwrap();
        let config = tree.resolve(&[b2], &mut entered);

        let names: Vec<&String> = entered.iter().map(|&i| tree.id_of(i)).collect();
        assert_eq!(names, vec![&s("P"), &s("A1"), &s("B2")]);
        assert_eq!(config.len(), 2);
    }

    #[test]
    fn kinds_follow_region_count() {
        let tree = orthogonal();
        let p = tree.index_of(&s("P")).unwrap();
        let a1 = tree.index_of(&s("A1")).unwrap();

        assert_eq!(tree.kind(p), StateKind::Orthogonal);
        assert_eq!(tree.kind(a1), StateKind::Simple);
        assert_eq!(tree.kind(tree.index_of(&s("P")).unwrap()), StateKind::Orthogonal);
        assert_eq!(nested().kind(StateIndex(0)), StateKind::Composite);
    }
}
