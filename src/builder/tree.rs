//! Builder for constructing validated state trees.
//!
//! Every structural problem is collected with Stillwater's `Validation`
//! instead of stopping at the first one, so a broken tree definition is
//! reported in a single pass.

use crate::builder::error::{BuildError, TreeViolation};
use crate::builder::transition::{TransitionBuilder, TransitionSpec};
use crate::core::{Action, ActionContext, ActionError, EventId, StateId};
use crate::tree::{Region, Route, StateIndex, StateNode, StateTree, Transition, TransitionKind};
use std::collections::{BTreeMap, HashMap, HashSet};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use tracing::debug;

type Check = Validation<(), NonEmptyVec<TreeViolation>>;

/// Where a state was declared: its parent (or the top level) and region number.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Placement<S> {
    parent: Option<S>,
    region: usize,
}

struct Declaration<S> {
    id: S,
    placement: Placement<S>,
    initial: bool,
}

/// Fluent builder for a [`StateTree`].
///
/// States are declared into regions. `state`/`initial` declare top-level
/// states, `child`/`child_initial` declare into a parent's first region and
/// `region_child`/`region_initial` address any region of an orthogonal parent.
/// Redeclaring a state in the same place is allowed.
///
/// # Example
///
/// ```rust
/// use chorus::builder::{StateTreeBuilder, TransitionBuilder};
///
/// let tree = StateTreeBuilder::<String, String>::new()
///     .initial("SI".into())
///     .state("S1".into())
///     .transition(
///         TransitionBuilder::external()
///             .source("SI".into())
///             .target("S1".into())
///             .event("E1".into()),
///     )
///     .build()
///     .unwrap();
///
/// assert_eq!(tree.len(), 2);
/// ```
pub struct StateTreeBuilder<S: StateId, E: EventId> {
    declarations: Vec<Declaration<S>>,
    entry: Vec<(S, Action<S, E>)>,
    exit: Vec<(S, Action<S, E>)>,
    transitions: Vec<TransitionBuilder<S, E>>,
}

impl<S: StateId, E: EventId> StateTreeBuilder<S, E> {
    pub fn new() -> Self {
        Self {
            declarations: Vec::new(),
            entry: Vec::new(),
            exit: Vec::new(),
            transitions: Vec::new(),
        }
    }

    fn declare(mut self, parent: Option<S>, region: usize, id: S, initial: bool) -> Self {
        self.declarations.push(Declaration {
            id,
            placement: Placement { parent, region },
            initial,
        });
        self
    }

    /// Declare the initial state of the first top-level region.
    pub fn initial(self, id: S) -> Self {
        self.declare(None, 0, id, true)
    }

    /// Declare a state in the first top-level region.
    pub fn state(self, id: S) -> Self {
        self.declare(None, 0, id, false)
    }

    pub fn root_region_initial(self, region: usize, id: S) -> Self {
        self.declare(None, region, id, true)
    }

    pub fn root_region_state(self, region: usize, id: S) -> Self {
        self.declare(None, region, id, false)
    }

    /// Declare the initial child of `parent`'s first region.
    pub fn child_initial(self, parent: S, id: S) -> Self {
        self.declare(Some(parent), 0, id, true)
    }

    pub fn child(self, parent: S, id: S) -> Self {
        self.declare(Some(parent), 0, id, false)
    }

    pub fn region_initial(self, parent: S, region: usize, id: S) -> Self {
        self.declare(Some(parent), region, id, true)
    }

    pub fn region_child(self, parent: S, region: usize, id: S) -> Self {
        self.declare(Some(parent), region, id, false)
    }

    pub fn on_entry(mut self, id: S, action: Action<S, E>) -> Self {
        self.entry.push((id, action));
        self
    }

    pub fn on_entry_run<F>(self, id: S, body: F) -> Self
    where
        F: Fn(&mut ActionContext<'_, S, E>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.on_entry(id, Action::new(body))
    }

    pub fn on_exit(mut self, id: S, action: Action<S, E>) -> Self {
        self.exit.push((id, action));
        self
    }

    pub fn on_exit_run<F>(self, id: S, body: F) -> Self
    where
        F: Fn(&mut ActionContext<'_, S, E>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.on_exit(id, Action::new(body))
    }

    /// Add a transition. Definition order is selection order among
    /// transitions sharing a source and event.
    pub fn transition(mut self, builder: TransitionBuilder<S, E>) -> Self {
        self.transitions.push(builder);
        self
    }

    /// Validate the definition and assemble the arena.
    pub fn build(self) -> Result<StateTree<S, E>, BuildError> {
        let mut checks: Vec<Check> = Vec::new();

        // First placement wins; conflicting redeclarations are violations.
        let mut order: Vec<S> = Vec::new();
        let mut placements: HashMap<S, Placement<S>> = HashMap::new();
        let mut initials: HashSet<S> = HashSet::new();
        for decl in &self.declarations {
            match placements.get(&decl.id) {
                None => {
                    placements.insert(decl.id.clone(), decl.placement.clone());
                    order.push(decl.id.clone());
                }
                Some(existing) if *existing == decl.placement => {}
                Some(_) => checks.push(Validation::fail(TreeViolation::DuplicateState {
                    state: decl.id.name().to_string(),
                })),
            }
            if decl.initial && placements.get(&decl.id) == Some(&decl.placement) {
                initials.insert(decl.id.clone());
            }
        }

        if order.is_empty() {
            checks.push(Validation::fail(TreeViolation::EmptyTree));
        }

        for id in &order {
            let Some(Placement {
                parent: Some(parent),
                ..
            }) = placements.get(id)
            else {
                continue;
            };
            if !placements.contains_key(parent) {
                checks.push(Validation::fail(TreeViolation::UnknownParent {
                    state: id.name().to_string(),
                    parent: parent.name().to_string(),
                }));
            }
        }

        checks.extend(check_cycles(&order, &placements));

        // Regions grouped per owner, members in declaration order.
        let mut regions: BTreeMap<(Option<usize>, usize), Vec<S>> = BTreeMap::new();
        let position: HashMap<&S, usize> = order.iter().enumerate().map(|(i, s)| (s, i)).collect();
        for id in &order {
            let placement = &placements[id];
            let owner = placement.parent.as_ref().and_then(|p| position.get(p).copied());
            if placement.parent.is_some() && owner.is_none() {
                continue;
            }
            regions
                .entry((owner, placement.region))
                .or_default()
                .push(id.clone());
        }
        checks.extend(check_regions(&order, &regions, &initials));

        let mut specs = Vec::new();
        for (i, builder) in self.transitions.into_iter().enumerate() {
            match builder.build() {
                Ok(spec) => {
                    for state in std::iter::once(&spec.source).chain(spec.target.as_ref()) {
                        if !placements.contains_key(state) {
                            checks.push(Validation::fail(TreeViolation::UnknownState {
                                state: state.name().to_string(),
                                referenced_by: format!("transition #{i}"),
                            }));
                        }
                    }
                    specs.push(spec);
                }
                Err(e) => checks.push(Validation::fail(TreeViolation::MalformedTransition {
                    transition: i,
                    reason: e.to_string(),
                })),
            }
        }

        for (id, kind) in self
            .entry
            .iter()
            .map(|(id, _)| (id, "entry action"))
            .chain(self.exit.iter().map(|(id, _)| (id, "exit action")))
        {
            if !placements.contains_key(id) {
                checks.push(Validation::fail(TreeViolation::UnknownState {
                    state: id.name().to_string(),
                    referenced_by: kind.to_string(),
                }));
            }
        }

        if let Validation::Failure(errors) = Validation::all_vec(checks).map(|_| ()) {
            return Err(BuildError::Invalid(errors.iter().cloned().collect()));
        }

        let tree = assemble(order, &placements, regions, &initials, self.entry, self.exit, specs);
        check_top_level_crossings(&tree)?;
        debug!(
            states = tree.len(),
            transitions = tree.transitions().len(),
            "state tree built"
        );
        Ok(tree)
    }
}

impl<S: StateId, E: EventId> Default for StateTreeBuilder<S, E> {
    fn default() -> Self {
        Self::new()
    }
}

fn check_cycles<S: StateId>(order: &[S], placements: &HashMap<S, Placement<S>>) -> Vec<Check> {
    let mut checks = Vec::new();
    for id in order {
        let mut seen: HashSet<&S> = HashSet::new();
        let mut current = id;
        while let Some(Placement {
            parent: Some(parent),
            ..
        }) = placements.get(current)
        {
            if parent == id || !seen.insert(parent) {
                checks.push(Validation::fail(TreeViolation::Cycle {
                    state: id.name().to_string(),
                }));
                break;
            }
            current = parent;
        }
    }
    checks
}

fn check_regions<S: StateId>(
    order: &[S],
    regions: &BTreeMap<(Option<usize>, usize), Vec<S>>,
    initials: &HashSet<S>,
) -> Vec<Check> {
    let owner_name = |owner: Option<usize>| owner.map(|i| order[i].name().to_string());
    let mut checks = Vec::new();

    for ((owner, region), members) in regions {
        let flagged: Vec<String> = members
            .iter()
            .filter(|s| initials.contains(*s))
            .map(|s| s.name().to_string())
            .collect();
        match flagged.len() {
            0 => checks.push(Validation::fail(TreeViolation::MissingInitial {
                parent: owner_name(*owner),
                region: *region,
            })),
            1 => {}
            _ => checks.push(Validation::fail(TreeViolation::MultipleInitial {
                parent: owner_name(*owner),
                region: *region,
                states: flagged,
            })),
        }
        for missing in 0..*region {
            if !regions.contains_key(&(*owner, missing)) {
                checks.push(Validation::fail(TreeViolation::RegionGap {
                    parent: owner_name(*owner),
                    region: *region,
                    missing,
                }));
            }
        }
    }
    checks
}

fn assemble<S: StateId, E: EventId>(
    order: Vec<S>,
    placements: &HashMap<S, Placement<S>>,
    regions: BTreeMap<(Option<usize>, usize), Vec<S>>,
    initials: &HashSet<S>,
    entry: Vec<(S, Action<S, E>)>,
    exit: Vec<(S, Action<S, E>)>,
    specs: Vec<TransitionSpec<S, E>>,
) -> StateTree<S, E> {
    let index: HashMap<S, StateIndex> = order
        .iter()
        .enumerate()
        .map(|(i, s)| (s.clone(), StateIndex(i)))
        .collect();

    let mut nodes: Vec<StateNode<S, E>> = order
        .iter()
        .map(|id| StateNode {
            id: id.clone(),
            parent: placements[id].parent.as_ref().and_then(|p| index.get(p).copied()),
            depth: 0,
            regions: Vec::new(),
            entry: Vec::new(),
            exit: Vec::new(),
        })
        .collect();

    for i in 0..nodes.len() {
        let mut depth = 0;
        let mut current = nodes[i].parent;
        while let Some(parent) = current {
            depth += 1;
            current = nodes[parent.0].parent;
        }
        nodes[i].depth = depth;
    }

    let mut roots = Vec::new();
    for ((owner, _), members) in regions {
        let states: Vec<StateIndex> = members.iter().filter_map(|s| index.get(s).copied()).collect();
        let Some(initial) = members
            .iter()
            .find(|s| initials.contains(*s))
            .and_then(|s| index.get(s).copied())
        else {
            continue;
        };
        let region = Region { states, initial };
        match owner {
            Some(owner) => nodes[owner].regions.push(region),
            None => roots.push(region),
        }
    }

    for (id, action) in entry {
        if let Some(idx) = index.get(&id) {
            nodes[idx.0].entry.push(action);
        }
    }
    for (id, action) in exit {
        if let Some(idx) = index.get(&id) {
            nodes[idx.0].exit.push(action);
        }
    }

    let transitions = specs
        .into_iter()
        .filter_map(|spec| {
            let source = *index.get(&spec.source)?;
            let route = match (spec.kind, spec.target) {
                (TransitionKind::Internal, _) => Route::Internal,
                (TransitionKind::External, Some(t)) => Route::External(*index.get(&t)?),
                (TransitionKind::Local, Some(t)) => Route::Local(*index.get(&t)?),
                (_, None) => return None,
            };
            Some(Transition {
                source,
                route,
                trigger: spec.event,
                guards: spec.guards,
                actions: spec.actions,
            })
        })
        .collect();

    StateTree::from_parts(nodes, roots, transitions)
}

fn check_top_level_crossings<S: StateId, E: EventId>(tree: &StateTree<S, E>) -> Result<(), BuildError> {
    if tree.root_regions().len() < 2 {
        return Ok(());
    }
    let violations: Vec<TreeViolation> = tree
        .transitions()
        .iter()
        .enumerate()
        .filter_map(|(i, t)| {
            let target = t.target()?;
            let from = tree.region_containing(None, t.source());
            let to = tree.region_containing(None, target);
            (from != to).then(|| TreeViolation::CrossRegionTransition {
                transition: i,
                from: tree.id_of(t.source()).name().to_string(),
                to: tree.id_of(target).name().to_string(),
            })
        })
        .collect();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(BuildError::Invalid(violations))
    }
}
