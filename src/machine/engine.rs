//! Transition engine.
//!
//! The engine works on one locked [`Core`] at a time. A dispatch has two
//! phases: selection evaluates every candidate guard against the extended
//! state as it was when the event arrived, then execution fires the selected
//! transitions one after the other. Listener callbacks are only recorded here;
//! the machine handle delivers them after releasing the lock.

use super::error::{ActionPhase, MachineError};
use super::outcome::DispatchOutcome;
use crate::context::StateMachineContext;
use crate::core::{Action, ActionContext, EventId, ExtendedState, MessageHeaders, StateContext, StateId};
use crate::listener::Notification;
use crate::tree::{Configuration, StateIndex, StateKind, StateTree, TransitionKind, TransitionRecord};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};
use uuid::Uuid;

/// Mutable runtime state of one machine, guarded by the machine's lock.
#[derive(Clone, Debug)]
pub(crate) struct Core<S: StateId, E: EventId> {
    pub(crate) configuration: Configuration,
    pub(crate) extended_state: ExtendedState,
    pub(crate) last_event: Option<E>,
    pub(crate) last_headers: Option<MessageHeaders>,
    pub(crate) version: u64,
    pub(crate) running: bool,
    /// Context restored while stopped, applied by the next start.
    pub(crate) pending: Option<StateMachineContext<S, E>>,
}

impl<S: StateId, E: EventId> Default for Core<S, E> {
    fn default() -> Self {
        Self {
            configuration: Configuration::default(),
            extended_state: ExtendedState::new(),
            last_event: None,
            last_headers: None,
            version: 0,
            running: false,
            pending: None,
        }
    }
}

/// What triggered the actions currently running.
struct Cause<'c, E> {
    event: Option<&'c E>,
    headers: &'c MessageHeaders,
}

impl<E> Clone for Cause<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Cause<'_, E> {}

pub(crate) struct Engine<'a, S: StateId, E: EventId> {
    machine: Uuid,
    tree: &'a StateTree<S, E>,
    core: &'a mut Core<S, E>,
    notifications: Vec<Notification<S, E>>,
    fault: Option<MachineError>,
}

impl<'a, S: StateId, E: EventId> Engine<'a, S, E> {
    pub(crate) fn new(machine: Uuid, tree: &'a StateTree<S, E>, core: &'a mut Core<S, E>) -> Self {
        Self {
            machine,
            tree,
            core,
            notifications: Vec::new(),
            fault: None,
        }
    }

    /// Recorded notifications, plus the action fault if one occurred.
    ///
    /// A fault is also appended to the notifications for the error channel.
    pub(crate) fn finish(mut self) -> (Vec<Notification<S, E>>, Option<MachineError>) {
        if let Some(fault) = &self.fault {
            self.notifications
                .push(Notification::StateMachineError(fault.clone()));
        }
        (self.notifications, self.fault)
    }

    fn capture(&self) -> StateMachineContext<S, E> {
        capture(self.machine, self.tree, &*self.core)
    }

    fn leaf_ids(&self) -> Vec<S> {
        self.tree
            .leaf_ids(&self.core.configuration)
            .into_iter()
            .cloned()
            .collect()
    }

    pub(crate) fn start(&mut self) {
        let tree = self.tree;
        let mut targets = Vec::new();
        if let Some(pending) = self.core.pending.take() {
            // Validated when the context was stored.
            targets = resolve_targets(tree, &pending).unwrap_or_default();
            self.core.extended_state = pending.extended_state;
            self.core.version = pending.version;
            self.core.last_event = pending.event;
            self.core.last_headers = pending.event_headers;
        }

        let mut entered = Vec::new();
        self.core.configuration = tree.resolve(&targets, &mut entered);
        self.core.running = true;
        self.notifications.push(Notification::StateMachineStarted);

        let headers = MessageHeaders::new();
        let cause = Cause {
            event: None,
            headers: &headers,
        };
        for state in entered {
            self.run_actions(&tree.node(state).entry, ActionPhase::Entry, Some(state), cause, None, None);
            self.notifications
                .push(Notification::StateEntered(tree.id_of(state).clone()));
        }
        for leaf in self.core.configuration.leaves() {
            self.notifications.push(Notification::StateChanged {
                from: None,
                to: tree.id_of(leaf).clone(),
            });
        }
    }

    pub(crate) fn stop(&mut self) {
        let tree = self.tree;
        let mut active: Vec<StateIndex> = tree.activation(&self.core.configuration).into_iter().collect();
        sort_deepest_first(tree, &mut active);

        let headers = MessageHeaders::new();
        let cause = Cause {
            event: None,
            headers: &headers,
        };
        for state in active {
            self.run_actions(&tree.node(state).exit, ActionPhase::Exit, Some(state), cause, None, None);
            self.notifications
                .push(Notification::StateExited(tree.id_of(state).clone()));
        }
        self.core.configuration = Configuration::default();
        self.core.running = false;
        self.notifications.push(Notification::StateMachineStopped);
    }

    pub(crate) fn dispatch(&mut self, event: &E, headers: &MessageHeaders) -> DispatchOutcome<S, E> {
        let selected = self.select(event, headers);
        if selected.is_empty() {
            debug!(machine = %self.machine, event = event.name(), "event not accepted");
            self.notifications.push(Notification::EventNotAccepted {
                event: event.clone(),
                headers: headers.clone(),
            });
            return DispatchOutcome::Rejected;
        }

        let cause = Cause {
            event: Some(event),
            headers,
        };
        let fired: Vec<TransitionRecord<S, E>> = selected
            .into_iter()
            .map(|transition| self.fire(transition, cause))
            .collect();

        self.core.version += 1;
        self.core.last_event = Some(event.clone());
        self.core.last_headers = Some(headers.clone());
        debug!(
            machine = %self.machine,
            event = event.name(),
            version = self.core.version,
            "event accepted"
        );

        let snapshot = self.capture();
        self.notifications
            .push(Notification::SnapshotCommitted(snapshot.clone()));
        DispatchOutcome::Accepted {
            leaves: self.leaf_ids(),
            fired,
            snapshot,
        }
    }

    /// Replace configuration and extended state without running anything.
    pub(crate) fn restore(&mut self, context: &StateMachineContext<S, E>, targets: &[StateIndex]) -> DispatchOutcome<S, E> {
        self.core.configuration = self.tree.resolve(targets, &mut Vec::new());
        self.core.extended_state = context.extended_state.clone();
        self.core.version = context.version;
        self.core.last_event = context.event.clone();
        self.core.last_headers = context.event_headers.clone();

        DispatchOutcome::Accepted {
            leaves: self.leaf_ids(),
            fired: Vec::new(),
            snapshot: self.capture(),
        }
    }

    /// Pick the transitions to fire, one search per active leaf.
    ///
    /// Each leaf walks its ancestry leaf to root; the first state with a
    /// passing transition for the event wins for that leaf, and among that
    /// state's transitions the first in definition order wins. A transition
    /// reached from several leaves fires once. A transition that would touch
    /// states already claimed by an earlier selection is dropped.
    fn select(&mut self, event: &E, headers: &MessageHeaders) -> Vec<usize> {
        let tree = self.tree;
        let mut selected: Vec<usize> = Vec::new();
        let mut claimed: BTreeSet<StateIndex> = BTreeSet::new();
        let mut verdicts: HashMap<usize, bool> = HashMap::new();
        let leaves: Vec<StateIndex> = self.core.configuration.leaves().collect();

        for leaf in leaves {
            'walk: for state in tree.ancestry(leaf) {
                for candidate in tree.transitions_from(state) {
                    if tree.transitions()[candidate].trigger() != event {
                        continue;
                    }
                    let passed = match verdicts.get(&candidate) {
                        Some(verdict) => *verdict,
                        None => {
                            let verdict = self.guards_pass(candidate, event, headers);
                            verdicts.insert(candidate, verdict);
                            verdict
                        }
                    };
                    if !passed {
                        continue;
                    }
                    if !selected.contains(&candidate) {
                        let footprint = self.footprint(candidate);
                        if footprint.iter().any(|s| claimed.contains(s)) {
                            debug!(
                                machine = %self.machine,
                                transition = candidate,
                                "conflicting transition dropped"
                            );
                        } else {
                            claimed.extend(footprint);
                            selected.push(candidate);
                        }
                    }
                    break 'walk;
                }
            }
        }
        selected
    }

    fn guards_pass(&mut self, candidate: usize, event: &E, headers: &MessageHeaders) -> bool {
        let tree = self.tree;
        let transition = &tree.transitions()[candidate];
        let ctx = StateContext {
            event: Some(event),
            headers,
            extended_state: &self.core.extended_state,
            source: Some(tree.id_of(transition.source())),
            target: transition.target().map(|t| tree.id_of(t)),
        };

        for guard in &transition.guards {
            match guard.check(&ctx) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(fault) => {
                    let state = tree.id_of(transition.source()).name().to_string();
                    warn!(
                        machine = %self.machine,
                        state = %state,
                        event = event.name(),
                        error = %fault,
                        "guard faulted, treating as false"
                    );
                    self.notifications
                        .push(Notification::StateMachineError(MachineError::GuardFault {
                            state,
                            event: event.name().to_string(),
                            fault,
                        }));
                    return false;
                }
            }
        }
        true
    }

    /// States a transition would exit, or its source for an internal one.
    fn footprint(&self, candidate: usize) -> Vec<StateIndex> {
        let transition = &self.tree.transitions()[candidate];
        match transition.target() {
            None => vec![transition.source()],
            Some(target) => {
                let scope = transition_scope(self.tree, transition.source(), target, transition.kind());
                exit_set(self.tree, &self.core.configuration, scope, target)
            }
        }
    }

    fn fire(&mut self, candidate: usize, cause: Cause<'_, E>) -> TransitionRecord<S, E> {
        let tree = self.tree;
        let transition = &tree.transitions()[candidate];
        let source = transition.source();
        let target = transition.target();
        let record = TransitionRecord {
            source: tree.id_of(source).clone(),
            target: target.map(|t| tree.id_of(t).clone()),
            kind: transition.kind(),
            event: transition.trigger().clone(),
        };
        self.notifications
            .push(Notification::TransitionStarted(record.clone()));

        match target {
            None => {
                self.run_actions(&transition.actions, ActionPhase::Transition, None, cause, Some(source), None);
                self.notifications.push(Notification::Transition(record.clone()));
            }
            Some(target) => {
                let scope = transition_scope(tree, source, target, transition.kind());
                let exits = exit_set(tree, &self.core.configuration, scope, target);
                for &state in &exits {
                    self.run_actions(&tree.node(state).exit, ActionPhase::Exit, Some(state), cause, Some(source), Some(target));
                    self.notifications
                        .push(Notification::StateExited(tree.id_of(state).clone()));
                }
                for &state in &exits {
                    self.core.configuration.remove(state);
                }

                self.run_actions(&transition.actions, ActionPhase::Transition, None, cause, Some(source), Some(target));
                self.notifications.push(Notification::Transition(record.clone()));

                let (entered, leaves) = entry_path(tree, scope, target);
                for &state in &entered {
                    self.run_actions(&tree.node(state).entry, ActionPhase::Entry, Some(state), cause, Some(source), Some(target));
                    self.notifications
                        .push(Notification::StateEntered(tree.id_of(state).clone()));
                }
                for &leaf in &leaves {
                    self.core.configuration.insert(leaf);
                }

                let from = exits.first().copied().unwrap_or(source);
                let to = leaves.first().copied().unwrap_or(target);
                self.notifications.push(Notification::StateChanged {
                    from: Some(tree.id_of(from).clone()),
                    to: tree.id_of(to).clone(),
                });
            }
        }

        self.notifications
            .push(Notification::TransitionEnded(record.clone()));
        record
    }

    /// Run `actions` unless an earlier action of this operation failed.
    /// The first failure is kept and every later action is skipped.
    fn run_actions(
        &mut self,
        actions: &[Action<S, E>],
        phase: ActionPhase,
        state: Option<StateIndex>,
        cause: Cause<'_, E>,
        source: Option<StateIndex>,
        target: Option<StateIndex>,
    ) {
        if self.fault.is_some() {
            return;
        }
        let tree = self.tree;
        for action in actions {
            let mut ctx = ActionContext {
                event: cause.event,
                headers: cause.headers,
                extended_state: &mut self.core.extended_state,
                source: source.map(|s| tree.id_of(s)),
                target: target.map(|t| tree.id_of(t)),
                state: state.map(|s| tree.id_of(s)),
            };
            if let Err(err) = action.execute(&mut ctx) {
                let state = state.map(|s| tree.id_of(s).name().to_string());
                warn!(
                    machine = %self.machine,
                    phase = %phase,
                    state = ?state,
                    error = %err,
                    "action failed, skipping remaining actions"
                );
                self.fault = Some(MachineError::ActionFault {
                    phase,
                    state,
                    source: err,
                });
                return;
            }
        }
    }
}

/// Snapshot of `core`, stamped with its version and the machine id.
pub(crate) fn capture<S: StateId, E: EventId>(
    machine: Uuid,
    tree: &StateTree<S, E>,
    core: &Core<S, E>,
) -> StateMachineContext<S, E> {
    StateMachineContext::capture(tree, &core.configuration, &core.extended_state)
        .with_event(core.last_event.clone(), core.last_headers.clone())
        .with_version(core.version)
        .with_machine_id(machine)
}

/// Map every id recorded in `context` to its index.
pub(crate) fn resolve_targets<S: StateId, E: EventId>(
    tree: &StateTree<S, E>,
    context: &StateMachineContext<S, E>,
) -> Result<Vec<StateIndex>, MachineError> {
    context
        .recorded_states()
        .into_iter()
        .map(|id| {
            tree.index_of(id)
                .ok_or_else(|| MachineError::UnknownState(id.name().to_string()))
        })
        .collect()
}

/// State whose regions bound the exits and entries of a transition.
/// `None` stands for the top level.
fn transition_scope<S: StateId, E: EventId>(
    tree: &StateTree<S, E>,
    source: StateIndex,
    target: StateIndex,
    kind: TransitionKind,
) -> Option<StateIndex> {
    if kind == TransitionKind::Local {
        if tree.kind(source) != StateKind::Simple && tree.is_descendant_or_self(target, source) {
            return Some(source);
        }
        if tree.is_descendant_or_self(source, target) && source != target {
            return Some(target);
        }
    }

    // Nearest proper ancestor of both ends.
    let mut scope = tree.parent(source);
    while let Some(candidate) = scope {
        if candidate != target && tree.is_descendant_or_self(target, candidate) {
            break;
        }
        scope = tree.parent(candidate);
    }

    // Crossing between regions of an orthogonal state leaves the whole state.
    if let Some(candidate) = scope {
        if tree.kind(candidate) == StateKind::Orthogonal
            && tree.region_containing(Some(candidate), source) != tree.region_containing(Some(candidate), target)
        {
            return tree.parent(candidate);
        }
    }
    scope
}

/// Active states below `scope` that the transition leaves, deepest first.
fn exit_set<S: StateId, E: EventId>(
    tree: &StateTree<S, E>,
    configuration: &Configuration,
    scope: Option<StateIndex>,
    target: StateIndex,
) -> Vec<StateIndex> {
    let regions = tree.regions_of_scope(scope);
    let tops: Vec<StateIndex> = if scope == Some(target) {
        regions.iter().flat_map(|r| r.states().iter().copied()).collect()
    } else {
        match tree.region_containing(scope, target) {
            Some(r) => regions[r].states().to_vec(),
            None => Vec::new(),
        }
    };

    let mut exits: Vec<StateIndex> = tree
        .activation(configuration)
        .into_iter()
        .filter(|&state| tops.iter().any(|&top| tree.is_descendant_or_self(state, top)))
        .collect();
    sort_deepest_first(tree, &mut exits);
    exits
}

/// States entered below `scope` on the way to `target`, ancestor to leaf,
/// plus the leaves they resolve to.
fn entry_path<S: StateId, E: EventId>(
    tree: &StateTree<S, E>,
    scope: Option<StateIndex>,
    target: StateIndex,
) -> (Vec<StateIndex>, Vec<StateIndex>) {
    let mut entered = Vec::new();
    let mut leaves = Vec::new();
    if scope == Some(target) {
        for region in tree.regions(target) {
            tree.descend(region.initial(), &[], &mut entered, &mut leaves);
        }
    } else if let Some(r) = tree.region_containing(scope, target) {
        let start = tree.pick_in_region(&tree.regions_of_scope(scope)[r], &[target]);
        tree.descend(start, &[target], &mut entered, &mut leaves);
    }
    (entered, leaves)
}

fn sort_deepest_first<S: StateId, E: EventId>(tree: &StateTree<S, E>, states: &mut [StateIndex]) {
    states.sort_by(|a, b| tree.depth(*b).cmp(&tree.depth(*a)).then(a.cmp(b)));
}
