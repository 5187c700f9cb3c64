//! Serializable capture of a machine's execution state.

use crate::core::{EventId, ExtendedState, MessageHeaders, StateId};
use crate::tree::{Configuration, Region, StateIndex, StateKind, StateTree};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot of the active configuration plus extended state.
///
/// One context describes one region. `state` is the active leaf of that
/// region, unless the active path passes an orthogonal state: then `state`
/// is the orthogonal state and `children` holds one context per region it
/// owns. A tree with several top-level regions is captured with
/// `state: None` and one child per top-level region.
///
/// Only the outermost context carries extended state; children carry an
/// empty store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct StateMachineContext<S: StateId, E: EventId> {
    pub state: Option<S>,
    /// Last accepted event.
    pub event: Option<E>,
    pub event_headers: Option<MessageHeaders>,
    pub extended_state: ExtendedState,
    pub children: Vec<StateMachineContext<S, E>>,
    /// Number of accepted dispatches behind this snapshot. Used as the
    /// replication order token.
    pub version: u64,
    pub machine_id: Option<Uuid>,
    pub captured_at: DateTime<Utc>,
}

impl<S: StateId, E: EventId> StateMachineContext<S, E> {
    /// Hand-built context, typically used to reset a machine to `state`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use chorus::context::StateMachineContext;
    /// use chorus::core::ExtendedState;
    ///
    /// let mut vars = ExtendedState::new();
    /// vars.put("foo", 1).unwrap();
    ///
    /// let ctx: StateMachineContext<String, String> =
    ///     StateMachineContext::new(Some("S12".to_string()), vars);
    /// assert_eq!(ctx.recorded_states(), vec![&"S12".to_string()]);
    /// ```
    pub fn new(state: Option<S>, extended_state: ExtendedState) -> Self {
        Self {
            state,
            event: None,
            event_headers: None,
            extended_state,
            children: Vec::new(),
            version: 0,
            machine_id: None,
            captured_at: Utc::now(),
        }
    }

    pub fn with_children(mut self, children: Vec<StateMachineContext<S, E>>) -> Self {
        self.children = children;
        self
    }

    pub fn with_event(mut self, event: Option<E>, headers: Option<MessageHeaders>) -> Self {
        self.event = event;
        self.event_headers = headers;
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn with_machine_id(mut self, machine_id: Uuid) -> Self {
        self.machine_id = Some(machine_id);
        self
    }

    /// Capture `configuration` of `tree` together with `extended_state`.
    ///
    /// Pure: nothing is read from or written to a running machine. Event,
    /// version and machine id are left for the caller to fill in.
    pub fn capture(
        tree: &StateTree<S, E>,
        configuration: &Configuration,
        extended_state: &ExtendedState,
    ) -> Self {
        let mut regions: Vec<Self> = tree
            .root_regions()
            .iter()
            .filter_map(|region| capture_region(tree, configuration, region))
            .collect();

        let mut root = if tree.root_regions().len() == 1 {
            regions.pop().unwrap_or_else(|| Self::new(None, ExtendedState::new()))
        } else {
            Self::new(None, ExtendedState::new()).with_children(regions)
        };
        root.extended_state = extended_state.clone();
        root
    }

    /// Every state id recorded in this context and its children.
    pub fn recorded_states(&self) -> Vec<&S> {
        let mut states = Vec::new();
        self.collect_states(&mut states);
        states
    }

    fn collect_states<'s>(&'s self, out: &mut Vec<&'s S>) {
        if let Some(state) = &self.state {
            out.push(state);
        }
        for child in &self.children {
            child.collect_states(out);
        }
    }
}

fn capture_region<S: StateId, E: EventId>(
    tree: &StateTree<S, E>,
    configuration: &Configuration,
    region: &Region,
) -> Option<StateMachineContext<S, E>> {
    let mut current = active_child(tree, configuration, region)?;
    loop {
        match tree.kind(current) {
            StateKind::Simple => {
                return Some(StateMachineContext::new(
                    Some(tree.id_of(current).clone()),
                    ExtendedState::new(),
                ));
            }
            StateKind::Composite => {
                current = active_child(tree, configuration, &tree.regions(current)[0])?;
            }
            StateKind::Orthogonal => {
                let children = tree
                    .regions(current)
                    .iter()
                    .filter_map(|r| capture_region(tree, configuration, r))
                    .collect();
                return Some(
                    StateMachineContext::new(Some(tree.id_of(current).clone()), ExtendedState::new())
                        .with_children(children),
                );
            }
        }
    }
}

fn active_child<S: StateId, E: EventId>(
    tree: &StateTree<S, E>,
    configuration: &Configuration,
    region: &Region,
) -> Option<StateIndex> {
    region.states().iter().copied().find(|&state| {
        configuration
            .leaves()
            .any(|leaf| tree.ancestry(leaf).contains(&state))
    })
}
