//! Transition definitions.

use super::state_tree::StateIndex;
use crate::core::{Action, EventId, Guard, StateId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a transition treats the states around its source and target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    /// Exits the source branch and re-enters down to the target.
    External,
    /// Runs actions only; the configuration is untouched.
    Internal,
    /// Confined to the containing composite: the container is neither exited nor entered.
    Local,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External => f.write_str("external"),
            Self::Internal => f.write_str("internal"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// Resolved route of a transition inside the tree arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Route {
    External(StateIndex),
    Local(StateIndex),
    Internal,
}

impl Route {
    pub(crate) fn kind(&self) -> TransitionKind {
        match self {
            Self::External(_) => TransitionKind::External,
            Self::Local(_) => TransitionKind::Local,
            Self::Internal => TransitionKind::Internal,
        }
    }

    pub(crate) fn target(&self) -> Option<StateIndex> {
        match self {
            Self::External(t) | Self::Local(t) => Some(*t),
            Self::Internal => None,
        }
    }
}

/// A transition: source, trigger, guard chain, action list and route.
pub struct Transition<S: StateId, E: EventId> {
    pub(crate) source: StateIndex,
    pub(crate) route: Route,
    pub(crate) trigger: E,
    pub(crate) guards: Vec<Guard<S, E>>,
    pub(crate) actions: Vec<Action<S, E>>,
}

impl<S: StateId, E: EventId> Transition<S, E> {
    pub fn source(&self) -> StateIndex {
        self.source
    }

    pub fn target(&self) -> Option<StateIndex> {
        self.route.target()
    }

    pub fn kind(&self) -> TransitionKind {
        self.route.kind()
    }

    pub fn trigger(&self) -> &E {
        &self.trigger
    }

    pub fn guard_count(&self) -> usize {
        self.guards.len()
    }
}

impl<S: StateId, E: EventId> Clone for Transition<S, E> {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            route: self.route,
            trigger: self.trigger.clone(),
            guards: self.guards.clone(),
            actions: self.actions.clone(),
        }
    }
}

impl<S: StateId, E: EventId> fmt::Debug for Transition<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("source", &self.source)
            .field("route", &self.route)
            .field("trigger", &self.trigger)
            .field("guards", &self.guards.len())
            .field("actions", &self.actions.len())
            .finish()
    }
}

/// Listener-facing summary of a fired transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TransitionRecord<S: StateId, E: EventId> {
    pub source: S,
    pub target: Option<S>,
    pub kind: TransitionKind,
    pub event: E,
}
