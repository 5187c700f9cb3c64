//! Per-dispatch contexts threaded through guards and actions.

use super::extended_state::ExtendedState;
use super::headers::MessageHeaders;
use super::state::{EventId, StateId};

/// Read-only view handed to guards.
#[derive(Debug)]
pub struct StateContext<'a, S: StateId, E: EventId> {
    /// Event being dispatched; `None` outside a dispatch.
    pub event: Option<&'a E>,
    pub headers: &'a MessageHeaders,
    pub extended_state: &'a ExtendedState,
    /// Source state of the transition under evaluation.
    pub source: Option<&'a S>,
    /// Target state; `None` for internal transitions.
    pub target: Option<&'a S>,
}

impl<'a, S: StateId, E: EventId> StateContext<'a, S, E> {
    /// Context not bound to any event or transition.
    pub fn detached(extended_state: &'a ExtendedState, headers: &'a MessageHeaders) -> Self {
        Self {
            event: None,
            headers,
            extended_state,
            source: None,
            target: None,
        }
    }
}

/// Mutable view handed to transition, entry and exit actions.
#[derive(Debug)]
pub struct ActionContext<'a, S: StateId, E: EventId> {
    pub event: Option<&'a E>,
    pub headers: &'a MessageHeaders,
    pub extended_state: &'a mut ExtendedState,
    pub source: Option<&'a S>,
    pub target: Option<&'a S>,
    /// State whose entry or exit action is running; `None` for transition actions.
    pub state: Option<&'a S>,
}

impl<'a, S: StateId, E: EventId> ActionContext<'a, S, E> {
    pub fn detached(extended_state: &'a mut ExtendedState, headers: &'a MessageHeaders) -> Self {
        Self {
            event: None,
            headers,
            extended_state,
            source: None,
            target: None,
            state: None,
        }
    }
}
