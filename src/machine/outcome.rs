//! Result of dispatching an event.

use crate::context::StateMachineContext;
use crate::core::{EventId, StateId};
use crate::tree::TransitionRecord;

/// Outcome of [`StateMachine::dispatch`](super::StateMachine::dispatch) and
/// [`StateMachine::restore`](super::StateMachine::restore).
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome<S: StateId, E: EventId> {
    /// At least one transition fired (or a snapshot was restored).
    Accepted {
        /// Active leaves after the dispatch, in definition order.
        leaves: Vec<S>,
        /// Fired transitions in execution order. Empty for a restore.
        fired: Vec<TransitionRecord<S, E>>,
        snapshot: StateMachineContext<S, E>,
    },
    /// No transition matched; nothing changed.
    Rejected,
}

impl<S: StateId, E: EventId> DispatchOutcome<S, E> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn snapshot(&self) -> Option<&StateMachineContext<S, E>> {
        match self {
            Self::Accepted { snapshot, .. } => Some(snapshot),
            Self::Rejected => None,
        }
    }

    pub fn fired(&self) -> &[TransitionRecord<S, E>] {
        match self {
            Self::Accepted { fired, .. } => fired,
            Self::Rejected => &[],
        }
    }
}
