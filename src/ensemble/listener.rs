//! Observer interface for ensemble membership and replication.

use super::error::EnsembleError;
use crate::context::StateMachineContext;
use crate::core::{EventId, StateId};
use crate::listener::CompositeListener;
use uuid::Uuid;

/// Callbacks fired by an [`EnsembleCoordinator`](super::EnsembleCoordinator).
#[allow(unused_variables)]
pub trait EnsembleListener<S: StateId, E: EventId>: Send + Sync {
    /// The member joined; `context` is the state it starts from.
    fn state_machine_joined(&self, member: Uuid, context: &StateMachineContext<S, E>) {}

    fn state_machine_left(&self, member: Uuid, context: &StateMachineContext<S, E>) {}

    /// A snapshot from another member was applied locally.
    fn state_changed(&self, context: &StateMachineContext<S, E>) {}

    fn ensemble_error(&self, error: &EnsembleError) {}
}

impl<S: StateId, E: EventId> EnsembleListener<S, E> for CompositeListener<dyn EnsembleListener<S, E>> {
    fn state_machine_joined(&self, member: Uuid, context: &StateMachineContext<S, E>) {
        self.for_each(|l| l.state_machine_joined(member, context));
    }

    fn state_machine_left(&self, member: Uuid, context: &StateMachineContext<S, E>) {
        self.for_each(|l| l.state_machine_left(member, context));
    }

    fn state_changed(&self, context: &StateMachineContext<S, E>) {
        self.for_each(|l| l.state_changed(context));
    }

    fn ensemble_error(&self, error: &EnsembleError) {
        self.for_each(|l| l.ensemble_error(error));
    }
}
