//! Observer interface for a single state machine.

use super::composite::CompositeListener;
use crate::context::StateMachineContext;
use crate::core::{EventId, MessageHeaders, StateId};
use crate::machine::MachineError;
use crate::tree::TransitionRecord;
use uuid::Uuid;

/// Callbacks fired by a [`StateMachine`](crate::machine::StateMachine).
///
/// Every method has a no-op default, so observers implement only what they
/// need. Callbacks run on the dispatching thread after the new configuration
/// has been committed; they must not block.
///
/// For one external or local transition the order is `transition_started`,
/// `state_exited` per exited state, `transition`, `state_entered` per entered
/// state, `state_changed`, `transition_ended`.
#[allow(unused_variables)]
pub trait StateMachineListener<S: StateId, E: EventId>: Send + Sync {
    /// The logical active state moved. `from` is `None` on start.
    fn state_changed(&self, from: Option<&S>, to: &S) {}

    fn state_entered(&self, state: &S) {}

    fn state_exited(&self, state: &S) {}

    /// No transition matched the event.
    fn event_not_accepted(&self, event: &E, headers: &MessageHeaders) {}

    fn transition(&self, transition: &TransitionRecord<S, E>) {}

    fn transition_started(&self, transition: &TransitionRecord<S, E>) {}

    fn transition_ended(&self, transition: &TransitionRecord<S, E>) {}

    fn state_machine_started(&self, machine: Uuid) {}

    fn state_machine_stopped(&self, machine: Uuid) {}

    /// Error channel: guard faults and action faults.
    fn state_machine_error(&self, machine: Uuid, error: &MachineError) {}

    /// An accepted dispatch committed `context`. Follows the dispatch's
    /// transition callbacks. Start, stop and restore commit nothing.
    fn snapshot_committed(&self, machine: Uuid, context: &StateMachineContext<S, E>) {}
}

/// One buffered listener callback.
///
/// The engine records notifications while it holds the machine lock and
/// delivers them once the lock is released.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification<S: StateId, E: EventId> {
    StateChanged { from: Option<S>, to: S },
    StateEntered(S),
    StateExited(S),
    EventNotAccepted { event: E, headers: MessageHeaders },
    Transition(TransitionRecord<S, E>),
    TransitionStarted(TransitionRecord<S, E>),
    TransitionEnded(TransitionRecord<S, E>),
    StateMachineStarted,
    StateMachineStopped,
    StateMachineError(MachineError),
    SnapshotCommitted(StateMachineContext<S, E>),
}

impl<S: StateId, E: EventId> Notification<S, E> {
    /// Invoke the matching callback on `listener`.
    pub fn deliver<L>(&self, machine: Uuid, listener: &L)
    where
        L: StateMachineListener<S, E> + ?Sized,
    {
        match self {
            Self::StateChanged { from, to } => listener.state_changed(from.as_ref(), to),
            Self::StateEntered(state) => listener.state_entered(state),
            Self::StateExited(state) => listener.state_exited(state),
            Self::EventNotAccepted { event, headers } => listener.event_not_accepted(event, headers),
            Self::Transition(record) => listener.transition(record),
            Self::TransitionStarted(record) => listener.transition_started(record),
            Self::TransitionEnded(record) => listener.transition_ended(record),
            Self::StateMachineStarted => listener.state_machine_started(machine),
            Self::StateMachineStopped => listener.state_machine_stopped(machine),
            Self::StateMachineError(error) => listener.state_machine_error(machine, error),
            Self::SnapshotCommitted(context) => listener.snapshot_committed(machine, context),
        }
    }
}

impl<S: StateId, E: EventId> StateMachineListener<S, E>
    for CompositeListener<dyn StateMachineListener<S, E>>
{
    fn state_changed(&self, from: Option<&S>, to: &S) {
        self.for_each(|l| l.state_changed(from, to));
    }

    fn state_entered(&self, state: &S) {
        self.for_each(|l| l.state_entered(state));
    }

    fn state_exited(&self, state: &S) {
        self.for_each(|l| l.state_exited(state));
    }

    fn event_not_accepted(&self, event: &E, headers: &MessageHeaders) {
        self.for_each(|l| l.event_not_accepted(event, headers));
    }

    fn transition(&self, transition: &TransitionRecord<S, E>) {
        self.for_each(|l| l.transition(transition));
    }

    fn transition_started(&self, transition: &TransitionRecord<S, E>) {
        self.for_each(|l| l.transition_started(transition));
    }

    fn transition_ended(&self, transition: &TransitionRecord<S, E>) {
        self.for_each(|l| l.transition_ended(transition));
    }

    fn state_machine_started(&self, machine: Uuid) {
        self.for_each(|l| l.state_machine_started(machine));
    }

    fn state_machine_stopped(&self, machine: Uuid) {
        self.for_each(|l| l.state_machine_stopped(machine));
    }

    fn state_machine_error(&self, machine: Uuid, error: &MachineError) {
        self.for_each(|l| l.state_machine_error(machine, error));
    }

    fn snapshot_committed(&self, machine: Uuid, context: &StateMachineContext<S, E>) {
        self.for_each(|l| l.snapshot_committed(machine, context));
    }
}
