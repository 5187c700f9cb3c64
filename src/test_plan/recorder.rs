//! Counting listener used by the test plan.

use crate::core::{EventId, MessageHeaders, StateId};
use crate::listener::StateMachineListener;
use crate::tree::TransitionRecord;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Which callback a count refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Callback {
    StateChanged,
    StateEntered,
    StateExited,
    EventNotAccepted,
    Transition,
    TransitionStarted,
    TransitionEnded,
    StateMachineStarted,
    StateMachineStopped,
}

impl Callback {
    const ALL: [Callback; 9] = [
        Callback::StateChanged,
        Callback::StateEntered,
        Callback::StateExited,
        Callback::EventNotAccepted,
        Callback::Transition,
        Callback::TransitionStarted,
        Callback::TransitionEnded,
        Callback::StateMachineStarted,
        Callback::StateMachineStopped,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::StateChanged => "state_changed",
            Self::StateEntered => "state_entered",
            Self::StateExited => "state_exited",
            Self::EventNotAccepted => "event_not_accepted",
            Self::Transition => "transition",
            Self::TransitionStarted => "transition_started",
            Self::TransitionEnded => "transition_ended",
            Self::StateMachineStarted => "state_machine_started",
            Self::StateMachineStopped => "state_machine_stopped",
        }
    }
}

/// Counts callbacks per kind. Counters are reset between plan steps.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    counts: [AtomicUsize; 9],
}

impl Recorder {
    pub(crate) fn count(&self, callback: Callback) -> usize {
        self.counts[callback.slot()].load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        for callback in Callback::ALL {
            self.counts[callback.slot()].store(0, Ordering::SeqCst);
        }
    }

    fn bump(&self, callback: Callback) {
        self.counts[callback.slot()].fetch_add(1, Ordering::SeqCst);
    }
}

impl<S: StateId, E: EventId> StateMachineListener<S, E> for Recorder {
    fn state_changed(&self, _from: Option<&S>, _to: &S) {
        self.bump(Callback::StateChanged);
    }

    fn state_entered(&self, _state: &S) {
        self.bump(Callback::StateEntered);
    }

    fn state_exited(&self, _state: &S) {
        self.bump(Callback::StateExited);
    }

    fn event_not_accepted(&self, _event: &E, _headers: &MessageHeaders) {
        self.bump(Callback::EventNotAccepted);
    }

    fn transition(&self, _transition: &TransitionRecord<S, E>) {
        self.bump(Callback::Transition);
    }

    fn transition_started(&self, _transition: &TransitionRecord<S, E>) {
        self.bump(Callback::TransitionStarted);
    }

    fn transition_ended(&self, _transition: &TransitionRecord<S, E>) {
        self.bump(Callback::TransitionEnded);
    }

    fn state_machine_started(&self, _machine: Uuid) {
        self.bump(Callback::StateMachineStarted);
    }

    fn state_machine_stopped(&self, _machine: Uuid) {
        self.bump(Callback::StateMachineStopped);
    }
}
