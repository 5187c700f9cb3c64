//! Errors raised by the state machine runtime.

use crate::core::{ActionError, GuardFault, VariableError};
use std::fmt;
use thiserror::Error;

/// Which kind of action failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionPhase {
    Entry,
    Exit,
    Transition,
}

impl fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => f.write_str("entry"),
            Self::Exit => f.write_str("exit"),
            Self::Transition => f.write_str("transition"),
        }
    }
}

/// Errors returned by [`StateMachine`](super::StateMachine) operations and
/// delivered on the listener error channel.
///
/// State and event ids are carried by name so the error type does not depend
/// on the machine's id types.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MachineError {
    #[error("State machine is not running")]
    NotRunning,

    #[error("Illegal operation: {0}")]
    IllegalOperation(String),

    #[error("Unknown state '{0}'")]
    UnknownState(String),

    #[error("{phase} action failed{}: {source}", .state.as_ref().map(|s| format!(" in '{s}'")).unwrap_or_default())]
    ActionFault {
        phase: ActionPhase,
        state: Option<String>,
        source: ActionError,
    },

    #[error("Guard on '{state}' for event '{event}' faulted: {fault}")]
    GuardFault {
        state: String,
        event: String,
        fault: GuardFault,
    },

    #[error(transparent)]
    Variable(#[from] VariableError),
}

impl MachineError {
    /// True when a user action failed. The configuration was still committed.
    pub fn is_action_fault(&self) -> bool {
        matches!(self, Self::ActionFault { .. })
    }
}
