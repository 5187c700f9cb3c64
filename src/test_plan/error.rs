//! Test plan error types.

use crate::machine::MachineError;
use thiserror::Error;

/// Errors reported while building or running a test plan
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TestPlanError {
    #[error("Test plan has no state machines")]
    NoMachines,

    #[error("No state machine registered as '{0}'")]
    UnknownMachine(String),

    #[error("State machine '{0}' registered twice")]
    DuplicateMachine(String),

    /// Sending the step's event failed
    #[error("Step {step}: dispatch to '{machine}' failed: {error}")]
    Dispatch {
        step: usize,
        machine: String,
        error: MachineError,
    },

    /// An expectation did not hold before the await time ran out
    #[error("Step {step}: machine '{machine}' expected {expected}, got {actual}")]
    Unmet {
        step: usize,
        machine: String,
        expected: String,
        actual: String,
    },
}
