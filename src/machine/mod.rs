//! The transition engine and the machine handle built on it.
//!
//! - [`StateMachine`]: start, stop, dispatch, restore and queries
//! - [`DispatchOutcome`]: what a dispatch did
//! - [`MachineError`]: synchronous failures and the listener error channel

mod engine;
mod error;
mod outcome;
mod state_machine;

pub use error::{ActionPhase, MachineError};
pub use outcome::DispatchOutcome;
pub use state_machine::StateMachine;
