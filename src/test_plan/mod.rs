//! Scripted scenario testing for state machines.
//!
//! A plan is a list of steps. Each step optionally sends an event, then
//! states what must hold afterwards: active states, extended state
//! variables and how many of each listener callback fired. The plan only
//! uses the public listener, dispatch and query APIs.

mod builder;
mod error;
mod plan;
mod recorder;

pub use builder::{StateMachineTestPlanBuilder, StepBuilder};
pub use error::TestPlanError;
pub use plan::StateMachineTestPlan;
pub use recorder::Callback;
