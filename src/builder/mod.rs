//! Builder API for ergonomic state machine construction.
//!
//! This module provides fluent builders for state trees, transitions and
//! machines, plus macros for declaring id enums with minimal boilerplate.

pub mod error;
pub mod machine;
pub mod macros;
pub mod transition;
pub mod tree;

pub use error::{BuildError, TreeViolation};
pub use machine::StateMachineBuilder;
pub use transition::{TransitionBuilder, TransitionSpec};
pub use tree::StateTreeBuilder;
