//! Core vocabulary shared by every other module.
//!
//! - Identity traits for states and events
//! - The extended state store and event headers
//! - Guards and actions, plus the contexts they receive

mod action;
mod context;
mod extended_state;
mod guard;
mod headers;
mod state;
pub(crate) mod values;

pub use action::{Action, ActionError};
pub use context::{ActionContext, StateContext};
pub use extended_state::ExtendedState;
pub use guard::{Guard, GuardFault};
pub use headers::MessageHeaders;
pub use state::{EventId, StateId};
pub use values::VariableError;
