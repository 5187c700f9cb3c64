//! Static state graph: states, regions, transitions.
//!
//! The tree is built once, validated, and never mutated afterwards. Runtime
//! state (the active configuration) is kept separately in [`Configuration`].

mod configuration;
mod state_tree;
mod transition;

pub use configuration::Configuration;
pub use state_tree::{Region, StateIndex, StateKind, StateTree};
pub use transition::{Transition, TransitionKind, TransitionRecord};

pub(crate) use state_tree::StateNode;
pub(crate) use transition::Route;
