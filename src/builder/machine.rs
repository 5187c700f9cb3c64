//! Builder for constructing state machines.

use crate::core::{EventId, StateId};
use crate::listener::StateMachineListener;
use crate::machine::{MachineError, StateMachine};
use crate::tree::StateTree;
use std::sync::Arc;
use uuid::Uuid;

/// Builder for a [`StateMachine`] over an already validated tree.
///
/// # Example
///
/// ```rust
/// use chorus::builder::{StateMachineBuilder, StateTreeBuilder};
///
/// let tree = StateTreeBuilder::<String, String>::new()
///     .initial("S0".to_string())
///     .build()
///     .unwrap();
///
/// let machine = StateMachineBuilder::new(tree).auto_start(true).build().unwrap();
/// assert!(machine.is_running());
/// ```
pub struct StateMachineBuilder<S: StateId, E: EventId> {
    tree: Arc<StateTree<S, E>>,
    id: Option<Uuid>,
    listeners: Vec<Arc<dyn StateMachineListener<S, E>>>,
    auto_start: bool,
}

impl<S: StateId, E: EventId> StateMachineBuilder<S, E> {
    /// Create a builder. The tree may be shared between machines.
    pub fn new(tree: impl Into<Arc<StateTree<S, E>>>) -> Self {
        Self {
            tree: tree.into(),
            id: None,
            listeners: Vec::new(),
            auto_start: false,
        }
    }

    /// Set the machine id. A random v4 id is used otherwise.
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Register a listener before the machine starts, so it sees the start
    /// notifications.
    pub fn listener(mut self, listener: Arc<dyn StateMachineListener<S, E>>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Start the machine as part of [`build`](Self::build).
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Build the state machine.
    /// Returns an error only if auto start ran a failing entry action.
    pub fn build(self) -> Result<StateMachine<S, E>, MachineError> {
        let machine = StateMachine::with_id(self.id.unwrap_or_else(Uuid::new_v4), self.tree);
        for listener in self.listeners {
            machine.add_listener(listener);
        }
        if self.auto_start {
            machine.start()?;
        }
        Ok(machine)
    }
}
