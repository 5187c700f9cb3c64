//! Side-effecting actions run on transitions and on state entry/exit.

use super::context::ActionContext;
use super::state::{EventId, StateId};
use super::values::VariableError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by an action.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<VariableError> for ActionError {
    fn from(err: VariableError) -> Self {
        Self::new(err.to_string())
    }
}

type Body<S, E> = dyn Fn(&mut ActionContext<'_, S, E>) -> Result<(), ActionError> + Send + Sync;

/// An action bound to a transition or to a state's entry/exit.
///
/// Actions run synchronously on the dispatching thread and must not block.
///
/// # Example
///
/// ```rust
/// use chorus::core::{Action, ActionContext, ExtendedState, MessageHeaders};
///
/// let bump = Action::<String, String>::new(|ctx| {
///     let foo = ctx.extended_state.get::<i32>("foo")?.unwrap_or(0);
///     ctx.extended_state.put("foo", foo + 1)?;
///     Ok(())
/// });
///
/// let mut vars = ExtendedState::new();
/// let headers = MessageHeaders::new();
/// bump.execute(&mut ActionContext::detached(&mut vars, &headers)).unwrap();
///
/// assert_eq!(vars.get::<i32>("foo").unwrap(), Some(1));
/// ```
pub struct Action<S: StateId, E: EventId> {
    body: Arc<Body<S, E>>,
}

impl<S: StateId, E: EventId> Action<S, E> {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut ActionContext<'_, S, E>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(body),
        }
    }

    pub fn execute(&self, ctx: &mut ActionContext<'_, S, E>) -> Result<(), ActionError> {
        (self.body)(ctx)
    }
}

impl<S: StateId, E: EventId> Clone for Action<S, E> {
    fn clone(&self) -> Self {
        Self {
            body: Arc::clone(&self.body),
        }
    }
}

impl<S: StateId, E: EventId> fmt::Debug for Action<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Action")
    }
}
