//! Builder for constructing transitions.

use crate::builder::error::BuildError;
use crate::core::{Action, ActionContext, ActionError, EventId, Guard, StateContext, StateId};
use crate::tree::TransitionKind;

/// Transition definition still expressed in ids, before it is bound to a tree.
pub struct TransitionSpec<S: StateId, E: EventId> {
    pub(crate) kind: TransitionKind,
    pub(crate) source: S,
    pub(crate) target: Option<S>,
    pub(crate) event: E,
    pub(crate) guards: Vec<Guard<S, E>>,
    pub(crate) actions: Vec<Action<S, E>>,
}

/// Builder for constructing transitions with a fluent API.
///
/// Guards are evaluated in the order they are added and must all pass.
/// Actions run in the order they are added.
pub struct TransitionBuilder<S: StateId, E: EventId> {
    kind: TransitionKind,
    source: Option<S>,
    target: Option<S>,
    event: Option<E>,
    guards: Vec<Guard<S, E>>,
    actions: Vec<Action<S, E>>,
}

impl<S: StateId, E: EventId> TransitionBuilder<S, E> {
    /// Create a builder for an external transition.
    pub fn new() -> Self {
        Self::of_kind(TransitionKind::External)
    }

    pub fn external() -> Self {
        Self::of_kind(TransitionKind::External)
    }

    pub fn internal() -> Self {
        Self::of_kind(TransitionKind::Internal)
    }

    pub fn local() -> Self {
        Self::of_kind(TransitionKind::Local)
    }

    fn of_kind(kind: TransitionKind) -> Self {
        Self {
            kind,
            source: None,
            target: None,
            event: None,
            guards: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Set the source state (required).
    pub fn source(mut self, state: S) -> Self {
        self.source = Some(state);
        self
    }

    /// Set the target state (required unless internal).
    pub fn target(mut self, state: S) -> Self {
        self.target = Some(state);
        self
    }

    /// Set the triggering event (required).
    pub fn event(mut self, event: E) -> Self {
        self.event = Some(event);
        self
    }

    /// Append a guard to the chain.
    pub fn guard(mut self, guard: Guard<S, E>) -> Self {
        self.guards.push(guard);
        self
    }

    /// Append a guard using a closure.
    pub fn when<F>(self, predicate: F) -> Self
    where
        F: Fn(&StateContext<'_, S, E>) -> bool + Send + Sync + 'static,
    {
        self.guard(Guard::new(predicate))
    }

    /// Append an action.
    pub fn action(mut self, action: Action<S, E>) -> Self {
        self.actions.push(action);
        self
    }

    /// Append an action using a closure.
    pub fn run<F>(self, body: F) -> Self
    where
        F: Fn(&mut ActionContext<'_, S, E>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.action(Action::new(body))
    }

    /// Validate required fields.
    pub fn build(self) -> Result<TransitionSpec<S, E>, BuildError> {
        let source = self.source.ok_or(BuildError::MissingSource)?;
        let event = self.event.ok_or(BuildError::MissingEvent)?;
        let target = match (self.kind, self.target) {
            (TransitionKind::Internal, Some(_)) => return Err(BuildError::UnexpectedTarget),
            (TransitionKind::Internal, None) => None,
            (_, None) => return Err(BuildError::MissingTarget),
            (_, Some(target)) => Some(target),
        };

        Ok(TransitionSpec {
            kind: self.kind,
            source,
            target,
            event,
            guards: self.guards,
            actions: self.actions,
        })
    }
}

impl<S: StateId, E: EventId> Default for TransitionBuilder<S, E> {
    fn default() -> Self {
        Self::new()
    }
}
