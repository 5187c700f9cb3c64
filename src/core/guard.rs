//! Guard predicates for controlling state transitions.
//!
//! Guards decide whether a transition may fire. They see the event, its
//! headers and the extended state as they were when the dispatch began, and
//! cannot mutate anything.

use super::context::StateContext;
use super::state::{EventId, StateId};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Fault raised by a fallible guard.
///
/// The engine treats a faulted guard as `false` and reports the fault on the
/// listener error channel.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Guard evaluation failed: {message}")]
pub struct GuardFault {
    pub message: String,
}

impl GuardFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

type Predicate<S, E> =
    dyn Fn(&StateContext<'_, S, E>) -> Result<bool, GuardFault> + Send + Sync;

/// Predicate that determines if a transition can execute.
///
/// # Example
///
/// ```rust
/// use chorus::core::{ExtendedState, Guard, MessageHeaders, StateContext};
///
/// let foo_is_zero = Guard::<String, String>::new(|ctx| {
///     matches!(ctx.extended_state.get::<i32>("foo"), Ok(Some(0)))
/// });
///
/// let mut vars = ExtendedState::new();
/// vars.put("foo", 0).unwrap();
/// let headers = MessageHeaders::new();
/// let ctx = StateContext::detached(&vars, &headers);
///
/// assert_eq!(foo_is_zero.check(&ctx), Ok(true));
/// ```
pub struct Guard<S: StateId, E: EventId> {
    predicate: Arc<Predicate<S, E>>,
}

impl<S: StateId, E: EventId> Guard<S, E> {
    /// Create a guard from an infallible predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&StateContext<'_, S, E>) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(
                move |ctx: &StateContext<'_, S, E>| -> Result<bool, GuardFault> { Ok(predicate(ctx)) },
            ),
        }
    }

    /// Create a guard whose evaluation may fault.
    pub fn fallible<F>(predicate: F) -> Self
    where
        F: Fn(&StateContext<'_, S, E>) -> Result<bool, GuardFault> + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluate the guard against a context.
    pub fn check(&self, ctx: &StateContext<'_, S, E>) -> Result<bool, GuardFault> {
        (self.predicate)(ctx)
    }
}

impl<S: StateId, E: EventId> Clone for Guard<S, E> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<S: StateId, E: EventId> fmt::Debug for Guard<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard")
    }
}
