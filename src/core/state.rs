//! Identity traits for states and events.
//!
//! States and events are referred to by opaque, comparable ids. The tree,
//! snapshots and listeners all speak in ids, never in object identity.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// Identifier of a state in a [`StateTree`](crate::tree::StateTree).
///
/// Ids must be unique within a tree. They are serialized into snapshots, so
/// they must round-trip through serde.
///
/// # Example
///
/// ```rust
/// use chorus::core::StateId;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
/// enum Door {
///     Open,
///     Closed,
/// }
///
/// impl StateId for Door {
///     fn name(&self) -> &str {
///         match self {
///             Self::Open => "Open",
///             Self::Closed => "Closed",
///         }
///     }
/// }
///
/// assert_eq!(Door::Open.name(), "Open");
/// ```
pub trait StateId:
    Clone + Eq + Hash + Ord + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Human-readable name used in logs and error messages.
    fn name(&self) -> &str;
}

/// Identifier of an event kind that can trigger transitions.
pub trait EventId:
    Clone + Eq + Hash + Ord + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Human-readable name used in logs and error messages.
    fn name(&self) -> &str;
}

impl StateId for String {
    fn name(&self) -> &str {
        self
    }
}

impl EventId for String {
    fn name(&self) -> &str {
        self
    }
}
