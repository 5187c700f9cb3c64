//! Execution-state snapshots.
//!
//! A [`StateMachineContext`] is the unit of persistence, reset and
//! replication: the active configuration plus extended state, with no
//! guards or actions attached. [`SnapshotEnvelope`] gives it a versioned
//! JSON or binary wire form.

mod codec;
mod error;
mod snapshot;

pub use codec::{SnapshotEnvelope, SNAPSHOT_FORMAT_VERSION};
pub use error::SnapshotError;
pub use snapshot::StateMachineContext;
