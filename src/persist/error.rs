//! Persistence error types.

use crate::context::SnapshotError;
use crate::machine::MachineError;
use thiserror::Error;

/// Errors that can occur while saving or restoring a machine through a
/// [`SnapshotStore`](super::SnapshotStore)
#[derive(Debug, Error)]
pub enum PersistError {
    /// The backing store could not be read or written
    #[error("Snapshot store failure: {0}")]
    Store(String),

    /// The store holds no snapshot to restore from
    #[error("No snapshot stored")]
    Empty,

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The machine rejected the stored snapshot
    #[error(transparent)]
    Machine(#[from] MachineError),
}
