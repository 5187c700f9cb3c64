//! Ensemble error types.

use crate::machine::MachineError;
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by the ensemble transport or coordinator.
///
/// Transport faults never move a member out of the ensemble on their own;
/// they are delivered to [`EnsembleListener::ensemble_error`](super::EnsembleListener::ensemble_error).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EnsembleError {
    /// The substrate already holds a snapshot at least as new as the offered one
    #[error("Write conflict: offered version {offered}, ensemble is at {current}")]
    WriteConflict { offered: u64, current: u64 },

    #[error("Member {0} has not joined the ensemble")]
    NotJoined(Uuid),

    #[error("Member {0} has already joined the ensemble")]
    AlreadyJoined(Uuid),

    /// The member cannot reach the rest of the ensemble
    #[error("Network partition: {0}")]
    Partition(String),

    #[error("Disconnected from ensemble: {0}")]
    Disconnected(String),

    /// A replicated snapshot could not be applied locally
    #[error("Failed to apply replicated snapshot: {0}")]
    Restore(MachineError),

    /// The local machine rejected the operation
    #[error(transparent)]
    Machine(#[from] MachineError),
}
