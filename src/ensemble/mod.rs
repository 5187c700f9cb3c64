//! Replication of one logical machine across several instances.
//!
//! Each instance joins an ensemble through an [`EnsembleTransport`] and is
//! driven by an [`EnsembleCoordinator`]. Snapshots are the unit of
//! replication; conflict resolution is left to the transport, which must
//! deliver snapshots in a total order per ensemble.

mod coordinator;
mod error;
mod listener;
mod transport;

pub use coordinator::{EnsembleCoordinator, MembershipStatus};
pub use error::EnsembleError;
pub use listener::EnsembleListener;
pub use transport::{EnsembleTransport, InMemoryTransport, TransportEvent};
