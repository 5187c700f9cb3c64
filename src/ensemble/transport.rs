//! Transport contract and a process-local implementation.

use super::error::EnsembleError;
use crate::context::StateMachineContext;
use crate::core::{EventId, StateId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};
use uuid::Uuid;

/// Delivery callbacks from the substrate to one member.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent<S: StateId, E: EventId> {
    /// Membership confirmed. `context` is the ensemble's latest snapshot, if any.
    Joined {
        context: Option<StateMachineContext<S, E>>,
    },
    /// Snapshot published by another member.
    Snapshot(StateMachineContext<S, E>),
    /// The substrate dropped this member.
    Left,
    Fault(EnsembleError),
}

/// Contract a coordination substrate must satisfy.
///
/// The substrate decides the order snapshots are delivered in. Members
/// apply them in that order and discard anything not strictly newer than
/// what they already applied, so a substrate that guarantees a total order
/// per ensemble makes all members converge.
pub trait EnsembleTransport<S: StateId, E: EventId>: Send + Sync {
    /// Register `member`. Events for it arrive on the returned channel,
    /// starting with [`TransportEvent::Joined`].
    fn join(&self, member: Uuid) -> Result<UnboundedReceiver<TransportEvent<S, E>>, EnsembleError>;

    /// Offer a snapshot to every other member.
    fn broadcast(&self, member: Uuid, context: &StateMachineContext<S, E>) -> Result<(), EnsembleError>;

    fn leave(&self, member: Uuid) -> Result<(), EnsembleError>;
}

struct Substrate<S: StateId, E: EventId> {
    members: BTreeMap<Uuid, UnboundedSender<TransportEvent<S, E>>>,
    latest: Option<StateMachineContext<S, E>>,
}

/// Single-process substrate acting as the ensemble's single writer.
///
/// A broadcast is a compare-and-set on the latest snapshot: it succeeds only
/// with a version strictly newer than the stored one, otherwise it fails
/// with [`EnsembleError::WriteConflict`]. Accepted snapshots are delivered
/// to every other member in member-id order.
pub struct InMemoryTransport<S: StateId, E: EventId> {
    inner: Arc<Mutex<Substrate<S, E>>>,
}

impl<S: StateId, E: EventId> InMemoryTransport<S, E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Substrate {
                members: BTreeMap::new(),
                latest: None,
            })),
        }
    }

    /// Latest snapshot accepted by the substrate.
    pub fn latest(&self) -> Option<StateMachineContext<S, E>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest
            .clone()
    }

    pub fn members(&self) -> Vec<Uuid> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .members
            .keys()
            .copied()
            .collect()
    }

    /// Deliver `error` to `member` as a transport fault.
    /// Returns `false` if the member is unknown or its channel is closed.
    pub fn inject_fault(&self, member: Uuid, error: EnsembleError) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.members.get(&member) {
            Some(tx) => tx.send(TransportEvent::Fault(error)).is_ok(),
            None => false,
        }
    }

    /// Drop `member` from the substrate side, as an expired session would.
    pub fn evict(&self, member: Uuid) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.members.remove(&member) {
            Some(tx) => {
                info!(member = %member, "member evicted");
                tx.send(TransportEvent::Left).is_ok()
            }
            None => false,
        }
    }
}

impl<S: StateId, E: EventId> EnsembleTransport<S, E> for InMemoryTransport<S, E> {
    fn join(&self, member: Uuid) -> Result<UnboundedReceiver<TransportEvent<S, E>>, EnsembleError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.members.contains_key(&member) {
            return Err(EnsembleError::AlreadyJoined(member));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(TransportEvent::Joined {
            context: inner.latest.clone(),
        })
        .map_err(|_| EnsembleError::Disconnected(format!("member {member} closed its channel")))?;
        inner.members.insert(member, tx);
        info!(member = %member, members = inner.members.len(), "member joined");
        Ok(rx)
    }

    fn broadcast(&self, member: Uuid, context: &StateMachineContext<S, E>) -> Result<(), EnsembleError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.members.contains_key(&member) {
            return Err(EnsembleError::NotJoined(member));
        }
        if let Some(current) = inner.latest.as_ref().map(|c| c.version) {
            if context.version <= current {
                return Err(EnsembleError::WriteConflict {
                    offered: context.version,
                    current,
                });
            }
        }

        inner.latest = Some(context.clone());
        // Closed channels belong to members that went away without leaving.
        inner.members.retain(|id, tx| {
            *id == member || tx.send(TransportEvent::Snapshot(context.clone())).is_ok()
        });
        debug!(member = %member, version = context.version, "snapshot broadcast");
        Ok(())
    }

    fn leave(&self, member: Uuid) -> Result<(), EnsembleError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.members.remove(&member) {
            Some(_) => {
                info!(member = %member, "member left");
                Ok(())
            }
            None => Err(EnsembleError::NotJoined(member)),
        }
    }
}

impl<S: StateId, E: EventId> Clone for InMemoryTransport<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: StateId, E: EventId> Default for InMemoryTransport<S, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateId, E: EventId> fmt::Debug for InMemoryTransport<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InMemoryTransport")
            .field("members", &inner.members.len())
            .field("version", &inner.latest.as_ref().map(|c| c.version))
            .finish()
    }
}
