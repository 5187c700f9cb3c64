//! Membership and replication for one machine instance.

use super::error::EnsembleError;
use super::listener::EnsembleListener;
use super::transport::{EnsembleTransport, TransportEvent};
use crate::context::StateMachineContext;
use crate::core::{EventId, MessageHeaders, StateId};
use crate::listener::{CompositeListener, ListenerHandle, StateMachineListener};
use crate::machine::{DispatchOutcome, StateMachine};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a member stands in the ensemble.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipStatus {
    NotJoined,
    /// Join requested; waiting for the substrate's confirmation.
    Joining,
    Joined,
    Left,
}

struct Membership {
    status: MembershipStatus,
    applied_version: Option<u64>,
}

/// Membership state shared between the coordinator and the replicator it
/// registers on the machine.
struct Replica<S: StateId, E: EventId, T> {
    member: Uuid,
    transport: Arc<T>,
    membership: Mutex<Membership>,
    listeners: CompositeListener<dyn EnsembleListener<S, E>>,
}

impl<S: StateId, E: EventId, T: EnsembleTransport<S, E>> Replica<S, E, T> {
    fn membership(&self) -> MutexGuard<'_, Membership> {
        self.membership.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> MembershipStatus {
        self.membership().status
    }

    fn set_status(&self, status: MembershipStatus) {
        self.membership().status = status;
    }

    fn applied_version(&self) -> Option<u64> {
        self.membership().applied_version
    }

    fn set_applied(&self, version: u64) {
        self.membership().applied_version = Some(version);
    }

    fn publish(&self, context: &StateMachineContext<S, E>) -> Result<(), EnsembleError> {
        let mut membership = self.membership();
        if membership.status != MembershipStatus::Joined {
            return Err(EnsembleError::NotJoined(self.member));
        }
        self.transport.broadcast(self.member, context)?;
        membership.applied_version = Some(context.version);
        Ok(())
    }

    /// Publish if joined. Failures go to the error channel.
    fn offer(&self, context: &StateMachineContext<S, E>) {
        if self.status() != MembershipStatus::Joined {
            return;
        }
        if let Err(err) = self.publish(context) {
            warn!(member = %self.member, version = context.version, error = %err, "snapshot not published");
            self.listeners.ensemble_error(&err);
        }
    }
}

/// Offers every snapshot the machine commits, whoever dispatched the event.
struct Replicator<S: StateId, E: EventId, T> {
    replica: Arc<Replica<S, E, T>>,
}

impl<S: StateId, E: EventId, T: EnsembleTransport<S, E>> StateMachineListener<S, E> for Replicator<S, E, T> {
    fn snapshot_committed(&self, _machine: Uuid, context: &StateMachineContext<S, E>) {
        self.replica.offer(context);
    }
}

/// Keeps one [`StateMachine`] consistent with the other members of an
/// ensemble.
///
/// While joined, every snapshot the machine commits is offered to the
/// transport. That holds for events sent through
/// [`dispatch`](Self::dispatch) and for events sent straight to the
/// [`machine`](Self::machine) handle. Snapshots from other members are
/// applied with [`StateMachine::restore`], so replication never re-runs
/// guards or actions and never re-publishes. A snapshot is applied only if
/// its version is strictly newer than the last one applied here.
///
/// Transport events are consumed explicitly, either with
/// [`process_pending`](Self::process_pending) or by awaiting
/// [`recv`](Self::recv).
pub struct EnsembleCoordinator<S: StateId, E: EventId, T: EnsembleTransport<S, E>> {
    machine: StateMachine<S, E>,
    replica: Arc<Replica<S, E, T>>,
    inbox: Option<UnboundedReceiver<TransportEvent<S, E>>>,
    /// Replicator registration on the machine, held while a member.
    replicator: Option<ListenerHandle>,
}

impl<S: StateId, E: EventId, T: EnsembleTransport<S, E> + 'static> EnsembleCoordinator<S, E, T> {
    pub fn new(machine: StateMachine<S, E>, transport: Arc<T>) -> Self {
        let replica = Arc::new(Replica {
            member: machine.id(),
            transport,
            membership: Mutex::new(Membership {
                status: MembershipStatus::NotJoined,
                applied_version: None,
            }),
            listeners: CompositeListener::new(),
        });
        Self {
            machine,
            replica,
            inbox: None,
            replicator: None,
        }
    }

    /// Member id; the machine's id.
    pub fn member(&self) -> Uuid {
        self.replica.member
    }

    pub fn machine(&self) -> &StateMachine<S, E> {
        &self.machine
    }

    pub fn status(&self) -> MembershipStatus {
        self.replica.status()
    }

    /// Version of the last snapshot published or applied by this member.
    pub fn applied_version(&self) -> Option<u64> {
        self.replica.applied_version()
    }

    pub fn register_listener(&self, listener: Arc<dyn EnsembleListener<S, E>>) -> ListenerHandle {
        self.replica.listeners.register(listener)
    }

    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.replica.listeners.remove(handle)
    }

    /// Ask the substrate for membership, then handle whatever it has
    /// already delivered. With a synchronous substrate the member is
    /// `Joined` when this returns.
    pub fn join(&mut self) -> Result<(), EnsembleError> {
        if matches!(self.status(), MembershipStatus::Joining | MembershipStatus::Joined) {
            return Err(EnsembleError::AlreadyJoined(self.member()));
        }
        let inbox = self.replica.transport.join(self.member())?;
        self.inbox = Some(inbox);
        self.replica.set_status(MembershipStatus::Joining);
        if self.replicator.is_none() {
            let replicator = Replicator {
                replica: Arc::clone(&self.replica),
            };
            self.replicator = Some(self.machine.add_listener(Arc::new(replicator)));
        }
        debug!(member = %self.member(), "join requested");
        self.process_pending();
        Ok(())
    }

    pub fn leave(&mut self) -> Result<(), EnsembleError> {
        if !matches!(self.status(), MembershipStatus::Joining | MembershipStatus::Joined) {
            return Err(EnsembleError::NotJoined(self.member()));
        }
        self.replica.transport.leave(self.member())?;
        self.mark_left();
        Ok(())
    }

    /// Handle every transport event already queued, without waiting.
    /// Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut events = Vec::new();
        if let Some(inbox) = self.inbox.as_mut() {
            while let Ok(event) = inbox.try_recv() {
                events.push(event);
            }
        }
        let handled = events.len();
        for event in events {
            self.handle(event);
        }
        handled
    }

    /// Wait for the next transport event and handle it.
    /// Returns `false` once the channel is closed or the member never joined.
    pub async fn recv(&mut self) -> bool {
        let Some(inbox) = self.inbox.as_mut() else {
            return false;
        };
        match inbox.recv().await {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Dispatch on the local machine.
    ///
    /// The committed snapshot is published by the replicator, as for any
    /// other dispatch on the machine; publishing failures go to the ensemble
    /// error channel. A dispatch that failed with an action fault still
    /// committed a configuration, which is published too.
    pub fn dispatch(&mut self, event: E) -> Result<DispatchOutcome<S, E>, EnsembleError> {
        self.dispatch_with(event, MessageHeaders::new())
    }

    pub fn dispatch_with(
        &mut self,
        event: E,
        headers: MessageHeaders,
    ) -> Result<DispatchOutcome<S, E>, EnsembleError> {
        Ok(self.machine.dispatch_with(event, headers)?)
    }

    /// Broadcast `context` to the other members.
    pub fn publish(&self, context: &StateMachineContext<S, E>) -> Result<(), EnsembleError> {
        self.replica.publish(context)
    }

    fn handle(&mut self, event: TransportEvent<S, E>) {
        match event {
            TransportEvent::Joined { context } => self.on_joined(context),
            TransportEvent::Snapshot(context) => self.on_snapshot(context),
            TransportEvent::Left => self.mark_left(),
            TransportEvent::Fault(err) => {
                warn!(member = %self.member(), error = %err, "ensemble fault");
                self.replica.listeners.ensemble_error(&err);
            }
        }
    }

    fn on_joined(&mut self, context: Option<StateMachineContext<S, E>>) {
        self.replica.set_status(MembershipStatus::Joined);
        let start = match context {
            // The ensemble's state wins over whatever this member had.
            Some(context) => match self.machine.restore(&context) {
                Ok(_) => {
                    self.replica.set_applied(context.version);
                    context
                }
                Err(err) => {
                    self.replica.listeners.ensemble_error(&EnsembleError::Restore(err));
                    self.machine.snapshot()
                }
            },
            // First member: seed the ensemble with the local state.
            None => {
                let own = self.machine.snapshot();
                if let Err(err) = self.replica.publish(&own) {
                    self.replica.listeners.ensemble_error(&err);
                }
                own
            }
        };
        info!(member = %self.member(), version = start.version, "joined ensemble");
        self.replica.listeners.state_machine_joined(self.member(), &start);
    }

    fn on_snapshot(&mut self, context: StateMachineContext<S, E>) {
        if self.status() != MembershipStatus::Joined {
            debug!(member = %self.member(), "snapshot ignored outside membership");
            return;
        }
        if let Some(applied) = self.applied_version() {
            if context.version <= applied {
                debug!(
                    member = %self.member(),
                    offered = context.version,
                    applied,
                    "stale snapshot discarded"
                );
                return;
            }
        }
        match self.machine.restore(&context) {
            Ok(_) => {
                self.replica.set_applied(context.version);
                debug!(member = %self.member(), version = context.version, "snapshot applied");
                self.replica.listeners.state_changed(&context);
            }
            Err(err) => {
                warn!(member = %self.member(), error = %err, "snapshot could not be applied");
                self.replica.listeners.ensemble_error(&EnsembleError::Restore(err));
            }
        }
    }

    fn mark_left(&mut self) {
        self.replica.set_status(MembershipStatus::Left);
        self.inbox = None;
        if let Some(handle) = self.replicator.take() {
            self.machine.remove_listener(handle);
        }
        info!(member = %self.member(), "left ensemble");
        let snapshot = self.machine.snapshot();
        self.replica.listeners.state_machine_left(self.member(), &snapshot);
    }
}

impl<S: StateId, E: EventId, T: EnsembleTransport<S, E>> fmt::Debug for EnsembleCoordinator<S, E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnsembleCoordinator")
            .field("member", &self.replica.member)
            .field("status", &self.replica.status())
            .field("applied_version", &self.replica.applied_version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{StateTreeBuilder, TransitionBuilder};
    use crate::ensemble::InMemoryTransport;
    use crate::tree::StateTree;
    use crate::machine::MachineError;

    fn s(name: &str) -> String {
        name.to_string()
    }

    fn tree() -> Arc<StateTree<String, String>> {
        Arc::new(
            StateTreeBuilder::new()
                .initial(s("S1"))
                .state(s("S2"))
                .transition(
                    TransitionBuilder::external()
                        .source(s("S1"))
                        .target(s("S2"))
                        .event(s("E1")),
                )
                .transition(
                    TransitionBuilder::external()
                        .source(s("S2"))
                        .target(s("S1"))
                        .event(s("E2")),
                )
                .build()
                .unwrap(),
        )
    }

    fn member(
        tree: &Arc<StateTree<String, String>>,
        transport: &Arc<InMemoryTransport<String, String>>,
    ) -> EnsembleCoordinator<String, String, InMemoryTransport<String, String>> {
        let machine = StateMachine::new(Arc::clone(tree));
        machine.start().unwrap();
        EnsembleCoordinator::new(machine, Arc::clone(transport))
    }

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl EnsembleListener<String, String> for Log {
        fn state_machine_joined(&self, _member: Uuid, context: &StateMachineContext<String, String>) {
            self.0.lock().unwrap().push(format!("joined v{}", context.version));
        }

        fn state_machine_left(&self, _member: Uuid, _context: &StateMachineContext<String, String>) {
            self.0.lock().unwrap().push("left".to_string());
        }

        fn state_changed(&self, context: &StateMachineContext<String, String>) {
            self.0.lock().unwrap().push(format!("changed v{}", context.version));
        }

        fn ensemble_error(&self, error: &EnsembleError) {
            self.0.lock().unwrap().push(format!("error {error}"));
        }
    }

    #[test]
    fn first_member_seeds_the_ensemble() {
        let tree = tree();
        let transport: Arc<InMemoryTransport<String, String>> = Arc::new(InMemoryTransport::new());
        let mut a = member(&tree, &transport);

        a.join().unwrap();

        assert_eq!(a.status(), MembershipStatus::Joined);
        assert_eq!(a.applied_version(), Some(0));
        assert_eq!(transport.latest().map(|c| c.state), Some(Some(s("S1"))));
    }

    #[test]
    fn late_joiner_adopts_ensemble_state() {
        let tree = tree();
        let transport: Arc<InMemoryTransport<String, String>> = Arc::new(InMemoryTransport::new());
        let mut a = member(&tree, &transport);
        a.join().unwrap();
        a.dispatch(s("E1")).unwrap();

        let mut b = member(&tree, &transport);
        let log = Arc::new(Log::default());
        b.register_listener(log.clone());
        b.join().unwrap();

        assert_eq!(b.machine().active_leaves(), vec![s("S2")]);
        assert_eq!(*log.0.lock().unwrap(), vec!["joined v1".to_string()]);
    }

    #[test]
    fn stale_snapshot_is_discarded() {
        let tree = tree();
        let transport: Arc<InMemoryTransport<String, String>> = Arc::new(InMemoryTransport::new());
        let mut a = member(&tree, &transport);
        a.join().unwrap();
        a.dispatch(s("E1")).unwrap();

        let old = a.machine().snapshot().with_version(0);
        a.on_snapshot(old);

        assert_eq!(a.machine().active_leaves(), vec![s("S2")]);
        assert_eq!(a.applied_version(), Some(1));
    }

    #[test]
    fn write_conflict_goes_to_error_channel() {
        let tree = tree();
        let transport: Arc<InMemoryTransport<String, String>> = Arc::new(InMemoryTransport::new());
        let mut a = member(&tree, &transport);
        let mut b = member(&tree, &transport);
        a.join().unwrap();
        b.join().unwrap();
        let log = Arc::new(Log::default());
        b.register_listener(log.clone());

        // Both dispatch from version 0 before seeing each other's snapshot.
        a.dispatch(s("E1")).unwrap();
        let outcome = b.dispatch(s("E1")).unwrap();

        assert!(outcome.is_accepted());
        assert_eq!(b.status(), MembershipStatus::Joined);
        assert_eq!(
            *log.0.lock().unwrap(),
            vec!["error Write conflict: offered version 1, ensemble is at 1".to_string()]
        );
    }

    #[test]
    fn leave_notifies_and_stops_replication() {
        let tree = tree();
        let transport: Arc<InMemoryTransport<String, String>> = Arc::new(InMemoryTransport::new());
        let mut a = member(&tree, &transport);
        let log = Arc::new(Log::default());
        a.register_listener(log.clone());
        a.join().unwrap();

        a.leave().unwrap();
        a.machine().dispatch(s("E1")).unwrap();

        assert_eq!(a.status(), MembershipStatus::Left);
        assert_eq!(*log.0.lock().unwrap(), vec!["joined v0".to_string(), "left".to_string()]);
        assert!(matches!(a.leave(), Err(EnsembleError::NotJoined(_))));
        assert_eq!(a.process_pending(), 0);
        assert_eq!(transport.latest().map(|c| c.version), Some(0));
    }

    #[test]
    fn dispatch_before_join_publishes_nothing() {
        let tree = tree();
        let transport: Arc<InMemoryTransport<String, String>> = Arc::new(InMemoryTransport::new());
        let mut a = member(&tree, &transport);

        a.dispatch(s("E1")).unwrap();

        assert!(transport.latest().is_none());
        assert_eq!(a.applied_version(), None);
    }

    #[test]
    fn dispatch_on_stopped_machine_is_a_machine_error() {
        let tree = tree();
        let transport: Arc<InMemoryTransport<String, String>> = Arc::new(InMemoryTransport::new());
        let machine = StateMachine::new(Arc::clone(&tree));
        let mut a = EnsembleCoordinator::new(machine, transport);

        assert_eq!(
            a.dispatch(s("E1")),
            Err(EnsembleError::Machine(MachineError::NotRunning))
        );
    }
}
