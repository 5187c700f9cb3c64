//! Thread-safe handle to a running state machine.

use super::engine::{capture, resolve_targets, Core, Engine};
use super::error::MachineError;
use super::outcome::DispatchOutcome;
use crate::context::StateMachineContext;
use crate::core::{EventId, ExtendedState, MessageHeaders, StateId};
use crate::listener::{CompositeListener, ListenerHandle, Notification, StateMachineListener};
use crate::tree::StateTree;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};
use tracing::{debug, info};
use uuid::Uuid;

struct Shared<S: StateId, E: EventId> {
    id: Uuid,
    tree: Arc<StateTree<S, E>>,
    core: RwLock<Core<S, E>>,
    /// Copy of `core` as of the last completed operation. Queries read this.
    committed: RwLock<Core<S, E>>,
    /// Serializes operations that change the configuration.
    gate: Mutex<()>,
    /// Thread currently running guards, actions or listeners for this machine.
    in_flight: Mutex<Option<ThreadId>>,
    listeners: CompositeListener<dyn StateMachineListener<S, E>>,
}

/// Marks the machine busy for the lifetime of the guard.
struct InFlight<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> InFlight<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
        Self { slot }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// A hierarchical state machine instance.
///
/// Cloning the handle shares the instance. Events are processed one at a
/// time: a dispatch runs guards, actions and listener callbacks to completion
/// before the next operation that changes the configuration may begin.
///
/// Queries answer from the state committed by the last completed operation
/// and never wait for a dispatch. A guard, action or listener that queries
/// its own machine sees the state as it was before the current operation.
///
/// # Example
///
/// ```rust
/// use chorus::builder::{StateTreeBuilder, TransitionBuilder};
/// use chorus::machine::StateMachine;
///
/// let tree = StateTreeBuilder::<String, String>::new()
///     .initial("Idle".into())
///     .state("Busy".into())
///     .transition(
///         TransitionBuilder::external()
///             .source("Idle".into())
///             .target("Busy".into())
///             .event("Go".into()),
///     )
///     .build()
///     .unwrap();
///
/// let machine = StateMachine::new(tree);
/// machine.start().unwrap();
/// assert!(machine.dispatch("Go".into()).unwrap().is_accepted());
/// assert_eq!(machine.active_leaves(), vec!["Busy".to_string()]);
/// ```
pub struct StateMachine<S: StateId, E: EventId> {
    shared: Arc<Shared<S, E>>,
}

impl<S: StateId, E: EventId> StateMachine<S, E> {
    pub fn new(tree: impl Into<Arc<StateTree<S, E>>>) -> Self {
        Self::with_id(Uuid::new_v4(), tree.into())
    }

    pub(crate) fn with_id(id: Uuid, tree: Arc<StateTree<S, E>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id,
                tree,
                core: RwLock::new(Core::default()),
                committed: RwLock::new(Core::default()),
                gate: Mutex::new(()),
                in_flight: Mutex::new(None),
                listeners: CompositeListener::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn tree(&self) -> &StateTree<S, E> {
        &self.shared.tree
    }

    pub fn add_listener(&self, listener: Arc<dyn StateMachineListener<S, E>>) -> ListenerHandle {
        self.shared.listeners.register(listener)
    }

    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.shared.listeners.remove(handle)
    }

    /// Enter the initial configuration, or the context restored while stopped.
    ///
    /// Entry actions run ancestor to leaf. Starting a running machine does
    /// nothing.
    pub fn start(&self) -> Result<(), MachineError> {
        self.reject_reentry("start")?;
        let _gate = self.shared.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let _busy = InFlight::enter(&self.shared.in_flight);

        let (notifications, fault) = {
            let mut core = self.write_core();
            if core.running {
                return Ok(());
            }
            let mut engine = Engine::new(self.shared.id, &self.shared.tree, &mut core);
            engine.start();
            let finished = engine.finish();
            self.commit(&core);
            finished
        };
        info!(machine = %self.shared.id, "state machine started");
        self.deliver(&notifications);
        fault.map_or(Ok(()), Err)
    }

    /// Exit every active state, leaf to root. Stopping a stopped machine
    /// does nothing.
    pub fn stop(&self) -> Result<(), MachineError> {
        self.reject_reentry("stop")?;
        let _gate = self.shared.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let _busy = InFlight::enter(&self.shared.in_flight);

        let (notifications, fault) = {
            let mut core = self.write_core();
            if !core.running {
                return Ok(());
            }
            let mut engine = Engine::new(self.shared.id, &self.shared.tree, &mut core);
            engine.stop();
            let finished = engine.finish();
            self.commit(&core);
            finished
        };
        info!(machine = %self.shared.id, "state machine stopped");
        self.deliver(&notifications);
        fault.map_or(Ok(()), Err)
    }

    pub fn is_running(&self) -> bool {
        self.view().running
    }

    pub fn dispatch(&self, event: E) -> Result<DispatchOutcome<S, E>, MachineError> {
        self.dispatch_with(event, MessageHeaders::new())
    }

    /// Dispatch `event` with `headers`.
    ///
    /// Returns [`MachineError::ActionFault`] when an action failed. The
    /// configuration reached is committed and announced either way.
    pub fn dispatch_with(
        &self,
        event: E,
        headers: MessageHeaders,
    ) -> Result<DispatchOutcome<S, E>, MachineError> {
        self.reject_reentry("dispatch")?;
        let _gate = self.shared.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let _busy = InFlight::enter(&self.shared.in_flight);

        let (outcome, notifications, fault) = {
            let mut core = self.write_core();
            if !core.running {
                return Err(MachineError::NotRunning);
            }
            let mut engine = Engine::new(self.shared.id, &self.shared.tree, &mut core);
            let outcome = engine.dispatch(&event, &headers);
            let (notifications, fault) = engine.finish();
            self.commit(&core);
            (outcome, notifications, fault)
        };
        self.deliver(&notifications);
        match fault {
            Some(err) => Err(err),
            None => Ok(outcome),
        }
    }

    /// Reset the machine to `context`.
    ///
    /// On a running machine the recorded states become active immediately,
    /// without running guards or actions and without notifications. On a
    /// stopped machine the context is kept and entered by the next
    /// [`start`](Self::start). Extended state is replaced, not merged.
    ///
    /// Fails with [`MachineError::IllegalOperation`] while a dispatch is in
    /// flight and with [`MachineError::UnknownState`] if the context names a
    /// state this machine does not have.
    pub fn restore(&self, context: &StateMachineContext<S, E>) -> Result<DispatchOutcome<S, E>, MachineError> {
        if self
            .shared
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            return Err(MachineError::IllegalOperation(
                "restore requested while a dispatch is in flight".to_string(),
            ));
        }
        let _gate = self.shared.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let targets = resolve_targets(&self.shared.tree, context)?;

        let mut core = self.write_core();
        if !core.running {
            core.pending = Some(context.clone());
            self.commit(&core);
            debug!(machine = %self.shared.id, version = context.version, "context stored for next start");
            let leaves = self
                .shared
                .tree
                .leaf_ids(&self.shared.tree.resolve(&targets, &mut Vec::new()))
                .into_iter()
                .cloned()
                .collect();
            return Ok(DispatchOutcome::Accepted {
                leaves,
                fired: Vec::new(),
                snapshot: context.clone(),
            });
        }

        let mut engine = Engine::new(self.shared.id, &self.shared.tree, &mut core);
        let outcome = engine.restore(context, &targets);
        self.commit(&core);
        debug!(machine = %self.shared.id, version = context.version, "context restored");
        Ok(outcome)
    }

    /// Capture the current execution state.
    ///
    /// A stopped machine holding a restored context returns that context.
    pub fn snapshot(&self) -> StateMachineContext<S, E> {
        let core = self.view();
        match &core.pending {
            Some(pending) if !core.running => pending.clone(),
            _ => capture(self.shared.id, &self.shared.tree, &core),
        }
    }

    /// Every active state: leaves and their ancestors, in definition order.
    pub fn state_ids(&self) -> Vec<S> {
        let core = self.view();
        self.shared
            .tree
            .active_ids(&core.configuration)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn active_leaves(&self) -> Vec<S> {
        let core = self.view();
        self.shared
            .tree
            .leaf_ids(&core.configuration)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn is_active(&self, id: &S) -> bool {
        let core = self.view();
        self.shared.tree.is_active(id, &core.configuration)
    }

    /// Copy of the extended state.
    pub fn extended_state(&self) -> ExtendedState {
        self.view().extended_state.clone()
    }

    /// Number of accepted dispatches, or the version of the last restored
    /// context.
    pub fn version(&self) -> u64 {
        self.view().version
    }

    fn reject_reentry(&self, operation: &str) -> Result<(), MachineError> {
        let current = thread::current().id();
        let busy = *self.shared.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if busy == Some(current) {
            return Err(MachineError::IllegalOperation(format!(
                "{operation} called from inside a running dispatch"
            )));
        }
        Ok(())
    }

    fn view(&self) -> RwLockReadGuard<'_, Core<S, E>> {
        self.shared.committed.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_core(&self) -> RwLockWriteGuard<'_, Core<S, E>> {
        self.shared.core.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, core: &Core<S, E>) {
        *self.shared.committed.write().unwrap_or_else(PoisonError::into_inner) = core.clone();
    }

    fn deliver(&self, notifications: &[Notification<S, E>]) {
        for notification in notifications {
            notification.deliver(self.shared.id, &self.shared.listeners);
        }
    }
}

impl<S: StateId, E: EventId> Clone for StateMachine<S, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: StateId, E: EventId> fmt::Debug for StateMachine<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("id", &self.shared.id)
            .field("running", &self.is_running())
            .field("leaves", &self.active_leaves())
            .finish()
    }
}
