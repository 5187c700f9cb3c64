//! Saving and restoring machines through a pluggable store.
//!
//! Persistence is an effect run against the store, which acts as the
//! environment:
//!
//! ```rust
//! # use chorus::builder::StateTreeBuilder;
//! # use chorus::machine::StateMachine;
//! use chorus::persist::{persist, restore_from, InMemorySnapshotStore};
//! use stillwater::effect::Effect;
//!
//! # tokio_test_block(async {
//! # let tree = StateTreeBuilder::<String, String>::new().initial("S1".to_string()).build().unwrap();
//! let machine = StateMachine::new(tree);
//! machine.start().unwrap();
//!
//! let store = InMemorySnapshotStore::new();
//! persist(&machine).run(&store).await.unwrap();
//!
//! let restored = restore_from(machine.clone()).run(&store).await.unwrap();
//! assert_eq!(restored.state, Some("S1".to_string()));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
//! # }
//! ```

mod error;

pub use error::PersistError;

use crate::context::{SnapshotEnvelope, StateMachineContext};
use crate::core::{EventId, StateId};
use crate::machine::StateMachine;
use std::sync::{Arc, Mutex, PoisonError};
use stillwater::effect::BoxedEffect;
use stillwater::prelude::*;
use tracing::debug;

/// Where snapshots are kept between runs.
pub trait SnapshotStore<S: StateId, E: EventId>: Send + Sync {
    fn save(&self, context: &StateMachineContext<S, E>) -> Result<(), PersistError>;

    /// Most recently saved snapshot, if any.
    fn load(&self) -> Result<Option<StateMachineContext<S, E>>, PersistError>;
}

/// Save the machine's current snapshot to the store environment.
pub fn persist<S, E, Env>(machine: &StateMachine<S, E>) -> BoxedEffect<(), PersistError, Env>
where
    S: StateId,
    E: EventId,
    Env: SnapshotStore<S, E> + Clone + Send + Sync + 'static,
{
    let machine = machine.clone();
    from_fn(move |store: &Env| -> Result<(), PersistError> {
        let context = machine.snapshot();
        debug!(machine = %machine.id(), version = context.version, "persisting snapshot");
        store.save(&context)
    })
    .boxed()
}

/// Load the latest snapshot from the store environment and restore
/// `machine` to it. Yields the restored snapshot.
pub fn restore_from<S, E, Env>(
    machine: StateMachine<S, E>,
) -> BoxedEffect<StateMachineContext<S, E>, PersistError, Env>
where
    S: StateId,
    E: EventId,
    Env: SnapshotStore<S, E> + Clone + Send + Sync + 'static,
{
    from_fn(move |store: &Env| -> Result<StateMachineContext<S, E>, PersistError> {
        let context = store.load()?.ok_or(PersistError::Empty)?;
        machine.restore(&context)?;
        Ok(context)
    })
    .boxed()
}

/// Store that keeps the latest snapshot in memory, in its JSON envelope
/// form. Clones share the same slot.
pub struct InMemorySnapshotStore {
    slot: Arc<Mutex<Option<String>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Raw stored envelope.
    pub fn raw(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<S: StateId, E: EventId> SnapshotStore<S, E> for InMemorySnapshotStore {
    fn save(&self, context: &StateMachineContext<S, E>) -> Result<(), PersistError> {
        let json = SnapshotEnvelope::new(context.clone()).to_json()?;
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(json);
        Ok(())
    }

    fn load(&self) -> Result<Option<StateMachineContext<S, E>>, PersistError> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_deref() {
            Some(json) => Ok(Some(SnapshotEnvelope::from_json(json)?.into_context())),
            None => Ok(None),
        }
    }
}

impl Clone for InMemorySnapshotStore {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemorySnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySnapshotStore")
            .field("stored", &self.raw().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{StateTreeBuilder, TransitionBuilder};
    use crate::context::SnapshotError;
    use crate::machine::MachineError;
    use crate::tree::StateTree;

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
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn persisted_machine_restores_into_a_fresh_one() {
        let tree = tree();
        let store = InMemorySnapshotStore::new();

        let original = StateMachine::new(Arc::clone(&tree));
        original.start().unwrap();
        original.dispatch(s("E1")).unwrap();
        persist(&original).run(&store).await.unwrap();

        let fresh = StateMachine::new(tree);
        let restored = restore_from(fresh.clone()).run(&store).await.unwrap();
        fresh.start().unwrap();

        assert_eq!(restored.version, 1);
        assert_eq!(fresh.active_leaves(), vec![s("S2")]);
        assert_eq!(fresh.version(), 1);
    }

    #[tokio::test]
    async fn restore_from_empty_store_fails() {
        let store = InMemorySnapshotStore::new();
        let machine = StateMachine::new(tree());

        let result = restore_from(machine).run(&store).await;
        assert!(matches!(result, Err(PersistError::Empty)));
    }

    #[tokio::test]
    async fn snapshot_naming_unknown_state_is_rejected() {
        let store = InMemorySnapshotStore::new();
        let bogus: StateMachineContext<String, String> =
            StateMachineContext::new(Some(s("S9")), Default::default());
        store.save(&bogus).unwrap();

        let result = restore_from(StateMachine::new(tree())).run(&store).await;
        assert!(matches!(
            result,
            Err(PersistError::Machine(MachineError::UnknownState(_)))
        ));
    }

    #[test]
    fn corrupted_store_reports_snapshot_error() {
        let store = InMemorySnapshotStore::new();
        *store.slot.lock().unwrap() = Some("{not json".to_string());

        let loaded: Result<Option<StateMachineContext<String, String>>, _> = store.load();
        assert!(matches!(
            loaded,
            Err(PersistError::Snapshot(SnapshotError::DeserializationFailed(_)))
        ));
    }
}
