//! Chorus: hierarchical state machines with replicable execution snapshots
//!
//! A machine is built from an immutable [`StateTree`](tree::StateTree) of
//! nested states and orthogonal regions. At runtime it holds one active
//! leaf per active region plus a typed key/value extended state. Its whole
//! execution state can be captured as a [`StateMachineContext`] and
//! restored later, into the same instance or another one.
//!
//! # Core Concepts
//!
//! - **Tree**: states, regions and transitions, validated once at build time
//! - **Machine**: run-to-completion dispatch with guards and actions
//! - **Snapshot**: serializable execution state, the unit of reset and replication
//! - **Listeners**: ordered callbacks for every state and transition change
//! - **Ensemble**: several instances kept consistent by exchanging snapshots
//!
//! # Example
//!
//! ```rust
//! use chorus::builder::{StateTreeBuilder, TransitionBuilder};
//! use chorus::{event_enum, state_enum, StateMachine};
//!
//! state_enum! {
//!     enum Door {
//!         Closed,
//!         Open,
//!     }
//! }
//!
//! event_enum! {
//!     enum Push {
//!         Open,
//!         Close,
//!     }
//! }
//!
//! let tree = StateTreeBuilder::new()
//!     .initial(Door::Closed)
//!     .state(Door::Open)
//!     .transition(
//!         TransitionBuilder::external()
//!             .source(Door::Closed)
//!             .target(Door::Open)
//!             .event(Push::Open)
//!             .run(|ctx| ctx.extended_state.put("opened", true).map_err(Into::into)),
//!     )
//!     .transition(
//!         TransitionBuilder::external()
//!             .source(Door::Open)
//!             .target(Door::Closed)
//!             .event(Push::Close),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let machine = StateMachine::new(tree);
//! machine.start().unwrap();
//! machine.dispatch(Push::Open).unwrap();
//!
//! assert_eq!(machine.active_leaves(), vec![Door::Open]);
//!
//! let snapshot = machine.snapshot();
//! machine.dispatch(Push::Close).unwrap();
//! assert_eq!(machine.active_leaves(), vec![Door::Closed]);
//!
//! machine.restore(&snapshot).unwrap();
//! assert!(machine.is_active(&Door::Open));
//! ```

pub mod builder;
pub mod context;
pub mod core;
pub mod ensemble;
pub mod listener;
pub mod machine;
pub mod persist;
pub mod test_plan;
pub mod tree;

// Re-export commonly used types
pub use builder::{StateMachineBuilder, StateTreeBuilder, TransitionBuilder};
pub use context::StateMachineContext;
pub use core::{EventId, ExtendedState, MessageHeaders, StateId};
pub use listener::StateMachineListener;
pub use machine::{DispatchOutcome, MachineError, StateMachine};
