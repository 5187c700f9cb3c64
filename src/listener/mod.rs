//! Observers of machine and ensemble activity.
//!
//! [`CompositeListener`] is the single fan-out primitive: it keeps observers
//! in registration order and notifies them newest first. Both the machine
//! listener and the ensemble listener are delivered through it.

mod composite;
mod machine;

pub use composite::{CompositeListener, ListenerHandle};
pub use machine::{Notification, StateMachineListener};
