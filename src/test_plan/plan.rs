//! Execution of a built test plan.

use super::error::TestPlanError;
use super::recorder::{Callback, Recorder};
use crate::core::{EventId, StateId};
use crate::listener::{ListenerHandle, StateMachineListener};
use crate::machine::StateMachine;
use serde_json::Value;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Which machines receive a step's event.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Target {
    First,
    Machine(String),
    All,
}

/// Exact number of callbacks expected during one step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Expectation {
    pub(crate) callback: Callback,
    pub(crate) count: usize,
}

pub(crate) struct Step<S: StateId, E: EventId> {
    pub(crate) event: Option<(E, Target)>,
    pub(crate) states: Vec<S>,
    /// Key, plus the expected value when one was given.
    pub(crate) variables: Vec<(String, Option<Value>)>,
    pub(crate) counts: Vec<Expectation>,
}

impl<S: StateId, E: EventId> Default for Step<S, E> {
    fn default() -> Self {
        Self {
            event: None,
            states: Vec::new(),
            variables: Vec::new(),
            counts: Vec::new(),
        }
    }
}

/// A scripted scenario run against one or more machines.
///
/// [`test`](Self::test) attaches a counting listener to every machine and
/// starts the ones not yet running. Each step then sends its event and
/// waits until every expectation holds in every machine, or the await time
/// elapses. Callback counts cover only the current step; the first step
/// also sees the start notifications.
pub struct StateMachineTestPlan<S: StateId, E: EventId> {
    machines: Vec<(String, StateMachine<S, E>)>,
    await_time: Duration,
    steps: Vec<Step<S, E>>,
}

struct Attached<'p, S: StateId, E: EventId> {
    id: &'p str,
    machine: &'p StateMachine<S, E>,
    recorder: Arc<Recorder>,
    handle: ListenerHandle,
}

impl<S: StateId, E: EventId> StateMachineTestPlan<S, E> {
    pub(crate) fn new(
        machines: Vec<(String, StateMachine<S, E>)>,
        await_time: Duration,
        steps: Vec<Step<S, E>>,
    ) -> Self {
        Self {
            machines,
            await_time,
            steps,
        }
    }

    /// Run every step. Returns the first expectation that did not hold.
    pub fn test(&self) -> Result<(), TestPlanError> {
        let attached: Vec<Attached<'_, S, E>> = self
            .machines
            .iter()
            .map(|(id, machine)| {
                let recorder = Arc::new(Recorder::default());
                let listener: Arc<dyn StateMachineListener<S, E>> = recorder.clone();
                let handle = machine.add_listener(listener);
                Attached {
                    id,
                    machine,
                    recorder,
                    handle,
                }
            })
            .collect();

        let result = self.run(&attached);

        for a in &attached {
            a.machine.remove_listener(a.handle);
        }
        result
    }

    fn run(&self, attached: &[Attached<'_, S, E>]) -> Result<(), TestPlanError> {
        for a in attached {
            if !a.machine.is_running() {
                a.machine.start().map_err(|error| TestPlanError::Dispatch {
                    step: 0,
                    machine: a.id.to_string(),
                    error,
                })?;
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                for a in attached {
                    a.recorder.reset();
                }
            }
            if let Some((event, target)) = &step.event {
                for a in attached.iter().filter(|a| receives(target, a.id, attached)) {
                    debug!(step = index, machine = a.id, event = event.name(), "sending event");
                    a.machine
                        .dispatch(event.clone())
                        .map_err(|error| TestPlanError::Dispatch {
                            step: index,
                            machine: a.id.to_string(),
                            error,
                        })?;
                }
            }
            self.await_step(index, step, attached)?;
        }
        Ok(())
    }

    fn await_step(
        &self,
        index: usize,
        step: &Step<S, E>,
        attached: &[Attached<'_, S, E>],
    ) -> Result<(), TestPlanError> {
        let deadline = Instant::now() + self.await_time;
        loop {
            match attached.iter().try_for_each(|a| check(index, step, a)) {
                Ok(()) => return Ok(()),
                Err(Unmet::Final(err)) => return Err(err),
                Err(Unmet::Pending(err)) if Instant::now() >= deadline => return Err(err),
                Err(Unmet::Pending(_)) => thread::sleep(POLL_INTERVAL),
            }
        }
    }
}

fn receives<S: StateId, E: EventId>(target: &Target, id: &str, attached: &[Attached<'_, S, E>]) -> bool {
    match target {
        Target::All => true,
        Target::Machine(wanted) => wanted == id,
        Target::First => attached.first().is_some_and(|a| a.id == id),
    }
}

enum Unmet {
    /// May still hold after more waiting.
    Pending(TestPlanError),
    /// A count already overshot; waiting cannot fix it.
    Final(TestPlanError),
}

fn check<S: StateId, E: EventId>(index: usize, step: &Step<S, E>, a: &Attached<'_, S, E>) -> Result<(), Unmet> {
    let unmet = |expected: String, actual: String| TestPlanError::Unmet {
        step: index,
        machine: a.id.to_string(),
        expected,
        actual,
    };

    for expectation in &step.counts {
        let actual = a.recorder.count(expectation.callback);
        if actual != expectation.count {
            let err = unmet(
                format!("{} {}", expectation.count, expectation.callback.name()),
                actual.to_string(),
            );
            return Err(if actual > expectation.count {
                Unmet::Final(err)
            } else {
                Unmet::Pending(err)
            });
        }
    }

    if !step.states.is_empty() {
        let active = a.machine.state_ids();
        if let Some(missing) = step.states.iter().find(|s| !active.contains(s)) {
            return Err(Unmet::Pending(unmet(
                format!("state {} active", missing.name()),
                format!("{active:?}"),
            )));
        }
    }

    if !step.variables.is_empty() {
        let vars = a.machine.extended_state();
        for (key, expected) in &step.variables {
            let actual = vars.get_value(key);
            let holds = match (expected, actual) {
                (None, found) => found.is_some(),
                (Some(want), Some(found)) => want == found,
                (Some(_), None) => false,
            };
            if !holds {
                let expected = match expected {
                    Some(want) => format!("variable {key} = {want}"),
                    None => format!("variable {key}"),
                };
                let actual = actual.map_or_else(|| "absent".to_string(), Value::to_string);
                return Err(Unmet::Pending(unmet(expected, actual)));
            }
        }
    }

    Ok(())
}
