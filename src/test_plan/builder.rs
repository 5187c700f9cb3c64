//! Fluent construction of a [`StateMachineTestPlan`].

use super::error::TestPlanError;
use super::plan::{Expectation, StateMachineTestPlan, Step, Target};
use super::recorder::Callback;
use crate::core::{EventId, StateId};
use crate::machine::StateMachine;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_AWAIT_TIME: Duration = Duration::from_secs(1);

/// Builder for [`StateMachineTestPlan`].
///
/// # Example
///
/// ```rust
/// use chorus::builder::{StateTreeBuilder, TransitionBuilder};
/// use chorus::machine::StateMachine;
/// use chorus::test_plan::StateMachineTestPlanBuilder;
///
/// let tree = StateTreeBuilder::<String, String>::new()
///     .initial("S1".to_string())
///     .state("S2".to_string())
///     .transition(
///         TransitionBuilder::external()
///             .source("S1".to_string())
///             .target("S2".to_string())
///             .event("E1".to_string()),
///     )
///     .build()
///     .unwrap();
///
/// let plan = StateMachineTestPlanBuilder::new()
///     .state_machine(StateMachine::new(tree))
///     .step()
///     .expect_state("S1".to_string())
///     .expect_state_machine_started(1)
///     .and()
///     .step()
///     .send_event("E1".to_string())
///     .expect_state("S2".to_string())
///     .expect_state_changed(1)
///     .and()
///     .build()
///     .unwrap();
///
/// plan.test().unwrap();
/// ```
pub struct StateMachineTestPlanBuilder<S: StateId, E: EventId> {
    machines: Vec<(String, StateMachine<S, E>)>,
    await_time: Duration,
    steps: Vec<Step<S, E>>,
}

impl<S: StateId, E: EventId> StateMachineTestPlanBuilder<S, E> {
    pub fn new() -> Self {
        Self {
            machines: Vec::new(),
            await_time: DEFAULT_AWAIT_TIME,
            steps: Vec::new(),
        }
    }

    /// Add a machine under its own id.
    pub fn state_machine(self, machine: StateMachine<S, E>) -> Self {
        let id = machine.id().to_string();
        self.state_machine_with_id(machine, id)
    }

    pub fn state_machine_with_id(mut self, machine: StateMachine<S, E>, id: impl Into<String>) -> Self {
        self.machines.push((id.into(), machine));
        self
    }

    /// How long a step may take for its expectations to hold.
    pub fn default_await_time(mut self, await_time: Duration) -> Self {
        self.await_time = await_time;
        self
    }

    pub fn step(self) -> StepBuilder<S, E> {
        StepBuilder {
            plan: self,
            step: Step::default(),
        }
    }

    pub fn build(self) -> Result<StateMachineTestPlan<S, E>, TestPlanError> {
        if self.machines.is_empty() {
            return Err(TestPlanError::NoMachines);
        }
        for (i, (id, _)) in self.machines.iter().enumerate() {
            if self.machines[..i].iter().any(|(other, _)| other == id) {
                return Err(TestPlanError::DuplicateMachine(id.clone()));
            }
        }
        for step in &self.steps {
            if let Some((_, Target::Machine(id))) = &step.event {
                if !self.machines.iter().any(|(known, _)| known == id) {
                    return Err(TestPlanError::UnknownMachine(id.clone()));
                }
            }
        }
        Ok(StateMachineTestPlan::new(self.machines, self.await_time, self.steps))
    }
}

impl<S: StateId, E: EventId> Default for StateMachineTestPlanBuilder<S, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// One step under construction; [`and`](Self::and) commits it.
pub struct StepBuilder<S: StateId, E: EventId> {
    plan: StateMachineTestPlanBuilder<S, E>,
    step: Step<S, E>,
}

impl<S: StateId, E: EventId> StepBuilder<S, E> {
    /// Send `event` to the first registered machine.
    pub fn send_event(mut self, event: E) -> Self {
        self.step.event = Some((event, Target::First));
        self
    }

    pub fn send_event_to(mut self, event: E, machine: impl Into<String>) -> Self {
        self.step.event = Some((event, Target::Machine(machine.into())));
        self
    }

    pub fn send_event_to_all(mut self, event: E) -> Self {
        self.step.event = Some((event, Target::All));
        self
    }

    /// Expect `state` to be active in every machine.
    pub fn expect_state(mut self, state: S) -> Self {
        self.step.states.push(state);
        self
    }

    pub fn expect_states(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.step.states.extend(states);
        self
    }

    /// Expect extended state to contain `key`.
    pub fn expect_variable(mut self, key: impl Into<String>) -> Self {
        self.step.variables.push((key.into(), None));
        self
    }

    /// Expect extended state to hold `value` under `key`. A value that does
    /// not serialize never matches.
    pub fn expect_variable_value<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.step.variables.push((key.into(), Some(value)));
        self
    }

    fn expect(mut self, callback: Callback, count: usize) -> Self {
        self.step.counts.retain(|e: &Expectation| e.callback != callback);
        self.step.counts.push(Expectation { callback, count });
        self
    }

    pub fn expect_state_changed(self, count: usize) -> Self {
        self.expect(Callback::StateChanged, count)
    }

    pub fn expect_state_entered(self, count: usize) -> Self {
        self.expect(Callback::StateEntered, count)
    }

    pub fn expect_state_exited(self, count: usize) -> Self {
        self.expect(Callback::StateExited, count)
    }

    pub fn expect_event_not_accepted(self, count: usize) -> Self {
        self.expect(Callback::EventNotAccepted, count)
    }

    pub fn expect_transition(self, count: usize) -> Self {
        self.expect(Callback::Transition, count)
    }

    pub fn expect_transition_started(self, count: usize) -> Self {
        self.expect(Callback::TransitionStarted, count)
    }

    pub fn expect_transition_ended(self, count: usize) -> Self {
        self.expect(Callback::TransitionEnded, count)
    }

    pub fn expect_state_machine_started(self, count: usize) -> Self {
        self.expect(Callback::StateMachineStarted, count)
    }

    pub fn expect_state_machine_stopped(self, count: usize) -> Self {
        self.expect(Callback::StateMachineStopped, count)
    }

    pub fn and(mut self) -> StateMachineTestPlanBuilder<S, E> {
        self.plan.steps.push(self.step);
        self.plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateTreeBuilder;

    fn machine() -> StateMachine<String, String> {
        let tree = StateTreeBuilder::new().initial("S1".to_string()).build().unwrap();
        StateMachine::new(tree)
    }

    #[test]
    fn plan_needs_a_machine() {
        let result = StateMachineTestPlanBuilder::<String, String>::new().build();
        assert!(matches!(result, Err(TestPlanError::NoMachines)));
    }

    #[test]
    fn event_target_must_be_registered() {
        let result = StateMachineTestPlanBuilder::new()
            .state_machine_with_id(machine(), "a")
            .step()
            .send_event_to("E1".to_string(), "b")
            .and()
            .build();
        assert!(matches!(result, Err(TestPlanError::UnknownMachine(id)) if id == "b"));
    }

    #[test]
    fn machine_ids_are_unique() {
        let result = StateMachineTestPlanBuilder::new()
            .state_machine_with_id(machine(), "a")
            .state_machine_with_id(machine(), "a")
            .build();
        assert!(matches!(result, Err(TestPlanError::DuplicateMachine(_))));
    }

    #[test]
    fn later_count_replaces_earlier_one() {
        let builder = StateMachineTestPlanBuilder::<String, String>::new()
            .step()
            .expect_state_entered(1)
            .expect_state_entered(2);
        assert_eq!(
            builder.step.counts,
            vec![Expectation {
                callback: Callback::StateEntered,
                count: 2
            }]
        );
    }
}
