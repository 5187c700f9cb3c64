//! Scripted scenarios run through the test plan harness.

use chorus::builder::{StateTreeBuilder, TransitionBuilder};
use chorus::test_plan::{StateMachineTestPlanBuilder, TestPlanError};
use chorus::tree::StateTree;
use chorus::StateMachine;
use std::sync::Arc;
use std::time::Duration;

fn s(name: &str) -> String {
    name.to_string()
}

/// S0{S1 -E1-> S2}, with an internal E2 on S0 that counts.
fn tree() -> Arc<StateTree<String, String>> {
    Arc::new(
        StateTreeBuilder::new()
            .initial(s("S0"))
            .child_initial(s("S0"), s("S1"))
            .child(s("S0"), s("S2"))
            .transition(
                TransitionBuilder::external()
                    .source(s("S1"))
                    .target(s("S2"))
                    .event(s("E1")),
            )
            .transition(
                TransitionBuilder::internal()
                    .source(s("S0"))
                    .event(s("E2"))
                    .run(|ctx| {
                        let n = ctx.extended_state.get::<u32>("count")?.unwrap_or(0);
                        ctx.extended_state.put("count", n + 1)?;
                        Ok(())
                    }),
            )
            .build()
            .unwrap(),
    )
}

#[test]
fn single_machine_plan_passes() {
    let plan = StateMachineTestPlanBuilder::new()
        .state_machine(StateMachine::new(tree()))
        .step()
        .expect_states([s("S0"), s("S1")])
        .expect_state_machine_started(1)
        .expect_state_entered(2)
        .and()
        .step()
        .send_event(s("E1"))
        .expect_state(s("S2"))
        .expect_state_changed(1)
        .expect_state_exited(1)
        .expect_state_entered(1)
        .expect_transition(1)
        .expect_transition_started(1)
        .expect_transition_ended(1)
        .and()
        .step()
        .send_event(s("E2"))
        .expect_variable("count")
        .expect_variable_value("count", 1)
        .expect_state_changed(0)
        .and()
        .step()
        .send_event(s("E1"))
        .expect_event_not_accepted(1)
        .and()
        .build()
        .unwrap();

    plan.test().unwrap();
}

#[test]
fn events_reach_the_chosen_machines() {
    let first = StateMachine::new(tree());
    let second = StateMachine::new(tree());

    let plan = StateMachineTestPlanBuilder::new()
        .state_machine_with_id(first.clone(), "first")
        .state_machine_with_id(second.clone(), "second")
        .step()
        .send_event_to(s("E2"), "second")
        .and()
        .step()
        .send_event_to_all(s("E1"))
        .expect_state(s("S2"))
        .expect_transition(1)
        .and()
        .build()
        .unwrap();

    plan.test().unwrap();

    assert!(first.extended_state().get::<u32>("count").unwrap().is_none());
    assert_eq!(second.extended_state().get::<u32>("count").unwrap(), Some(1));
}

#[test]
fn unmet_state_is_reported() {
    let plan = StateMachineTestPlanBuilder::new()
        .state_machine_with_id(StateMachine::new(tree()), "m")
        .default_await_time(Duration::from_millis(20))
        .step()
        .expect_state(s("S2"))
        .and()
        .build()
        .unwrap();

    match plan.test() {
        Err(TestPlanError::Unmet { step, machine, expected, .. }) => {
            assert_eq!(step, 0);
            assert_eq!(machine, "m");
            assert_eq!(expected, "state S2 active");
        }
        other => panic!("expected unmet expectation, got {other:?}"),
    }
}

#[test]
fn overshot_count_fails() {
    let plan = StateMachineTestPlanBuilder::new()
        .state_machine_with_id(StateMachine::new(tree()), "m")
        .default_await_time(Duration::from_secs(5))
        .step()
        .expect_state_entered(1)
        .and()
        .build()
        .unwrap();

    assert_eq!(
        plan.test(),
        Err(TestPlanError::Unmet {
            step: 0,
            machine: "m".to_string(),
            expected: "1 state_entered".to_string(),
            actual: "2".to_string(),
        })
    );
}

#[test]
fn wrong_variable_value_is_reported() {
    let plan = StateMachineTestPlanBuilder::new()
        .state_machine_with_id(StateMachine::new(tree()), "m")
        .default_await_time(Duration::from_millis(20))
        .step()
        .send_event(s("E2"))
        .expect_variable_value("count", 7)
        .and()
        .build()
        .unwrap();

    assert_eq!(
        plan.test(),
        Err(TestPlanError::Unmet {
            step: 0,
            machine: "m".to_string(),
            expected: "variable count = 7".to_string(),
            actual: "1".to_string(),
        })
    );
}
