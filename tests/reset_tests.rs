//! Snapshot restore and dispatch scenarios on a nested tree.

use chorus::builder::{StateTreeBuilder, TransitionBuilder};
use chorus::core::{ExtendedState, Guard, GuardFault};
use chorus::tree::StateTree;
use chorus::{
    event_enum, state_enum, DispatchOutcome, MachineError, StateMachine, StateMachineContext,
    StateMachineListener,
};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

state_enum! {
    enum St {
        S0,
        S1,
        S11,
        S12,
        S2,
        S21,
        S211,
        S212,
        S3,
        P,
        L1,
        L2,
        R1,
        R2,
    }
}

event_enum! {
    enum Ev {
        A,
        B,
        H,
        Reset,
    }
}

use Ev::*;
use St::*;

fn foo_is(ctx_foo: Result<Option<i32>, chorus::core::VariableError>, want: i32) -> bool {
    matches!(ctx_foo, Ok(Some(v)) if v == want)
}

/// S0{S1{S11, S12}, S2{S21{S211, S212}}}
fn builder() -> StateTreeBuilder<St, Ev> {
    StateTreeBuilder::new()
        .initial(S0)
        .child_initial(S0, S1)
        .child(S0, S2)
        .child_initial(S1, S11)
        .child(S1, S12)
        .child_initial(S2, S21)
        .child_initial(S21, S211)
        .child(S21, S212)
        .transition(
            TransitionBuilder::internal()
                .source(S0)
                .event(H)
                .when(|ctx| foo_is(ctx.extended_state.get::<i32>("foo"), 0))
                .run(|ctx| ctx.extended_state.put("foo", 1).map_err(Into::into)),
        )
        .transition(TransitionBuilder::external().source(S11).target(S12).event(A))
        .transition(TransitionBuilder::external().source(S1).target(S212).event(B))
}

fn tree() -> Arc<StateTree<St, Ev>> {
    Arc::new(builder().build().unwrap())
}

fn sorted(mut states: Vec<St>) -> Vec<St> {
    states.sort();
    states
}

fn snapshot_at(state: St, foo: i32) -> StateMachineContext<St, Ev> {
    let mut vars = ExtendedState::new();
    vars.put("foo", foo).unwrap();
    StateMachineContext::new(Some(state), vars)
}

#[derive(Default)]
struct Trace(Mutex<Vec<String>>);

impl Trace {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl StateMachineListener<St, Ev> for Trace {
    fn state_changed(&self, from: Option<&St>, to: &St) {
        self.0.lock().unwrap().push(format!("changed {from:?}->{to:?}"));
    }

    fn state_entered(&self, state: &St) {
        self.0.lock().unwrap().push(format!("entered {state:?}"));
    }

    fn state_exited(&self, state: &St) {
        self.0.lock().unwrap().push(format!("exited {state:?}"));
    }

    fn event_not_accepted(&self, event: &Ev, _headers: &chorus::MessageHeaders) {
        self.0.lock().unwrap().push(format!("rejected {event:?}"));
    }
}

#[test]
fn reset_to_nested_leaf_lands_exactly_there() {
    let machine = StateMachine::new(tree());
    machine.restore(&snapshot_at(S12, 1)).unwrap();
    machine.start().unwrap();

    assert_eq!(sorted(machine.state_ids()), vec![S0, S1, S12]);
    assert_eq!(machine.extended_state().get::<i32>("foo").unwrap(), Some(1));
}

#[test]
fn reset_to_deep_leaf_in_other_branch() {
    let machine = StateMachine::new(tree());
    machine.restore(&snapshot_at(S211, 1)).unwrap();
    machine.start().unwrap();

    assert_eq!(sorted(machine.state_ids()), vec![S0, S2, S21, S211]);
    assert_eq!(machine.active_leaves(), vec![S211]);
}

#[test]
fn reset_to_composite_descends_through_initials() {
    let machine = StateMachine::new(tree());
    machine.start().unwrap();
    machine.restore(&snapshot_at(S2, 1)).unwrap();

    assert_eq!(sorted(machine.state_ids()), vec![S0, S2, S21, S211]);
    assert_eq!(machine.extended_state().get::<i32>("foo").unwrap(), Some(1));
}

#[test]
fn restore_replaces_extended_state_wholesale() {
    let machine = StateMachine::new(tree());
    machine.start().unwrap();
    let mut vars = ExtendedState::new();
    vars.put("bar", "x").unwrap();
    machine
        .restore(&StateMachineContext::new(Some(S12), vars))
        .unwrap();

    let vars = machine.extended_state();
    assert!(!vars.contains_key("foo"));
    assert_eq!(vars.get::<String>("bar").unwrap(), Some("x".to_string()));
}

#[test]
fn internal_transition_runs_action_without_exit_or_entry() {
    let machine = StateMachine::new(tree());
    machine.restore(&snapshot_at(S11, 0)).unwrap();
    machine.start().unwrap();
    let trace = Arc::new(Trace::default());
    machine.add_listener(trace.clone());

    let outcome = machine.dispatch(H).unwrap();

    assert!(outcome.is_accepted());
    assert_eq!(machine.extended_state().get::<i32>("foo").unwrap(), Some(1));
    assert_eq!(sorted(machine.state_ids()), vec![S0, S1, S11]);
    assert!(trace.take().is_empty());

    // Guard now fails.
    assert_eq!(machine.dispatch(H).unwrap(), DispatchOutcome::Rejected);
    assert_eq!(trace.take(), vec!["rejected H".to_string()]);
}

#[test]
fn external_transition_into_other_branch() {
    let machine = StateMachine::new(tree());
    machine.start().unwrap();
    let trace = Arc::new(Trace::default());
    machine.add_listener(trace.clone());

    machine.dispatch(B).unwrap();

    assert_eq!(machine.active_leaves(), vec![S212]);
    assert_eq!(
        trace.take(),
        vec![
            "exited S11",
            "exited S1",
            "entered S2",
            "entered S21",
            "entered S212",
            "changed Some(S11)->S212",
        ]
    );
}

#[test]
fn first_defined_guard_wins() {
    let tree: Arc<StateTree<St, Ev>> = StateTreeBuilder::new()
        .initial(S1)
        .state(S2)
        .state(S3)
        .transition(
            TransitionBuilder::external()
                .source(S1)
                .target(S2)
                .event(A)
                .when(|_| true),
        )
        .transition(
            TransitionBuilder::external()
                .source(S1)
                .target(S3)
                .event(A)
                .when(|_| true),
        )
        .build()
        .unwrap()
        .into();

    for _ in 0..10 {
        let machine = StateMachine::new(Arc::clone(&tree));
        machine.start().unwrap();
        machine.dispatch(A).unwrap();
        assert_eq!(machine.active_leaves(), vec![S2]);
    }
}

#[test]
fn listeners_are_notified_newest_first() {
    struct Named(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl StateMachineListener<St, Ev> for Named {
        fn state_changed(&self, _from: Option<&St>, _to: &St) {
            self.1.lock().unwrap().push(self.0);
        }
    }

    let order = Arc::new(Mutex::new(Vec::new()));
    let machine = StateMachine::new(tree());
    machine.start().unwrap();
    for name in ["O1", "O2", "O3"] {
        machine.add_listener(Arc::new(Named(name, order.clone())));
    }

    machine.dispatch(A).unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["O3", "O2", "O1"]);
}

#[test]
fn restoring_twice_is_silent_and_stable() {
    let machine = StateMachine::new(tree());
    machine.start().unwrap();
    let trace = Arc::new(Trace::default());
    machine.add_listener(trace.clone());
    let target = snapshot_at(S212, 3);

    machine.restore(&target).unwrap();
    let first = sorted(machine.state_ids());
    machine.restore(&target).unwrap();

    assert_eq!(sorted(machine.state_ids()), first);
    assert_eq!(machine.extended_state(), target.extended_state);
    assert!(trace.take().is_empty());
}

#[test]
fn restore_from_inside_an_action_is_illegal() {
    let slot: Arc<Mutex<Option<StateMachine<St, Ev>>>> = Arc::new(Mutex::new(None));
    let seen: Arc<Mutex<Option<Result<(), MachineError>>>> = Arc::new(Mutex::new(None));

    let tree = {
        let slot = slot.clone();
        let seen = seen.clone();
        builder()
            .transition(
                TransitionBuilder::internal()
                    .source(S0)
                    .event(Reset)
                    .run(move |_| {
                        if let Some(machine) = slot.lock().unwrap().as_ref() {
                            let result = machine.restore(&snapshot_at(S12, 1)).map(|_| ());
                            *seen.lock().unwrap() = Some(result);
                        }
                        Ok(())
                    }),
            )
            .build()
            .unwrap()
    };

    let machine = StateMachine::new(tree);
    machine.start().unwrap();
    *slot.lock().unwrap() = Some(machine.clone());

    machine.dispatch(Reset).unwrap();

    assert!(matches!(
        seen.lock().unwrap().take(),
        Some(Err(MachineError::IllegalOperation(_)))
    ));
    assert_eq!(machine.active_leaves(), vec![S11]);

    // Break the machine -> tree -> action -> machine cycle.
    slot.lock().unwrap().take();
}

#[test]
fn queries_from_inside_an_action_see_the_committed_state() {
    type Seen = (bool, Vec<St>, u64, Option<i32>);
    let slot: Arc<Mutex<Option<StateMachine<St, Ev>>>> = Arc::new(Mutex::new(None));
    let seen: Arc<Mutex<Option<Seen>>> = Arc::new(Mutex::new(None));

    let tree = {
        let slot = slot.clone();
        let seen = seen.clone();
        builder()
            .transition(
                TransitionBuilder::external()
                    .source(S11)
                    .target(S12)
                    .event(Reset)
                    .run(move |ctx| {
                        ctx.extended_state.put("foo", 7)?;
                        if let Some(machine) = slot.lock().unwrap().as_ref() {
                            *seen.lock().unwrap() = Some((
                                machine.is_active(&S11),
                                machine.active_leaves(),
                                machine.version(),
                                machine.extended_state().get::<i32>("foo").unwrap(),
                            ));
                        }
                        Ok(())
                    }),
            )
            .build()
            .unwrap()
    };

    let machine = StateMachine::new(tree);
    machine.start().unwrap();
    *slot.lock().unwrap() = Some(machine.clone());

    assert!(machine.dispatch(Reset).unwrap().is_accepted());

    assert_eq!(seen.lock().unwrap().take(), Some((true, vec![S11], 0, None)));
    assert_eq!(machine.active_leaves(), vec![S12]);
    assert_eq!(machine.version(), 1);
    assert_eq!(machine.extended_state().get::<i32>("foo").unwrap(), Some(7));

    // The instance is still usable afterwards.
    machine.dispatch(B).unwrap();
    assert_eq!(machine.active_leaves(), vec![S212]);

    slot.lock().unwrap().take();
}

#[derive(Default)]
struct Errors(Mutex<Vec<MachineError>>);

impl StateMachineListener<St, Ev> for Errors {
    fn state_machine_error(&self, _machine: Uuid, error: &MachineError) {
        self.0.lock().unwrap().push(error.clone());
    }
}

#[test]
fn faulted_guard_counts_as_false_and_is_reported() {
    let tree = StateTreeBuilder::<St, Ev>::new()
        .initial(S1)
        .state(S2)
        .state(S3)
        .transition(
            TransitionBuilder::external()
                .source(S1)
                .target(S2)
                .event(A)
                .guard(Guard::fallible(|_| Err(GuardFault::new("sensor offline")))),
        )
        .transition(TransitionBuilder::external().source(S1).target(S3).event(A))
        .build()
        .unwrap();
    let machine = StateMachine::new(tree);
    machine.start().unwrap();
    let errors = Arc::new(Errors::default());
    machine.add_listener(errors.clone());

    let outcome = machine.dispatch(A).unwrap();

    assert!(outcome.is_accepted());
    assert_eq!(machine.active_leaves(), vec![S3]);
    assert_eq!(
        *errors.0.lock().unwrap(),
        vec![MachineError::GuardFault {
            state: "S1".to_string(),
            event: "A".to_string(),
            fault: GuardFault::new("sensor offline"),
        }]
    );
}

#[test]
fn guards_in_other_regions_see_values_from_before_the_event() {
    // P has two regions, {L1, L2} and {R1, R2}, both moving on A. Each side
    // writes a variable the other side's guard requires to be absent.
    let tree = StateTreeBuilder::<St, Ev>::new()
        .initial(P)
        .region_initial(P, 0, L1)
        .region_child(P, 0, L2)
        .region_initial(P, 1, R1)
        .region_child(P, 1, R2)
        .transition(
            TransitionBuilder::external()
                .source(L1)
                .target(L2)
                .event(A)
                .when(|ctx| !ctx.extended_state.contains_key("right"))
                .run(|ctx| ctx.extended_state.put("left", 1).map_err(Into::into)),
        )
        .transition(
            TransitionBuilder::external()
                .source(R1)
                .target(R2)
                .event(A)
                .when(|ctx| !ctx.extended_state.contains_key("left"))
                .run(|ctx| ctx.extended_state.put("right", 1).map_err(Into::into)),
        )
        .build()
        .unwrap();
    let machine = StateMachine::new(tree);
    machine.start().unwrap();

    let outcome = machine.dispatch(A).unwrap();

    assert_eq!(outcome.fired().len(), 2);
    assert_eq!(sorted(machine.active_leaves()), vec![L2, R2]);
    let vars = machine.extended_state();
    assert!(vars.contains_key("left"));
    assert!(vars.contains_key("right"));
}

#[test]
fn unknown_state_in_snapshot_is_rejected() {
    let tree = StateTreeBuilder::<St, Ev>::new()
        .initial(S1)
        .build()
        .unwrap();
    let machine = StateMachine::new(tree);
    machine.start().unwrap();

    assert_eq!(
        machine.restore(&snapshot_at(S3, 0)),
        Err(MachineError::UnknownState("S3".to_string()))
    );
    assert_eq!(machine.active_leaves(), vec![S1]);
}
