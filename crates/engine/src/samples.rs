//! Built-in sample definition used by the CLI demo and the test suites.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    definition::{Role, Stage, StepBuilder, Transition, WorkflowBuilder, WorkflowDefinition},
    router::Handler,
    workflow::Activity,
    Result,
};

pub const SAMPLE_PROCESS: &str = "sample-process";

/// Two-stage process: an intake review step that spawns tasks on every
/// `test-event`, and a multi-instance task step.
///
/// `start()` seeds the intake review with the selector found in the
/// `step-selector` param, so events carrying that selector reach it.
pub fn sample_process() -> Result<WorkflowDefinition> {
    let intake = Stage::new("Intake").with_order(1);
    let processing = Stage::new("Processing").with_order(2);

    let review = StepBuilder::new("Intake Review", &intake)
        .description("Reviews the incoming resource and spawns tasks")
        .states(["CREATED", "REVIEWING", "COMPLETED", "CANCELLED"])
        .transition(Transition::new("begin-review", "REVIEWING").from_states(["CREATED"]))
        .transition(Transition::new("finish", "COMPLETED").from_states(["REVIEWING"]))
        .connect(
            "test-event",
            Handler::from_fn(|ctx| {
                let seen = ctx
                    .memory("events-seen")
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                vec![
                    Activity::add_step("task"),
                    Activity::add_step("task"),
                    Activity::memorize("events-seen", json!(seen + 1)),
                ]
            }),
        )
        .connect(
            "review-done",
            Handler::from_fn(|_| {
                vec![
                    Activity::transition_step("begin-review"),
                    Activity::transition_step("finish"),
                ]
            }),
        );

    let task = StepBuilder::new("Task", &processing)
        .multi(true)
        .states(["CREATED", "IN_PROGRESS", "COMPLETED", "CANCELLED"])
        .transition(Transition::new("pick-up", "IN_PROGRESS").from_states(["CREATED"]))
        .transition(Transition::new("done", "COMPLETED").from_states(["IN_PROGRESS"]));

    WorkflowBuilder::new("Sample Process", 1)
        .description("Sample intake and processing workflow")
        .stage(intake)
        .stage(processing)
        .role(Role::new("Coordinator"))
        .role(Role::new("Reviewer"))
        .step(review)
        .step(task)
        .connect(
            "close-process",
            Handler::from_fn(|_| vec![Activity::transition_workflow("complete")]),
        )
        .on_start(|state| {
            let selector = state
                .param("step-selector")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok());
            vec![Activity::add_selected_step("intake-review", selector, Value::Null)]
        })
        .build()
}
