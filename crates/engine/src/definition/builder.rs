use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

use super::{
    naming::kebab_case, validate_event_name, EventBinding, Role, Stage, StartHook, StepDefinition,
    WorkflowDefinition, DEFAULT_STEP_STATES, DEFAULT_WORKFLOW_STATES,
};
use crate::{
    router::Handler,
    status::WorkflowStatus,
    workflow::{Activity, StateMachine, StepState, Transition, WorkflowState},
    Error, Result,
};

fn labels_of<I, L>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = L>,
    L: Into<String>,
{
    labels.into_iter().map(Into::into).collect()
}

/// Prefix a configuration error with the declaration it came from.
fn in_declaration(what: &str, err: Error) -> Error {
    match err {
        Error::Configuration(msg) => Error::Configuration(format!("{}: {}", what, msg)),
        other => other,
    }
}

pub struct StepBuilder {
    title: String,
    key: Option<String>,
    stage: String,
    multi: bool,
    seed: Option<bool>,
    description: Option<String>,
    states: Option<Vec<String>>,
    start: Option<String>,
    transitions: Vec<Transition<StepState>>,
    bindings: Vec<EventBinding>,
}

impl StepBuilder {
    pub fn new(title: impl Into<String>, stage: &Stage) -> Self {
        Self {
            title: title.into(),
            key: None,
            stage: stage.key.clone(),
            multi: false,
            seed: None,
            description: None,
            states: None,
            start: None,
            transitions: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// Explicit key, used verbatim instead of the kebab-cased title.
    pub fn name(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    pub fn seed(mut self, seed: bool) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn states<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.states = Some(labels_of(labels));
        self
    }

    pub fn start(mut self, label: impl Into<String>) -> Self {
        self.start = Some(label.into());
        self
    }

    pub fn transition(mut self, transition: Transition<StepState>) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Bind a handler to `event`, scoped to instances of this step.
    pub fn connect(mut self, event: impl Into<String>, handler: Handler) -> Self {
        self.bindings.push(EventBinding {
            event: event.into(),
            handler,
        });
        self
    }

    pub fn build(self) -> Result<StepDefinition> {
        let key = self.key.unwrap_or_else(|| kebab_case(&self.title));
        if key.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "Step '{}' has an empty key",
                self.title
            )));
        }
        let context = format!("Step '{}'", key);

        for binding in &self.bindings {
            validate_event_name(&binding.event).map_err(|e| in_declaration(&context, e))?;
        }

        let states = self.states.unwrap_or_else(|| labels_of(DEFAULT_STEP_STATES));
        let machine = StateMachine::new(states, self.start, self.transitions)
            .map_err(|e| in_declaration(&context, e))?;

        debug!(
            "Built step '{}' with {} states and {} transitions",
            key,
            machine.states().len(),
            machine.transition_count()
        );

        Ok(StepDefinition {
            key,
            title: self.title,
            stage: self.stage,
            multi: self.multi,
            seed: self.seed,
            description: self.description,
            machine,
            bindings: self.bindings,
        })
    }
}

pub struct WorkflowBuilder {
    title: String,
    key: Option<String>,
    revision: u32,
    description: Option<String>,
    stages: IndexMap<String, Stage>,
    roles: IndexMap<String, Role>,
    steps: IndexMap<String, StepDefinition>,
    states: Option<Vec<String>>,
    start: Option<String>,
    transitions: IndexMap<String, Transition<WorkflowState>>,
    bindings: Vec<EventBinding>,
    start_hook: Option<StartHook>,
    errors: Vec<Error>,
}

impl WorkflowBuilder {
    pub fn new(title: impl Into<String>, revision: u32) -> Self {
        Self {
            title: title.into(),
            key: None,
            revision,
            description: None,
            stages: IndexMap::new(),
            roles: IndexMap::new(),
            steps: IndexMap::new(),
            states: None,
            start: None,
            transitions: IndexMap::new(),
            bindings: Vec::new(),
            start_hook: None,
            errors: Vec::new(),
        }
    }

    /// Inherit everything declared on `base` except its title and key.
    /// Later declarations on this builder add to or override what was inherited.
    pub fn extend(mut self, base: &WorkflowDefinition) -> Self {
        self.stages.extend(base.stages.clone());
        self.roles.extend(base.roles.clone());
        self.steps.extend(base.steps.clone());
        self.states = Some(base.machine.states().to_vec());
        self.start = Some(base.machine.start().to_string());
        for transition in base.machine.transitions() {
            self.transitions
                .insert(transition.name().to_string(), transition.clone());
        }
        self.bindings.extend(base.bindings.iter().cloned());
        if base.start_hook.is_some() {
            self.start_hook = base.start_hook.clone();
        }
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.insert(stage.key.clone(), stage);
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.roles.insert(role.key.clone(), role);
        self
    }

    /// Add a step. A step with an existing key replaces the earlier one.
    /// Step validation errors are reported by [`WorkflowBuilder::build`].
    pub fn step(mut self, step: StepBuilder) -> Self {
        match step.build() {
            Ok(step) => {
                self.steps.insert(step.key.clone(), step);
            }
            Err(e) => self.errors.push(e),
        }
        self
    }

    pub fn states<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.states = Some(labels_of(labels));
        self
    }

    pub fn start(mut self, label: impl Into<String>) -> Self {
        self.start = Some(label.into());
        self
    }

    pub fn transition(mut self, transition: Transition<WorkflowState>) -> Self {
        self.transitions
            .insert(transition.name().to_string(), transition);
        self
    }

    /// Bind a handler to `event`, scoped to the workflow itself.
    pub fn connect(mut self, event: impl Into<String>, handler: Handler) -> Self {
        self.bindings.push(EventBinding {
            event: event.into(),
            handler,
        });
        self
    }

    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&WorkflowState) -> Vec<Activity> + Send + Sync + 'static,
    {
        self.start_hook = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<WorkflowDefinition> {
        let key = self.key.unwrap_or_else(|| kebab_case(&self.title));
        if key.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "Workflow '{}' has an empty key",
                self.title
            )));
        }
        let context = format!("Workflow '{}'", key);

        if let Some(err) = self.errors.into_iter().next() {
            return Err(in_declaration(&context, err));
        }

        for step in self.steps.values() {
            if !self.stages.contains_key(&step.stage) {
                return Err(Error::Configuration(format!(
                    "{}: step '{}' references undeclared stage '{}'",
                    context, step.key, step.stage
                )));
            }
        }

        for binding in &self.bindings {
            validate_event_name(&binding.event).map_err(|e| in_declaration(&context, e))?;
        }

        let mut states = self
            .states
            .unwrap_or_else(|| labels_of(DEFAULT_WORKFLOW_STATES));
        for required in ["CANCELLED", "ABORTED"] {
            if !states.iter().any(|s| s == required) {
                states.push(required.to_string());
            }
        }

        let mut transitions = self.transitions;
        if !transitions.contains_key("cancel") {
            transitions.insert(
                "cancel".to_string(),
                Transition::new("cancel", "CANCELLED"),
            );
        }
        if !transitions.contains_key("abort") {
            transitions.insert("abort".to_string(), Transition::new("abort", "ABORTED"));
        }
        if states.iter().any(|s| s == "COMPLETED") && !transitions.contains_key("complete") {
            transitions.insert(
                "complete".to_string(),
                Transition::new("complete", "COMPLETED"),
            );
        }

        let machine = StateMachine::new(states, self.start, transitions.into_values())
            .map_err(|e| in_declaration(&context, e))?;

        if WorkflowStatus::terminal_for_label(machine.start()).is_some() {
            return Err(Error::Configuration(format!(
                "{}: start state '{}' is a finished label",
                context,
                machine.start()
            )));
        }

        debug!(
            "Built workflow '{}' rev {} with {} stages, {} steps, {} bindings",
            key,
            self.revision,
            self.stages.len(),
            self.steps.len(),
            self.bindings.len()
        );

        Ok(WorkflowDefinition {
            key,
            title: self.title,
            revision: self.revision,
            description: self.description,
            stages: self.stages,
            roles: self.roles,
            steps: self.steps,
            machine,
            bindings: self.bindings,
            start_hook: self.start_hook,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handler() -> Handler {
        Handler::from_fn(|_| vec![Activity::message("seen")])
    }

    #[test]
    fn step_defaults() {
        let stage = Stage::new("Intake");
        let step = StepBuilder::new("Intake Review", &stage).build().unwrap();

        assert_eq!(step.key, "intake-review");
        assert_eq!(step.stage, "intake");
        assert!(!step.multi);
        assert_eq!(step.machine.states(), &["CREATED", "ACTIVE", "COMPLETED", "CANCELLED"]);
        assert_eq!(step.machine.start(), "CREATED");
    }

    #[test]
    fn explicit_step_name_is_kept_verbatim() {
        let stage = Stage::new("Intake");
        let step = StepBuilder::new("Intake Review", &stage)
            .name("review_v2")
            .build()
            .unwrap();
        assert_eq!(step.key, "review_v2");
    }

    #[test]
    fn step_transitions_are_checked() {
        let stage = Stage::new("Main");
        let step = StepBuilder::new("State Step", &stage)
            .states(["CREATED", "PROCESSING", "COMPLETED", "FAILED"])
            .start("CREATED")
            .transition(
                Transition::new("start_processing", "PROCESSING")
                    .from_states(["CREATED"])
                    .with_handler(|_: &StepState| json!({"message": "started"})),
            )
            .build()
            .unwrap();
        assert_eq!(step.machine.transition_count(), 1);

        let err = StepBuilder::new("Broken", &stage)
            .states(["CREATED", "created"])
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Step 'broken'"));
    }

    #[test]
    fn workflow_gets_administrative_transitions() {
        let definition = WorkflowBuilder::new("Sample Flow", 1).build().unwrap();
        let machine = definition.machine();

        assert_eq!(definition.key(), "sample-flow");
        assert_eq!(machine.start(), "ACTIVE");
        assert!(machine.transition("cancel").unwrap().is_wildcard());
        assert!(machine.transition("abort").unwrap().is_wildcard());
        assert_eq!(machine.transition("complete").unwrap().target(), "COMPLETED");
    }

    #[test]
    fn custom_workflow_labels_gain_cancel_and_abort() {
        let definition = WorkflowBuilder::new("Custom", 1)
            .states(["DRAFT", "REVIEW"])
            .transition(Transition::new("submit", "REVIEW").from_states(["DRAFT"]))
            .build()
            .unwrap();
        let machine = definition.machine();

        assert_eq!(machine.states(), &["DRAFT", "REVIEW", "CANCELLED", "ABORTED"]);
        assert!(machine.transition("complete").is_none());
        assert_eq!(machine.transition_count(), 3);
    }

    #[test]
    fn finished_start_label_is_rejected() {
        let err = WorkflowBuilder::new("Odd", 1)
            .states(["COMPLETED", "ACTIVE"])
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn undeclared_stage_is_rejected() {
        let declared = Stage::new("Declared");
        let missing = Stage::new("Missing");
        let err = WorkflowBuilder::new("Broken", 1)
            .stage(declared)
            .step(StepBuilder::new("Orphan", &missing))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn step_errors_surface_on_build() {
        let stage = Stage::new("Main");
        let err = WorkflowBuilder::new("Broken", 1)
            .stage(stage.clone())
            .step(StepBuilder::new("Jumpy", &stage).transition(Transition::new("jump", "NONEXISTENT")))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("NONEXISTENT"));
    }

    #[test]
    fn malformed_event_binding_is_rejected() {
        let stage = Stage::new("Main");
        let err = WorkflowBuilder::new("Broken", 1)
            .stage(stage.clone())
            .step(StepBuilder::new("Listener", &stage).connect("", handler()))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());

        let err = WorkflowBuilder::new("Broken", 1)
            .connect("Not An Event", handler())
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn later_declarations_override() {
        let stage = Stage::new("Main");
        let definition = WorkflowBuilder::new("Override", 1)
            .stage(stage.clone())
            .role(Role::new("Reviewer"))
            .role(Role::new("Reviewer").with_description("second"))
            .step(StepBuilder::new("Task", &stage))
            .step(StepBuilder::new("Task", &stage).multi(true))
            .build()
            .unwrap();

        assert_eq!(definition.roles().count(), 1);
        assert_eq!(definition.role("reviewer").unwrap().description.as_deref(), Some("second"));
        assert_eq!(definition.steps().count(), 1);
        assert!(definition.step("task").unwrap().multi);
    }

    #[test]
    fn extend_inherits_base_components() {
        let base_stage = Stage::new("Base Stage");
        let base = WorkflowBuilder::new("Base Workflow", 1)
            .stage(base_stage.clone())
            .role(Role::new("Administrator"))
            .step(StepBuilder::new("Base Step", &base_stage).connect("base-event", handler()))
            .connect("workflow-start", handler())
            .build()
            .unwrap();

        let extended_stage = Stage::new("Extended Stage").with_order(1);
        let extended = WorkflowBuilder::new("Extended Workflow", 1)
            .extend(&base)
            .stage(extended_stage.clone())
            .step(StepBuilder::new("Extended Step", &extended_stage))
            .build()
            .unwrap();

        assert_eq!(extended.key(), "extended-workflow");
        assert!(extended.step("base-step").is_some());
        assert!(extended.step("extended-step").is_some());
        assert!(extended.role("administrator").is_some());
        assert_eq!(extended.stages().count(), 2);

        let owners: Vec<_> = extended
            .router_bindings()
            .into_iter()
            .map(|b| b.owner.workflow_key().to_string())
            .collect();
        assert_eq!(owners, vec!["extended-workflow", "extended-workflow"]);
    }

    #[test]
    fn seed_steps_follow_stage_order() {
        let first = Stage::new("First").with_order(1);
        let second = Stage::new("Second").with_order(2);
        let definition = WorkflowBuilder::new("Seeded", 1)
            .stage(second.clone())
            .stage(first.clone())
            .step(StepBuilder::new("Later", &second))
            .step(StepBuilder::new("Early A", &first))
            .step(StepBuilder::new("Early B", &first))
            .build()
            .unwrap();

        let keys: Vec<_> = definition.seed_steps().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["early-a", "early-b"]);

        let explicit = WorkflowBuilder::new("Explicit", 1)
            .stage(first.clone())
            .stage(second.clone())
            .step(StepBuilder::new("Early", &first))
            .step(StepBuilder::new("Chosen", &second).seed(true))
            .build()
            .unwrap();
        let keys: Vec<_> = explicit.seed_steps().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["chosen"]);
    }
}
