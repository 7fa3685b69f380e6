//! Declarative workflow definitions.
//!
//! Definitions are assembled with [`WorkflowBuilder`] and [`StepBuilder`],
//! validated once in `build()` and frozen afterwards. A built
//! [`WorkflowDefinition`] is what the manager registers and instantiates.

mod builder;
pub mod naming;

pub use builder::{StepBuilder, WorkflowBuilder};
pub use crate::workflow::machine::{Transition, ALL_STATES};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{
    router::{Binding, BindingOwner, Handler},
    workflow::{Activity, StateMachine, StepState, WorkflowState},
    Error, Result,
};
use naming::kebab_case;

lazy_static! {
    static ref EVENT_NAME_RE: Regex =
        Regex::new(r"^[a-z0-9][a-z0-9_.:-]*$").expect("valid event name regex");
}

/// Labels a step machine gets when none are declared.
pub const DEFAULT_STEP_STATES: [&str; 4] = ["CREATED", "ACTIVE", "COMPLETED", "CANCELLED"];

/// Labels a workflow machine gets when none are declared. The first is the start label.
pub const DEFAULT_WORKFLOW_STATES: [&str; 4] = ["ACTIVE", "COMPLETED", "CANCELLED", "ABORTED"];

/// Seeding rule run by `Workflow::start()` in place of the stage-order default.
pub type StartHook = Arc<dyn Fn(&WorkflowState) -> Vec<Activity> + Send + Sync>;

pub(crate) fn validate_event_name(event: &str) -> Result<()> {
    if EVENT_NAME_RE.is_match(event) {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "Invalid event name '{}': expected lower-case name like 'step-done' or 'order.created'",
            event
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub key: String,
    pub title: String,
    pub description: Option<String>,
}

impl Role {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            key: kebab_case(&title),
            title,
            description: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    /// Sequencing hint; the lowest order holds the default seed steps.
    pub order: i32,
}

impl Stage {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            key: kebab_case(&title),
            title,
            description: None,
            order: 0,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

#[derive(Debug, Clone)]
pub struct EventBinding {
    pub event: String,
    pub handler: Handler,
}

#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub key: String,
    pub title: String,
    pub stage: String,
    /// Whether more than one instance may live in a workflow at once.
    pub multi: bool,
    /// Explicit opt in/out of the default seeding rule.
    pub seed: Option<bool>,
    pub description: Option<String>,
    pub machine: StateMachine<StepState>,
    pub bindings: Vec<EventBinding>,
}

#[derive(Clone)]
pub struct WorkflowDefinition {
    pub(crate) key: String,
    pub(crate) title: String,
    pub(crate) revision: u32,
    pub(crate) description: Option<String>,
    pub(crate) stages: IndexMap<String, Stage>,
    pub(crate) roles: IndexMap<String, Role>,
    pub(crate) steps: IndexMap<String, StepDefinition>,
    pub(crate) machine: StateMachine<WorkflowState>,
    pub(crate) bindings: Vec<EventBinding>,
    pub(crate) start_hook: Option<StartHook>,
}

impl WorkflowDefinition {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn machine(&self) -> &StateMachine<WorkflowState> {
        &self.machine
    }

    pub fn stage(&self, key: &str) -> Option<&Stage> {
        self.stages.get(key)
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.values()
    }

    pub fn role(&self, key: &str) -> Option<&Role> {
        self.roles.get(key)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn step(&self, key: &str) -> Option<&StepDefinition> {
        self.steps.get(key)
    }

    pub fn steps(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.values()
    }

    pub fn bindings(&self) -> &[EventBinding] {
        &self.bindings
    }

    pub fn start_hook(&self) -> Option<&StartHook> {
        self.start_hook.as_ref()
    }

    /// Steps instantiated by `start()` when there is no start hook: the steps
    /// marked `seed(true)`, or else every unmarked step of the lowest-order
    /// stage that holds any.
    pub fn seed_steps(&self) -> Vec<&StepDefinition> {
        let explicit: Vec<&StepDefinition> = self
            .steps
            .values()
            .filter(|s| s.seed == Some(true))
            .collect();
        if !explicit.is_empty() {
            return explicit;
        }

        let candidates: Vec<&StepDefinition> = self
            .steps
            .values()
            .filter(|s| s.seed != Some(false))
            .collect();
        let lowest = candidates
            .iter()
            .filter_map(|s| self.stages.get(&s.stage).map(|stage| stage.order))
            .min();

        match lowest {
            Some(order) => candidates
                .into_iter()
                .filter(|s| self.stages.get(&s.stage).map(|stage| stage.order) == Some(order))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Router bindings for this definition: workflow-scoped first, then each
    /// step's in declaration order.
    pub fn router_bindings(&self) -> Vec<Binding> {
        let workflow_bindings = self.bindings.iter().map(|b| Binding {
            event: b.event.clone(),
            owner: BindingOwner::Workflow {
                workflow_key: self.key.clone(),
            },
            handler: b.handler.clone(),
        });

        let step_bindings = self.steps.values().flat_map(|step| {
            step.bindings.iter().map(move |b| Binding {
                event: b.event.clone(),
                owner: BindingOwner::Step {
                    workflow_key: self.key.clone(),
                    step_key: step.key.clone(),
                },
                handler: b.handler.clone(),
            })
        });

        workflow_bindings.chain(step_bindings).collect()
    }
}

impl fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("key", &self.key)
            .field("title", &self.title)
            .field("revision", &self.revision)
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .field("roles", &self.roles.keys().collect::<Vec<_>>())
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("machine", &self.machine)
            .field("bindings", &self.bindings.len())
            .field("has_start_hook", &self.start_hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names() {
        assert!(validate_event_name("test-event").is_ok());
        assert!(validate_event_name("order.created:v2").is_ok());
        assert!(validate_event_name("").unwrap_err().is_configuration());
        assert!(validate_event_name("-leading").is_err());
        assert!(validate_event_name("Has Space").is_err());
    }

    #[test]
    fn role_and_stage_keys_follow_titles() {
        let role = Role::new("Administrator");
        assert_eq!(role.key, "administrator");
        assert_eq!(role.title, "Administrator");

        let stage = Stage::new("Final Stage").with_order(3);
        assert_eq!(stage.key, "final-stage");
        assert_eq!(stage.order, 3);
        assert_eq!(Stage::new("Init").order, 0);
    }
}
