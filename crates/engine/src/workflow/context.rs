use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::workflow::{StepState, WorkflowState};

/// Application payload of an incoming event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub resource_name: String,
    pub resource_id: Uuid,
    /// Restricts step-scoped handlers to step instances carrying this selector.
    #[serde(default)]
    pub step_selector: Option<Uuid>,
    /// Restricts step-scoped handlers to this one step instance.
    #[serde(default)]
    pub target_step_id: Option<Uuid>,
    #[serde(default)]
    pub data: Value,
}

impl EventPayload {
    pub fn new(resource_name: impl Into<String>, resource_id: Uuid) -> Self {
        Self {
            resource_name: resource_name.into(),
            resource_id,
            step_selector: None,
            target_step_id: None,
            data: Value::Null,
        }
    }

    pub fn with_selector(mut self, selector: Uuid) -> Self {
        self.step_selector = Some(selector);
        self
    }

    pub fn with_target_step(mut self, step_id: Uuid) -> Self {
        self.target_step_id = Some(step_id);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Whether a step instance is addressed by this payload.
    pub fn addresses(&self, step: &StepState) -> bool {
        match (self.target_step_id, self.step_selector) {
            (Some(target), _) => step.id == target,
            (None, Some(selector)) => step.selector == Some(selector),
            (None, None) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(event_type: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// What a handler sees when it is invoked: the event plus snapshots of the
/// workflow (and the addressed step for step-scoped bindings).
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub event: Event,
    pub workflow: WorkflowState,
    pub step: Option<StepState>,
}

impl HandlerContext {
    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }

    pub fn data(&self) -> &Value {
        &self.event.payload.data
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.workflow.params.get(key)
    }

    pub fn memory(&self, key: &str) -> Option<&Value> {
        self.workflow.memory.get(key)
    }

    pub fn step_id(&self) -> Option<Uuid> {
        self.step.as_ref().map(|s| s.id)
    }
}
