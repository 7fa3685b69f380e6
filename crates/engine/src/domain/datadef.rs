use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{workflow::Activity, Error, Result};

fn default_resource_name() -> String {
    "route".to_string()
}

/// Payload of `create-workflow`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreateWorkflowData {
    /// Title of the new instance
    pub title: String,

    /// Key of a registered workflow definition
    pub workflow_key: String,

    /// Id of the resource the workflow runs for
    pub route_id: Uuid,

    /// Name of the resource kind the workflow runs for
    #[serde(default = "default_resource_name")]
    pub resource_name: String,

    /// Instance parameters, a JSON object
    #[serde(default)]
    pub params: Value,
}

impl CreateWorkflowData {
    pub fn new(title: impl Into<String>, workflow_key: impl Into<String>, route_id: Uuid) -> Self {
        Self {
            title: title.into(),
            workflow_key: workflow_key.into(),
            route_id,
            resource_name: default_resource_name(),
            params: Value::Null,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Execution("Workflow title must not be empty".into()));
        }
        if self.workflow_key.trim().is_empty() {
            return Err(Error::Execution("Workflow key must not be empty".into()));
        }
        if !matches!(self.params, Value::Object(_) | Value::Null) {
            return Err(Error::Execution("Workflow params must be a JSON object".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UpdateWorkflowData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AddParticipantData {
    pub user_id: Uuid,
    /// Role key declared on the definition or granted on the instance
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RemoveParticipantData {
    pub user_id: Uuid,
}

/// Apply a single activity directly, bypassing the event router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessActivityData {
    pub activity: Activity,

    /// Step a step transition without its own `step_id` applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RoleData {
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepRefData {
    pub step_id: Uuid,
}

/// Payload of `inject-event`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InjectEventData {
    pub event_type: String,

    /// Opaque data handed to handlers
    #[serde(default)]
    pub event_data: Value,

    /// Only this step instance receives step-scoped handlers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_step_id: Option<Uuid>,

    /// Only step instances with this selector receive step-scoped handlers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_selector: Option<Uuid>,

    /// Informational; events are handled in arrival order
    #[serde(default)]
    pub priority: i32,
}

impl InjectEventData {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            event_data: Value::Null,
            target_step_id: None,
            step_selector: None,
            priority: 0,
        }
    }
}

/// Payload of `send-trigger`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SendTriggerData {
    pub trigger_type: String,

    #[serde(default)]
    pub trigger_data: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<Uuid>,

    /// Seconds from now until the trigger is due
    #[serde(default)]
    pub delay_seconds: i64,
}
