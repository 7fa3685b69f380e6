use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::status::{StepStatus, WorkflowStatus};

// Workflow instance row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub workflow_key: String,
    pub revision: u32,
    pub title: String,
    pub description: Option<String>,
    pub resource_name: String,
    pub resource_id: Uuid,
    pub params: JsonValue,
    pub memory: JsonValue,
    pub custom_roles: Vec<String>,
    pub label: Option<String>,
    pub status: WorkflowStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

// Step instance row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub step_key: String,
    pub stage_key: String,
    pub title: String,
    pub label: String,
    pub status: StepStatus,
    pub selector: Option<Uuid>,
    pub params: JsonValue,
    pub seq: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

// Scheduled trigger; recorded here, fired by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub trigger_type: String,
    pub payload: JsonValue,
    pub target_id: Option<Uuid>,
    pub delay_seconds: i64,
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to rebuild one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub workflow: WorkflowRecord,
    pub steps: Vec<StepRecord>,
    pub participants: Vec<ParticipantRecord>,
}

// Current values of the mutable workflow columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowChanges {
    pub title: String,
    pub description: Option<String>,
    pub memory: JsonValue,
    pub custom_roles: Vec<String>,
    pub label: Option<String>,
    pub status: WorkflowStatus,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

// Current values of the mutable step columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepChanges {
    pub label: String,
    pub status: StepStatus,
    pub params: JsonValue,
    pub updated_at: DateTime<Utc>,
}

/// One staged write. A batch of mutations is applied atomically by [`crate::store::Store::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    CreateWorkflow(WorkflowRecord),
    UpdateWorkflow { id: Uuid, changes: WorkflowChanges },
    CreateStep(StepRecord),
    UpdateStep { id: Uuid, changes: StepChanges },
    AddParticipant(ParticipantRecord),
    RemoveParticipant { workflow_id: Uuid, user_id: Uuid },
    CreateTrigger(TriggerRecord),
}

impl Mutation {
    /// The workflow instance this write belongs to, when it is known from the record alone.
    pub fn workflow_id(&self) -> Option<Uuid> {
        match self {
            Mutation::CreateWorkflow(record) => Some(record.id),
            Mutation::UpdateWorkflow { id, .. } => Some(*id),
            Mutation::CreateStep(record) => Some(record.workflow_id),
            Mutation::UpdateStep { .. } => None,
            Mutation::AddParticipant(record) => Some(record.workflow_id),
            Mutation::RemoveParticipant { workflow_id, .. } => Some(*workflow_id),
            Mutation::CreateTrigger(record) => Some(record.workflow_id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::CreateWorkflow(_) => "create_workflow",
            Mutation::UpdateWorkflow { .. } => "update_workflow",
            Mutation::CreateStep(_) => "create_step",
            Mutation::UpdateStep { .. } => "update_step",
            Mutation::AddParticipant(_) => "add_participant",
            Mutation::RemoveParticipant { .. } => "remove_participant",
            Mutation::CreateTrigger(_) => "create_trigger",
        }
    }
}
