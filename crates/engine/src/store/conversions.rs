//! Conversions between in-memory snapshots and store records.

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::{
    store::{
        AggregateRecord, ParticipantRecord, StepChanges, StepRecord, WorkflowChanges,
        WorkflowRecord,
    },
    workflow::{Participant, ResourceRef, StepState, WorkflowState},
    Error, Result,
};

fn json_object(value: JsonValue, column: &str, id: Uuid) -> Result<Map<String, JsonValue>> {
    match value {
        JsonValue::Object(map) => Ok(map),
        JsonValue::Null => Ok(Map::new()),
        other => Err(Error::Store(format!(
            "Workflow {} has non-object {}: {}",
            id, column, other
        ))),
    }
}

impl From<&WorkflowState> for WorkflowRecord {
    fn from(state: &WorkflowState) -> Self {
        Self {
            id: state.id,
            workflow_key: state.key.clone(),
            revision: state.revision,
            title: state.title.clone(),
            description: state.description.clone(),
            resource_name: state.resource.name.clone(),
            resource_id: state.resource.id,
            params: JsonValue::Object(state.params.clone()),
            memory: JsonValue::Object(state.memory.clone()),
            custom_roles: state.custom_roles.clone(),
            label: state.label.clone(),
            status: state.status,
            created_at: state.created_at,
            updated_at: state.updated_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }
}

impl From<&WorkflowState> for WorkflowChanges {
    fn from(state: &WorkflowState) -> Self {
        Self {
            title: state.title.clone(),
            description: state.description.clone(),
            memory: JsonValue::Object(state.memory.clone()),
            custom_roles: state.custom_roles.clone(),
            label: state.label.clone(),
            status: state.status,
            updated_at: state.updated_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }
}

impl From<&StepState> for StepRecord {
    fn from(step: &StepState) -> Self {
        Self {
            id: step.id,
            workflow_id: step.workflow_id,
            step_key: step.step_key.clone(),
            stage_key: step.stage_key.clone(),
            title: step.title.clone(),
            label: step.label.clone(),
            status: step.status,
            selector: step.selector,
            params: step.params.clone(),
            seq: step.seq,
            created_at: step.created_at,
            updated_at: step.updated_at,
        }
    }
}

impl From<StepRecord> for StepState {
    fn from(record: StepRecord) -> Self {
        Self {
            id: record.id,
            workflow_id: record.workflow_id,
            step_key: record.step_key,
            stage_key: record.stage_key,
            title: record.title,
            label: record.label,
            status: record.status,
            selector: record.selector,
            params: record.params,
            seq: record.seq,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl From<&StepState> for StepChanges {
    fn from(step: &StepState) -> Self {
        Self {
            label: step.label.clone(),
            status: step.status,
            params: step.params.clone(),
            updated_at: step.updated_at,
        }
    }
}

impl ParticipantRecord {
    pub fn from_participant(workflow_id: Uuid, participant: &Participant) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            user_id: participant.user_id,
            role: participant.role.clone(),
            created_at: participant.added_at,
        }
    }
}

impl From<ParticipantRecord> for Participant {
    fn from(record: ParticipantRecord) -> Self {
        Self {
            user_id: record.user_id,
            role: record.role,
            added_at: record.created_at,
        }
    }
}

impl TryFrom<AggregateRecord> for WorkflowState {
    type Error = Error;

    fn try_from(aggregate: AggregateRecord) -> Result<Self> {
        let record = aggregate.workflow;

        let mut steps = aggregate.steps;
        steps.sort_by_key(|s| s.seq);
        let step_id_map: IndexMap<Uuid, StepState> = steps
            .into_iter()
            .map(|s| (s.id, StepState::from(s)))
            .collect();

        Ok(Self {
            id: record.id,
            key: record.workflow_key,
            revision: record.revision,
            title: record.title,
            description: record.description,
            resource: ResourceRef {
                name: record.resource_name,
                id: record.resource_id,
            },
            params: json_object(record.params, "params", record.id)?,
            memory: json_object(record.memory, "memory", record.id)?,
            custom_roles: record.custom_roles,
            label: record.label,
            status: record.status,
            step_id_map,
            participants: aggregate
                .participants
                .into_iter()
                .map(Participant::from)
                .collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
        })
    }
}
