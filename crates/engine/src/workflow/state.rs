use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::status::{StepStatus, WorkflowStatus};

/// The resource a workflow instance is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub name: String,
    pub id: Uuid,
}

/// Value snapshot of one step instance. Updates return a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub step_key: String,
    pub stage_key: String,
    pub title: String,
    pub label: String,
    pub status: StepStatus,
    pub selector: Option<Uuid>,
    pub params: Value,
    /// Position in the owning workflow's `step_id_map`.
    pub seq: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepState {
    pub fn with_label(&self, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn with_status(&self, status: StepStatus) -> Self {
        Self {
            status,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn with_params(&self, params: Value) -> Self {
        Self {
            params,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: Uuid,
    pub role: String,
    pub added_at: DateTime<Utc>,
}

/// Value snapshot of a workflow instance, including every step it has spawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: Uuid,
    pub key: String,
    pub revision: u32,
    pub title: String,
    pub description: Option<String>,
    pub resource: ResourceRef,
    pub params: Map<String, Value>,
    pub memory: Map<String, Value>,
    /// Roles granted on this instance on top of the definition's roles.
    pub custom_roles: Vec<String>,
    /// Current workflow-level label; `None` until the workflow is started.
    pub label: Option<String>,
    pub status: WorkflowStatus,
    pub step_id_map: IndexMap<Uuid, StepState>,
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowState {
    pub fn new(
        key: impl Into<String>,
        revision: u32,
        title: impl Into<String>,
        resource: ResourceRef,
        params: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            revision,
            title: title.into(),
            description: None,
            resource,
            params,
            memory: Map::new(),
            custom_roles: Vec::new(),
            label: None,
            status: WorkflowStatus::New,
            step_id_map: IndexMap::new(),
            participants: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_status(&self, status: WorkflowStatus) -> Self {
        let now = Utc::now();
        Self {
            status,
            finished_at: if status.is_finished() { Some(now) } else { self.finished_at },
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn with_label(&self, label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn with_started(&self) -> Self {
        let now = Utc::now();
        Self {
            started_at: Some(now),
            updated_at: now,
            ..self.clone()
        }
    }

    /// Insert or replace a step snapshot.
    pub fn with_step(&self, step: StepState) -> Self {
        let mut next = self.clone();
        next.step_id_map.insert(step.id, step);
        next.updated_at = Utc::now();
        next
    }

    pub fn with_memory(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.memory.insert(key.into(), value);
        next.updated_at = Utc::now();
        next
    }

    pub fn with_info(&self, title: Option<String>, description: Option<String>) -> Self {
        Self {
            title: title.unwrap_or_else(|| self.title.clone()),
            description: description.or_else(|| self.description.clone()),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn with_participant(&self, participant: Participant) -> Self {
        let mut next = self.clone();
        next.participants.push(participant);
        next.updated_at = Utc::now();
        next
    }

    pub fn without_participant(&self, user_id: Uuid) -> Self {
        let mut next = self.clone();
        next.participants.retain(|p| p.user_id != user_id);
        next.updated_at = Utc::now();
        next
    }

    pub fn with_custom_roles(&self, roles: Vec<String>) -> Self {
        Self {
            custom_roles: roles,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn step(&self, id: Uuid) -> Option<&StepState> {
        self.step_id_map.get(&id)
    }

    pub fn steps_of<'a>(&'a self, step_key: &'a str) -> impl Iterator<Item = &'a StepState> + 'a {
        self.step_id_map.values().filter(move |s| s.step_key == step_key)
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> WorkflowState {
        WorkflowState::new(
            "sample",
            1,
            "Sample",
            ResourceRef {
                name: "test-resource".into(),
                id: Uuid::new_v4(),
            },
            Map::new(),
        )
    }

    #[test]
    fn set_returns_new_snapshot() {
        let state = sample_state().with_status(WorkflowStatus::Active);
        let updated = state.with_status(WorkflowStatus::Completed);

        assert_eq!(state.status, WorkflowStatus::Active);
        assert_eq!(updated.status, WorkflowStatus::Completed);
        assert!(state.finished_at.is_none());
        assert!(updated.finished_at.is_some());
    }

    #[test]
    fn step_updates_leave_original_untouched() {
        let state = sample_state();
        let now = Utc::now();
        let step = StepState {
            id: Uuid::new_v4(),
            workflow_id: state.id,
            step_key: "review".into(),
            stage_key: "intake".into(),
            title: "Review".into(),
            label: "CREATED".into(),
            status: StepStatus::Active,
            selector: None,
            params: Value::Null,
            seq: 0,
            created_at: now,
            updated_at: now,
        };

        let with_step = state.with_step(step.clone());
        assert!(state.step_id_map.is_empty());
        assert_eq!(with_step.step_id_map.len(), 1);

        let moved = step.with_label("DONE");
        assert_eq!(step.label, "CREATED");
        assert_eq!(moved.label, "DONE");
        assert_eq!(with_step.step(step.id).unwrap().label, "CREATED");
    }

    #[test]
    fn memory_is_copy_on_write() {
        let state = sample_state();
        let next = state.with_memory("seen", Value::Bool(true));
        assert!(state.memory.is_empty());
        assert_eq!(next.memory.get("seen"), Some(&Value::Bool(true)));
    }
}
