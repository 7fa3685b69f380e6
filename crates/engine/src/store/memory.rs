//! In-memory storage backend.
//!
//! Used by tests, the demo command and anywhere persistence is not wanted.
//! Batches are applied to a copy of the tables which replaces the live
//! tables only once every mutation succeeded.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

use crate::{
    store::{
        AggregateRecord, Mutation, ParticipantRecord, StepRecord, Store, TriggerRecord,
        WorkflowRecord,
    },
    Error, Result,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    workflows: HashMap<Uuid, WorkflowRecord>,
    steps: HashMap<Uuid, StepRecord>,
    participants: Vec<ParticipantRecord>,
    triggers: Vec<TriggerRecord>,
}

impl Tables {
    fn require_workflow(&self, id: Uuid) -> Result<()> {
        if self.workflows.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::Store(format!("Workflow {} does not exist", id)))
        }
    }

    fn apply(&mut self, mutation: Mutation) -> Result<()> {
        match mutation {
            Mutation::CreateWorkflow(record) => {
                if self.workflows.contains_key(&record.id) {
                    return Err(Error::Store(format!("Workflow {} already exists", record.id)));
                }
                self.workflows.insert(record.id, record);
            }
            Mutation::UpdateWorkflow { id, changes } => {
                let record = self
                    .workflows
                    .get_mut(&id)
                    .ok_or_else(|| Error::Store(format!("Workflow {} does not exist", id)))?;
                record.title = changes.title;
                record.description = changes.description;
                record.memory = changes.memory;
                record.custom_roles = changes.custom_roles;
                record.label = changes.label;
                record.status = changes.status;
                record.updated_at = changes.updated_at;
                record.started_at = changes.started_at;
                record.finished_at = changes.finished_at;
            }
            Mutation::CreateStep(record) => {
                self.require_workflow(record.workflow_id)?;
                if self.steps.contains_key(&record.id) {
                    return Err(Error::Store(format!("Step {} already exists", record.id)));
                }
                self.steps.insert(record.id, record);
            }
            Mutation::UpdateStep { id, changes } => {
                let record = self
                    .steps
                    .get_mut(&id)
                    .ok_or_else(|| Error::Store(format!("Step {} does not exist", id)))?;
                record.label = changes.label;
                record.status = changes.status;
                record.params = changes.params;
                record.updated_at = changes.updated_at;
            }
            Mutation::AddParticipant(record) => {
                self.require_workflow(record.workflow_id)?;
                self.participants.push(record);
            }
            Mutation::RemoveParticipant { workflow_id, user_id } => {
                self.participants
                    .retain(|p| !(p.workflow_id == workflow_id && p.user_id == user_id));
            }
            Mutation::CreateTrigger(record) => {
                self.require_workflow(record.workflow_id)?;
                self.triggers.push(record);
            }
        }
        Ok(())
    }

    fn steps_of(&self, workflow_id: Uuid) -> Vec<StepRecord> {
        let mut steps: Vec<StepRecord> = self
            .steps
            .values()
            .filter(|s| s.workflow_id == workflow_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.seq);
        steps
    }

    fn participants_of(&self, workflow_id: Uuid) -> Vec<ParticipantRecord> {
        self.participants
            .iter()
            .filter(|p| p.workflow_id == workflow_id)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| Error::Store(format!("read lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| Error::Store(format!("write lock poisoned: {}", e)))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch_aggregate(&self, id: Uuid) -> Result<Option<AggregateRecord>> {
        let tables = self.read()?;
        Ok(tables.workflows.get(&id).map(|workflow| AggregateRecord {
            workflow: workflow.clone(),
            steps: tables.steps_of(id),
            participants: tables.participants_of(id),
        }))
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<WorkflowRecord>> {
        Ok(self.read()?.workflows.get(&id).cloned())
    }

    async fn find_workflows_by_resource(
        &self,
        resource_name: &str,
        resource_id: Uuid,
    ) -> Result<Vec<WorkflowRecord>> {
        let tables = self.read()?;
        let mut found: Vec<WorkflowRecord> = tables
            .workflows
            .values()
            .filter(|w| w.resource_name == resource_name && w.resource_id == resource_id)
            .cloned()
            .collect();
        found.sort_by_key(|w| w.created_at);
        Ok(found)
    }

    async fn list_workflows(&self, limit: i64, offset: i64) -> Result<Vec<WorkflowRecord>> {
        let tables = self.read()?;
        let mut all: Vec<WorkflowRecord> = tables.workflows.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_workflow_steps(&self, workflow_id: Uuid) -> Result<Vec<StepRecord>> {
        Ok(self.read()?.steps_of(workflow_id))
    }

    async fn list_participants(&self, workflow_id: Uuid) -> Result<Vec<ParticipantRecord>> {
        Ok(self.read()?.participants_of(workflow_id))
    }

    async fn list_triggers(&self, workflow_id: Uuid) -> Result<Vec<TriggerRecord>> {
        let tables = self.read()?;
        let mut triggers: Vec<TriggerRecord> = tables
            .triggers
            .iter()
            .filter(|t| t.workflow_id == workflow_id)
            .cloned()
            .collect();
        triggers.sort_by_key(|t| t.due_at);
        Ok(triggers)
    }

    async fn apply(&self, batch: Vec<Mutation>) -> Result<()> {
        debug!("Applying batch of {} mutation(s)", batch.len());
        let mut tables = self.write()?;
        let mut draft = tables.clone();
        for mutation in batch {
            draft.apply(mutation)?;
        }
        *tables = draft;
        Ok(())
    }
}
