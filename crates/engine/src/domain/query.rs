use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    store::{ParticipantRecord, StepRecord, Store, TriggerRecord, WorkflowRecord},
    workflow::{WorkflowManager, WorkflowRegistry},
    Error, Result,
};

/// Upper bound on one page of `list_workflows`.
pub const MAX_PAGE_SIZE: i64 = 500;

/// Scope required by the per-workflow queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowScope {
    pub workflow_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StageView {
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    pub order: i32,
    pub step_count: usize,
    pub finished_count: usize,
}

/// Workflow with its child records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowView {
    pub workflow: WorkflowRecord,
    pub steps: Vec<StepRecord>,
    pub participants: Vec<ParticipantRecord>,
    pub triggers: Vec<TriggerRecord>,
    pub stages: Vec<StageView>,
}

pub struct WorkflowQueryManager {
    store: Arc<dyn Store>,
    registry: Arc<WorkflowRegistry>,
    prefix: String,
}

impl WorkflowQueryManager {
    pub fn new(manager: &WorkflowManager) -> Self {
        Self {
            store: manager.store().clone(),
            registry: manager.registry().clone(),
            prefix: manager.config().domain_namespace.clone(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn tags(&self) -> &'static [&'static str] {
        &["workflow"]
    }

    pub async fn get_workflow(&self, id: Uuid) -> Result<WorkflowRecord> {
        self.store
            .get_workflow(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Workflow {} not found", id)))
    }

    pub async fn list_workflows(&self, limit: i64, offset: i64) -> Result<Vec<WorkflowRecord>> {
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(Error::Execution(format!(
                "Page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, limit
            )));
        }
        if offset < 0 {
            return Err(Error::Execution(format!("Offset must not be negative, got {}", offset)));
        }
        self.store.list_workflows(limit, offset).await
    }

    pub async fn steps(&self, scope: &WorkflowScope) -> Result<Vec<StepRecord>> {
        self.get_workflow(scope.workflow_id).await?;
        self.store.list_workflow_steps(scope.workflow_id).await
    }

    pub async fn participants(&self, scope: &WorkflowScope) -> Result<Vec<ParticipantRecord>> {
        self.get_workflow(scope.workflow_id).await?;
        self.store.list_participants(scope.workflow_id).await
    }

    pub async fn triggers(&self, scope: &WorkflowScope) -> Result<Vec<TriggerRecord>> {
        self.get_workflow(scope.workflow_id).await?;
        self.store.list_triggers(scope.workflow_id).await
    }

    /// Stages of the workflow's definition, in order, with step counts from the instance.
    pub async fn stages(&self, scope: &WorkflowScope) -> Result<Vec<StageView>> {
        let workflow = self.get_workflow(scope.workflow_id).await?;
        let steps = self.store.list_workflow_steps(scope.workflow_id).await?;
        self.stage_views(&workflow, &steps)
    }

    pub async fn full(&self, scope: &WorkflowScope) -> Result<WorkflowView> {
        let workflow = self.get_workflow(scope.workflow_id).await?;
        let steps = self.store.list_workflow_steps(scope.workflow_id).await?;
        let participants = self.store.list_participants(scope.workflow_id).await?;
        let triggers = self.store.list_triggers(scope.workflow_id).await?;
        let stages = self.stage_views(&workflow, &steps)?;

        Ok(WorkflowView {
            workflow,
            steps,
            participants,
            triggers,
            stages,
        })
    }

    fn stage_views(&self, workflow: &WorkflowRecord, steps: &[StepRecord]) -> Result<Vec<StageView>> {
        let definition = self.registry.get(&workflow.workflow_key)?;
        let mut views: Vec<StageView> = definition
            .stages()
            .map(|stage| {
                let in_stage = steps.iter().filter(|s| s.stage_key == stage.key);
                StageView {
                    key: stage.key.clone(),
                    title: stage.title.clone(),
                    description: stage.description.clone(),
                    order: stage.order,
                    step_count: in_stage.clone().count(),
                    finished_count: in_stage.filter(|s| s.status.is_finished()).count(),
                }
            })
            .collect();
        views.sort_by_key(|v| v.order);
        Ok(views)
    }
}
