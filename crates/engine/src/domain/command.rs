//! Workflow commands and their handler.
//!
//! Each command carries static [`CommandMeta`] and a typed payload. The
//! handler loads the target instance, applies the command through the
//! [`Workflow`] API and commits the resulting mutations.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    domain::datadef::*,
    store::WorkflowRecord,
    workflow::{EventPayload, Workflow, WorkflowManager},
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandMeta {
    pub key: &'static str,
    pub name: &'static str,
    pub auth_required: bool,
    /// The command creates its aggregate instead of addressing an existing one.
    pub new_resource: bool,
    pub resources: &'static [&'static str],
    pub tags: &'static [&'static str],
    pub description: &'static str,
}

const fn meta(key: &'static str, name: &'static str, tags: &'static [&'static str], description: &'static str) -> CommandMeta {
    CommandMeta {
        key,
        name,
        auth_required: true,
        new_resource: false,
        resources: &["workflow"],
        tags,
        description,
    }
}

pub const CREATE_WORKFLOW: CommandMeta = CommandMeta {
    new_resource: true,
    ..meta("create-workflow", "Create Workflow", &["workflow", "create"], "Create a new workflow instance")
};
pub const UPDATE_WORKFLOW: CommandMeta =
    meta("update-workflow", "Update Workflow", &["workflow", "update"], "Update workflow title or description");
pub const ADD_PARTICIPANT: CommandMeta =
    meta("add-participant", "Add Participant", &["workflow", "participant"], "Add a participant to a workflow");
pub const REMOVE_PARTICIPANT: CommandMeta = meta(
    "remove-participant",
    "Remove Participant",
    &["workflow", "participant"],
    "Remove a participant from a workflow",
);
pub const PROCESS_ACTIVITY: CommandMeta =
    meta("process-activity", "Process Activity", &["workflow", "activity"], "Apply an activity to a workflow");
pub const ADD_ROLE: CommandMeta = meta("add-role", "Add Role", &["workflow", "role"], "Grant an extra role on a workflow");
pub const REMOVE_ROLE: CommandMeta =
    meta("remove-role", "Remove Role", &["workflow", "role"], "Remove a role granted on a workflow");
pub const START_WORKFLOW: CommandMeta =
    meta("start-workflow", "Start Workflow", &["workflow", "lifecycle"], "Start a workflow and seed its first steps");
pub const CANCEL_WORKFLOW: CommandMeta =
    meta("cancel-workflow", "Cancel Workflow", &["workflow", "lifecycle"], "Cancel a running workflow");
pub const IGNORE_STEP: CommandMeta = meta("ignore-step", "Ignore Step", &["workflow", "step"], "Mark a step as ignored");
pub const CANCEL_STEP: CommandMeta = meta("cancel-step", "Cancel Step", &["workflow", "step"], "Cancel a step");
pub const ABORT_WORKFLOW: CommandMeta =
    meta("abort-workflow", "Abort Workflow", &["workflow", "lifecycle"], "Abort a running workflow");
pub const INJECT_EVENT: CommandMeta =
    meta("inject-event", "Inject Event", &["workflow", "event"], "Deliver an event to a workflow's handlers");
pub const SEND_TRIGGER: CommandMeta =
    meta("send-trigger", "Send Trigger", &["workflow", "trigger"], "Schedule a trigger for a workflow");

pub static COMMANDS: [CommandMeta; 14] = [
    CREATE_WORKFLOW,
    UPDATE_WORKFLOW,
    ADD_PARTICIPANT,
    REMOVE_PARTICIPANT,
    PROCESS_ACTIVITY,
    ADD_ROLE,
    REMOVE_ROLE,
    START_WORKFLOW,
    CANCEL_WORKFLOW,
    IGNORE_STEP,
    CANCEL_STEP,
    ABORT_WORKFLOW,
    INJECT_EVENT,
    SEND_TRIGGER,
];

pub fn command_meta(key: &str) -> Option<&'static CommandMeta> {
    COMMANDS.iter().find(|m| m.key == key)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "command", content = "payload", rename_all = "kebab-case")]
pub enum WorkflowCommand {
    CreateWorkflow(CreateWorkflowData),
    UpdateWorkflow(UpdateWorkflowData),
    AddParticipant(AddParticipantData),
    RemoveParticipant(RemoveParticipantData),
    ProcessActivity(ProcessActivityData),
    AddRole(RoleData),
    RemoveRole(RoleData),
    StartWorkflow,
    CancelWorkflow,
    IgnoreStep(StepRefData),
    CancelStep(StepRefData),
    AbortWorkflow,
    InjectEvent(InjectEventData),
    SendTrigger(SendTriggerData),
}

impl WorkflowCommand {
    pub fn meta(&self) -> &'static CommandMeta {
        match self {
            WorkflowCommand::CreateWorkflow(_) => &CREATE_WORKFLOW,
            WorkflowCommand::UpdateWorkflow(_) => &UPDATE_WORKFLOW,
            WorkflowCommand::AddParticipant(_) => &ADD_PARTICIPANT,
            WorkflowCommand::RemoveParticipant(_) => &REMOVE_PARTICIPANT,
            WorkflowCommand::ProcessActivity(_) => &PROCESS_ACTIVITY,
            WorkflowCommand::AddRole(_) => &ADD_ROLE,
            WorkflowCommand::RemoveRole(_) => &REMOVE_ROLE,
            WorkflowCommand::StartWorkflow => &START_WORKFLOW,
            WorkflowCommand::CancelWorkflow => &CANCEL_WORKFLOW,
            WorkflowCommand::IgnoreStep(_) => &IGNORE_STEP,
            WorkflowCommand::CancelStep(_) => &CANCEL_STEP,
            WorkflowCommand::AbortWorkflow => &ABORT_WORKFLOW,
            WorkflowCommand::InjectEvent(_) => &INJECT_EVENT,
            WorkflowCommand::SendTrigger(_) => &SEND_TRIGGER,
        }
    }
}

pub struct WorkflowCommandHandler {
    manager: Arc<WorkflowManager>,
}

impl WorkflowCommandHandler {
    pub fn new(manager: Arc<WorkflowManager>) -> Self {
        Self { manager }
    }

    /// Run `command` against workflow `workflow_id` and commit the result.
    /// `create-workflow` ignores the id and returns the new instance.
    pub async fn execute(&self, workflow_id: Option<Uuid>, command: WorkflowCommand) -> Result<Value> {
        let meta = command.meta();
        debug!("Executing command '{}' on {:?}", meta.key, workflow_id);

        if let WorkflowCommand::CreateWorkflow(data) = command {
            if workflow_id.is_some() {
                warn!("Command '{}' creates its own id, ignoring {:?}", meta.key, workflow_id);
            }
            return self.create_workflow(data).await;
        }

        let id = workflow_id.ok_or_else(|| {
            Error::Execution(format!("Command '{}' requires a workflow id", meta.key))
        })?;
        let mut workflow = self.manager.load_workflow(id).await?;

        let response = match command {
            WorkflowCommand::CreateWorkflow(_) => {
                return Err(Error::Execution(format!(
                    "Command '{}' cannot target an existing workflow",
                    meta.key
                )))
            }
            WorkflowCommand::UpdateWorkflow(data) => {
                workflow.update_info(data.title, data.desc)?;
                Self::workflow_response(&workflow)?
            }
            WorkflowCommand::AddParticipant(data) => {
                workflow.add_participant(data.user_id, &data.role)?;
                json!({
                    "workflow_id": workflow.id(),
                    "user_id": data.user_id,
                    "role": data.role,
                })
            }
            WorkflowCommand::RemoveParticipant(data) => {
                workflow.remove_participant(data.user_id)?;
                json!({ "workflow_id": workflow.id(), "user_id": data.user_id })
            }
            WorkflowCommand::ProcessActivity(data) => {
                let changed = workflow.apply_activity(data.activity, data.step_id)?;
                json!({ "workflow_id": workflow.id(), "changed": changed })
            }
            WorkflowCommand::AddRole(data) => {
                workflow.add_role(&data.role)?;
                json!({ "workflow_id": workflow.id(), "roles": workflow.state().custom_roles })
            }
            WorkflowCommand::RemoveRole(data) => {
                workflow.remove_role(&data.role)?;
                json!({ "workflow_id": workflow.id(), "roles": workflow.state().custom_roles })
            }
            WorkflowCommand::StartWorkflow => {
                workflow.start()?;
                Self::workflow_response(&workflow)?
            }
            WorkflowCommand::CancelWorkflow => {
                workflow.cancel()?;
                Self::workflow_response(&workflow)?
            }
            WorkflowCommand::AbortWorkflow => {
                workflow.abort()?;
                Self::workflow_response(&workflow)?
            }
            WorkflowCommand::IgnoreStep(data) => {
                workflow.ignore_step(data.step_id)?;
                Self::step_response(&workflow, data.step_id)
            }
            WorkflowCommand::CancelStep(data) => {
                workflow.cancel_step(data.step_id)?;
                Self::step_response(&workflow, data.step_id)
            }
            WorkflowCommand::InjectEvent(data) => return self.inject_event(workflow, data).await,
            WorkflowCommand::SendTrigger(data) => {
                let trigger = workflow.schedule_trigger(
                    &data.trigger_type,
                    data.trigger_data,
                    data.target_id,
                    data.delay_seconds,
                )?;
                json!({
                    "status": "trigger_sent",
                    "trigger_type": trigger.trigger_type,
                    "workflow_id": workflow.id(),
                    "trigger_id": trigger.id,
                    "delay_seconds": trigger.delay_seconds,
                    "due_at": trigger.due_at,
                    "timestamp": trigger.created_at,
                })
            }
        };

        self.manager.commit_workflow(&mut workflow).await?;
        info!("Command '{}' applied to workflow {}", meta.key, id);
        Ok(response)
    }

    async fn create_workflow(&self, data: CreateWorkflowData) -> Result<Value> {
        data.validate()?;
        let mut workflow = self.manager.create_workflow(
            &data.workflow_key,
            &data.resource_name,
            data.route_id,
            data.params,
        )?;
        workflow.update_info(Some(data.title), None)?;
        self.manager.commit_workflow(&mut workflow).await?;
        info!("Command '{}' created workflow {}", CREATE_WORKFLOW.key, workflow.id());
        Self::workflow_response(&workflow)
    }

    async fn inject_event(&self, mut workflow: Workflow, data: InjectEventData) -> Result<Value> {
        let resource = workflow.state().resource.clone();
        let mut payload = EventPayload::new(resource.name, resource.id).with_data(data.event_data);
        if let Some(step_id) = data.target_step_id {
            payload = payload.with_target_step(step_id);
        }
        if let Some(selector) = data.step_selector {
            payload = payload.with_selector(selector);
        }

        debug!(
            "Injecting '{}' (priority {}) into workflow {}",
            data.event_type,
            data.priority,
            workflow.id()
        );
        let mut snapshots = self
            .manager
            .inject_event(&mut workflow, &data.event_type, payload)
            .await?;
        let applied = snapshots.len();
        self.manager.commit_workflows(&mut snapshots).await?;

        Ok(json!({
            "status": "event_injected",
            "event_type": data.event_type,
            "workflow_id": workflow.id(),
            "priority": data.priority,
            "applied": applied,
            "timestamp": Utc::now(),
        }))
    }

    fn workflow_response(workflow: &Workflow) -> Result<Value> {
        Ok(serde_json::to_value(WorkflowRecord::from(workflow.state()))?)
    }

    fn step_response(workflow: &Workflow, step_id: Uuid) -> Value {
        match workflow.step(step_id) {
            Some(step) => json!({
                "workflow_id": workflow.id(),
                "step_id": step.id,
                "label": step.label,
                "status": step.status,
            }),
            None => json!({ "workflow_id": workflow.id(), "step_id": step_id }),
        }
    }
}
