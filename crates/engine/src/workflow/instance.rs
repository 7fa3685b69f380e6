//! A live workflow instance.
//!
//! [`Workflow`] pairs the current [`WorkflowState`] snapshot with its
//! definition and the store mutations produced since the last flush. Every
//! operation validates first and only then replaces the snapshot, so a
//! failed call leaves the instance untouched.

use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    definition::WorkflowDefinition,
    metrics::TRANSITIONS_TOTAL,
    status::{StepStatus, WorkflowStatus},
    store::{
        AggregateRecord, Mutation, ParticipantRecord, StepChanges, StepRecord, TriggerRecord,
        WorkflowChanges, WorkflowRecord,
    },
    workflow::{Activity, Participant, ResourceRef, StateChange, StepState, WorkflowState},
    Error, Result,
};

#[derive(Debug, Clone)]
pub struct Workflow {
    definition: Arc<WorkflowDefinition>,
    state: WorkflowState,
    pending: Vec<Mutation>,
    changes: Vec<StateChange>,
}

impl Workflow {
    pub(crate) fn create(
        definition: Arc<WorkflowDefinition>,
        resource: ResourceRef,
        params: Map<String, Value>,
    ) -> Self {
        let state = WorkflowState::new(
            definition.key(),
            definition.revision(),
            definition.title(),
            resource,
            params,
        );
        let pending = vec![Mutation::CreateWorkflow(WorkflowRecord::from(&state))];
        Self {
            definition,
            state,
            pending,
            changes: Vec::new(),
        }
    }

    pub(crate) fn from_aggregate(
        definition: Arc<WorkflowDefinition>,
        aggregate: AggregateRecord,
    ) -> Result<Self> {
        Ok(Self {
            definition,
            state: WorkflowState::try_from(aggregate)?,
            pending: Vec::new(),
            changes: Vec::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn key(&self) -> &str {
        &self.state.key
    }

    pub fn status(&self) -> WorkflowStatus {
        self.state.status
    }

    pub fn label(&self) -> Option<&str> {
        self.state.label.as_deref()
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn definition(&self) -> &Arc<WorkflowDefinition> {
        &self.definition
    }

    pub fn step(&self, id: Uuid) -> Option<&StepState> {
        self.state.step(id)
    }

    pub fn steps(&self) -> impl Iterator<Item = &StepState> {
        self.state.step_id_map.values()
    }

    pub fn step_count(&self) -> usize {
        self.state.step_id_map.len()
    }

    /// Mutations not yet handed to the store.
    pub fn pending_mutations(&self) -> &[Mutation] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Transitions executed since the last snapshot was split off.
    pub fn changes(&self) -> &[StateChange] {
        &self.changes
    }

    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.pending)
    }

    /// Copy of the instance carrying the pending mutations and changes, which
    /// are cleared on `self`.
    pub(crate) fn split_snapshot(&mut self) -> Workflow {
        Workflow {
            definition: self.definition.clone(),
            state: self.state.clone(),
            pending: std::mem::take(&mut self.pending),
            changes: std::mem::take(&mut self.changes),
        }
    }

    /// Move from `NEW` to the machine's start label and seed the first steps.
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.state.status, WorkflowStatus::New | WorkflowStatus::Blank) {
            return Err(Error::Execution(format!(
                "Cannot start workflow in status {}",
                self.state.status
            )));
        }

        let mut draft = self.clone();
        let start = draft.definition.machine().start().to_string();
        draft.state = draft
            .state
            .with_label(start)
            .with_status(WorkflowStatus::Active)
            .with_started();
        draft.record_workflow();

        match draft.definition.start_hook().cloned() {
            Some(hook) => {
                for activity in hook(&draft.state) {
                    draft.apply_activity(activity, None)?;
                }
            }
            None => {
                let seeds: Vec<String> = draft
                    .definition
                    .seed_steps()
                    .iter()
                    .map(|s| s.key.clone())
                    .collect();
                for key in seeds {
                    draft.add_step(&key, None, None, Value::Null)?;
                }
            }
        }

        info!(
            "Started workflow {} ({}) with {} step(s)",
            draft.state.id,
            draft.state.key,
            draft.step_count()
        );
        *self = draft;
        Ok(())
    }

    /// Instantiate step definition `step_key`. Returns the new step's id.
    pub fn add_step(
        &mut self,
        step_key: &str,
        title: Option<String>,
        selector: Option<Uuid>,
        params: Value,
    ) -> Result<Uuid> {
        self.require_active("add step to")?;

        let definition = self.definition.step(step_key).ok_or_else(|| {
            Error::Execution(format!(
                "Step '{}' is not defined on workflow '{}'",
                step_key, self.state.key
            ))
        })?;

        if !definition.multi && self.state.steps_of(step_key).any(|s| !s.is_finished()) {
            return Err(Error::Execution(format!(
                "Step '{}' does not allow multiple instances",
                step_key
            )));
        }

        let label = definition.machine.start().to_string();
        let now = Utc::now();
        let step = StepState {
            id: Uuid::new_v4(),
            workflow_id: self.state.id,
            step_key: definition.key.clone(),
            stage_key: definition.stage.clone(),
            title: title.unwrap_or_else(|| definition.title.clone()),
            status: StepStatus::terminal_for_label(&label).unwrap_or(StepStatus::Active),
            label,
            selector,
            params,
            seq: self.state.step_id_map.len() as i64,
            created_at: now,
            updated_at: now,
        };
        let id = step.id;

        debug!("Adding step '{}' ({}) to workflow {}", step_key, id, self.state.id);
        self.put_step(step, true);
        Ok(id)
    }

    /// Run step transition `name` on step instance `step_id`.
    pub fn transition_step(&mut self, step_id: Uuid, name: &str) -> Result<StateChange> {
        self.require_active("transition step in")?;

        let step = self.state.step(step_id).ok_or_else(|| {
            Error::NotFound(format!(
                "Step {} not found in workflow {}",
                step_id, self.state.id
            ))
        })?;
        if step.is_finished() {
            return Err(Error::Execution(format!(
                "Step {} is already {}",
                step_id, step.status
            )));
        }
        let definition = self.definition.step(&step.step_key).ok_or_else(|| {
            Error::Execution(format!(
                "Step '{}' is not defined on workflow '{}'",
                step.step_key, self.state.key
            ))
        })?;

        let change = definition.machine.execute(&step.label, name, step)?;

        let mut next = step.with_label(change.target.clone());
        if let Some(status) = StepStatus::terminal_for_label(&change.target) {
            next = next.with_status(status);
        }

        debug!(
            "Step {} transition '{}': {} -> {}",
            step_id, name, change.source, change.target
        );
        self.put_step(next, false);
        self.changes.push(change.clone());
        TRANSITIONS_TOTAL.inc();
        Ok(change)
    }

    /// Run workflow-level transition `name`.
    pub fn transition(&mut self, name: &str) -> Result<StateChange> {
        if matches!(self.state.status, WorkflowStatus::New | WorkflowStatus::Blank) {
            return Err(Error::Execution(format!(
                "Workflow {} has not been started",
                self.state.id
            )));
        }
        if self.state.status.is_finished() {
            return Err(Error::Execution(format!(
                "Cannot transition workflow in status {}",
                self.state.status
            )));
        }

        let machine = self.definition.machine();
        let current = self
            .state
            .label
            .clone()
            .unwrap_or_else(|| machine.start().to_string());
        let change = machine.execute(&current, name, &self.state)?;

        let mut next = self.state.with_label(change.target.clone());
        if let Some(status) = WorkflowStatus::terminal_for_label(&change.target) {
            next = next.with_status(status);
        }

        info!(
            "Workflow {} transition '{}': {} -> {}",
            self.state.id, name, change.source, change.target
        );
        self.state = next;
        self.record_workflow();
        self.changes.push(change.clone());
        TRANSITIONS_TOTAL.inc();
        Ok(change)
    }

    pub fn cancel(&mut self) -> Result<StateChange> {
        self.transition("cancel")
    }

    pub fn abort(&mut self) -> Result<StateChange> {
        self.transition("abort")
    }

    pub fn ignore_step(&mut self, step_id: Uuid) -> Result<()> {
        self.finish_step(step_id, StepStatus::Ignored)
    }

    pub fn cancel_step(&mut self, step_id: Uuid) -> Result<()> {
        self.finish_step(step_id, StepStatus::Cancelled)
    }

    pub fn memorize(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        if self.state.status.is_finished() {
            return Err(Error::Execution(format!(
                "Cannot update memory of workflow in status {}",
                self.state.status
            )));
        }
        self.state = self.state.with_memory(key, value);
        self.record_workflow();
        Ok(())
    }

    pub fn update_info(&mut self, title: Option<String>, description: Option<String>) -> Result<()> {
        if title.as_deref().map(str::trim) == Some("") {
            return Err(Error::Execution("Workflow title must not be empty".into()));
        }
        self.state = self.state.with_info(title, description);
        self.record_workflow();
        Ok(())
    }

    /// Whether `role` is declared on the definition or granted on this instance.
    pub fn has_role(&self, role: &str) -> bool {
        self.definition.role(role).is_some() || self.state.custom_roles.iter().any(|r| r == role)
    }

    pub fn add_participant(&mut self, user_id: Uuid, role: &str) -> Result<()> {
        if !self.has_role(role) {
            return Err(Error::Execution(format!(
                "Role '{}' is not defined on workflow '{}'",
                role, self.state.key
            )));
        }
        if self
            .state
            .participants
            .iter()
            .any(|p| p.user_id == user_id && p.role == role)
        {
            return Err(Error::Execution(format!(
                "User {} is already a participant with role '{}'",
                user_id, role
            )));
        }

        let participant = Participant {
            user_id,
            role: role.to_string(),
            added_at: Utc::now(),
        };
        self.pending.push(Mutation::AddParticipant(
            ParticipantRecord::from_participant(self.state.id, &participant),
        ));
        self.state = self.state.with_participant(participant);
        self.record_workflow();
        Ok(())
    }

    pub fn remove_participant(&mut self, user_id: Uuid) -> Result<()> {
        if !self.state.participants.iter().any(|p| p.user_id == user_id) {
            return Err(Error::NotFound(format!(
                "User {} is not a participant of workflow {}",
                user_id, self.state.id
            )));
        }
        self.pending.push(Mutation::RemoveParticipant {
            workflow_id: self.state.id,
            user_id,
        });
        self.state = self.state.without_participant(user_id);
        self.record_workflow();
        Ok(())
    }

    /// Grant an extra role on this instance.
    pub fn add_role(&mut self, role: &str) -> Result<()> {
        if role.trim().is_empty() {
            return Err(Error::Execution("Role must not be empty".into()));
        }
        if self.has_role(role) {
            return Err(Error::Execution(format!("Role '{}' already exists", role)));
        }
        let mut roles = self.state.custom_roles.clone();
        roles.push(role.to_string());
        self.state = self.state.with_custom_roles(roles);
        self.record_workflow();
        Ok(())
    }

    /// Drop a role granted with [`Workflow::add_role`]. Refused while a participant holds it.
    pub fn remove_role(&mut self, role: &str) -> Result<()> {
        if !self.state.custom_roles.iter().any(|r| r == role) {
            return Err(Error::Execution(if self.definition.role(role).is_some() {
                format!("Role '{}' is declared on the definition and cannot be removed", role)
            } else {
                format!("Role '{}' is not granted on workflow {}", role, self.state.id)
            }));
        }

        let holders = self.state.participants.iter().filter(|p| p.role == role).count();
        if holders > 0 {
            return Err(Error::Execution(format!(
                "Role '{}' is still held by {} participant(s)",
                role, holders
            )));
        }

        let roles = self
            .state
            .custom_roles
            .iter()
            .filter(|r| *r != role)
            .cloned()
            .collect();
        self.state = self.state.with_custom_roles(roles);
        self.record_workflow();
        Ok(())
    }

    /// Record a trigger due `delay_seconds` from now. Firing it is up to the caller.
    pub fn schedule_trigger(
        &mut self,
        trigger_type: &str,
        payload: Value,
        target_id: Option<Uuid>,
        delay_seconds: i64,
    ) -> Result<TriggerRecord> {
        if !self.state.status.is_active() {
            return Err(Error::Execution(format!(
                "Cannot send trigger to workflow in status {}",
                self.state.status
            )));
        }
        if trigger_type.trim().is_empty() {
            return Err(Error::Execution("Trigger type must not be empty".into()));
        }
        if delay_seconds < 0 {
            return Err(Error::Execution(format!(
                "Trigger delay must not be negative: {}",
                delay_seconds
            )));
        }

        let now = Utc::now();
        let due_at = Duration::try_seconds(delay_seconds)
            .and_then(|delay| now.checked_add_signed(delay))
            .ok_or_else(|| {
                Error::Execution(format!("Trigger delay is out of range: {}", delay_seconds))
            })?;
        let trigger = TriggerRecord {
            id: Uuid::new_v4(),
            workflow_id: self.state.id,
            trigger_type: trigger_type.to_string(),
            payload,
            target_id,
            delay_seconds,
            due_at,
            created_at: now,
        };
        self.pending.push(Mutation::CreateTrigger(trigger.clone()));
        Ok(trigger)
    }

    /// Apply one handler effect. `bound_step` is the step instance the
    /// handler ran for, used by step transitions without an explicit id.
    /// Returns whether the instance changed.
    pub fn apply_activity(&mut self, activity: Activity, bound_step: Option<Uuid>) -> Result<bool> {
        match activity {
            Activity::AddStep {
                step_key,
                title,
                selector,
                params,
            } => {
                self.add_step(&step_key, title, selector, params)?;
            }
            Activity::TransitionStep {
                step_id,
                transition,
            } => {
                let step_id = step_id.or(bound_step).ok_or_else(|| {
                    Error::Execution(format!(
                        "Step transition '{}' has no step: the handler is not bound to a step and no step_id was given",
                        transition
                    ))
                })?;
                self.transition_step(step_id, &transition)?;
            }
            Activity::TransitionWorkflow { transition } => {
                self.transition(&transition)?;
            }
            Activity::Memorize { key, value } => {
                self.memorize(key, value)?;
            }
            Activity::Message { text } => {
                info!("Workflow {}: {}", self.state.id, text);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn require_active(&self, action: &str) -> Result<()> {
        if self.state.status.is_active() {
            Ok(())
        } else {
            Err(Error::Execution(format!(
                "Cannot {} workflow in status {}",
                action, self.state.status
            )))
        }
    }

    fn finish_step(&mut self, step_id: Uuid, status: StepStatus) -> Result<()> {
        if self.state.status.is_finished() {
            return Err(Error::Execution(format!(
                "Cannot change steps of workflow in status {}",
                self.state.status
            )));
        }
        let step = self.state.step(step_id).ok_or_else(|| {
            Error::NotFound(format!(
                "Step {} not found in workflow {}",
                step_id, self.state.id
            ))
        })?;
        if step.is_finished() {
            return Err(Error::Execution(format!(
                "Step {} is already {}",
                step_id, step.status
            )));
        }

        let mut next = step.with_status(status);
        let has_label = self
            .definition
            .step(&step.step_key)
            .map(|d| d.machine.has_state(status.as_str()))
            .unwrap_or(false);
        if has_label {
            next = next.with_label(status.as_str());
        }
        self.put_step(next, false);
        Ok(())
    }

    fn put_step(&mut self, step: StepState, created: bool) {
        self.record_step(&step, created);
        self.state = self.state.with_step(step);
        self.record_workflow();
    }

    // Fold into a pending create/update of the same row when there is one.
    fn record_workflow(&mut self) {
        let id = self.state.id;
        for mutation in self.pending.iter_mut().rev() {
            match mutation {
                Mutation::CreateWorkflow(record) if record.id == id => {
                    *record = WorkflowRecord::from(&self.state);
                    return;
                }
                Mutation::UpdateWorkflow { id: pending_id, changes } if *pending_id == id => {
                    *changes = WorkflowChanges::from(&self.state);
                    return;
                }
                _ => {}
            }
        }
        self.pending.push(Mutation::UpdateWorkflow {
            id,
            changes: WorkflowChanges::from(&self.state),
        });
    }

    fn record_step(&mut self, step: &StepState, created: bool) {
        if created {
            self.pending.push(Mutation::CreateStep(StepRecord::from(step)));
            return;
        }
        for mutation in self.pending.iter_mut().rev() {
            match mutation {
                Mutation::CreateStep(record) if record.id == step.id => {
                    *record = StepRecord::from(step);
                    return;
                }
                Mutation::UpdateStep { id, changes } if *id == step.id => {
                    *changes = StepChanges::from(step);
                    return;
                }
                _ => {}
            }
        }
        self.pending.push(Mutation::UpdateStep {
            id: step.id,
            changes: StepChanges::from(step),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Role, Stage, StepBuilder, Transition, WorkflowBuilder};
    use serde_json::json;

    fn definition() -> Arc<WorkflowDefinition> {
        let intake = Stage::new("Intake").with_order(1);
        let work = Stage::new("Work").with_order(2);
        Arc::new(
            WorkflowBuilder::new("Review Flow", 1)
                .stage(intake.clone())
                .stage(work.clone())
                .role(Role::new("Reviewer"))
                .step(
                    StepBuilder::new("Review", &intake)
                        .states(["CREATED", "REVIEW", "APPROVED", "COMPLETED", "CANCELLED"])
                        .transition(Transition::new("submit", "REVIEW").from_states(["CREATED"]))
                        .transition(Transition::new("approve", "APPROVED").from_states(["REVIEW"]))
                        .transition(Transition::new("finish", "COMPLETED").from_states(["APPROVED"])),
                )
                .step(StepBuilder::new("Task", &work).multi(true))
                .build()
                .unwrap(),
        )
    }

    fn new_workflow() -> Workflow {
        Workflow::create(
            definition(),
            ResourceRef {
                name: "doc".into(),
                id: Uuid::new_v4(),
            },
            Map::new(),
        )
    }

    fn started() -> Workflow {
        let mut wf = new_workflow();
        wf.start().unwrap();
        wf
    }

    fn review_step(wf: &Workflow) -> Uuid {
        wf.steps().find(|s| s.step_key == "review").unwrap().id
    }

    #[test]
    fn created_workflow_is_new() {
        let wf = new_workflow();
        assert_eq!(wf.status(), WorkflowStatus::New);
        assert!(wf.label().is_none());
        assert_eq!(wf.step_count(), 0);
        assert_eq!(wf.pending_mutations().len(), 1);
    }

    #[test]
    fn start_seeds_lowest_stage() {
        let wf = started();
        assert_eq!(wf.status(), WorkflowStatus::Active);
        assert_eq!(wf.label(), Some("ACTIVE"));
        assert!(wf.state().started_at.is_some());
        assert_eq!(wf.step_count(), 1);

        // create workflow (folded) + create step
        assert_eq!(wf.pending_mutations().len(), 2);
        assert!(matches!(
            &wf.pending_mutations()[0],
            Mutation::CreateWorkflow(record) if record.status == WorkflowStatus::Active
        ));
    }

    #[test]
    fn start_twice_fails() {
        let mut wf = started();
        let err = wf.start().unwrap_err();
        assert!(err.is_execution());
        assert_eq!(wf.step_count(), 1);
    }

    #[test]
    fn step_transitions_follow_guards() {
        let mut wf = started();
        let id = review_step(&wf);

        let err = wf.transition_step(id, "approve").unwrap_err();
        assert!(err.is_execution());
        assert_eq!(wf.step(id).unwrap().label, "CREATED");

        wf.transition_step(id, "submit").unwrap();
        wf.transition_step(id, "approve").unwrap();
        let change = wf.transition_step(id, "finish").unwrap();
        assert_eq!(change.target, "COMPLETED");
        assert_eq!(wf.step(id).unwrap().status, StepStatus::Completed);
        assert_eq!(wf.changes().len(), 3);

        let err = wf.transition_step(id, "submit").unwrap_err();
        assert!(err.to_string().contains("already COMPLETED"));
    }

    #[test]
    fn single_instance_steps_are_enforced() {
        let mut wf = started();
        let err = wf.add_step("review", None, None, Value::Null).unwrap_err();
        assert!(err.to_string().contains("does not allow multiple instances"));

        wf.add_step("task", None, None, Value::Null).unwrap();
        wf.add_step("task", None, None, Value::Null).unwrap();
        assert_eq!(wf.step_count(), 3);
    }

    #[test]
    fn finished_workflow_refuses_changes() {
        let mut wf = started();
        wf.transition("complete").unwrap();
        assert_eq!(wf.status(), WorkflowStatus::Completed);
        assert!(wf.state().finished_at.is_some());

        assert!(wf.transition("cancel").is_err());
        assert!(wf.add_step("task", None, None, Value::Null).is_err());
        assert!(wf.memorize("k", json!(1)).is_err());
    }

    #[test]
    fn cancel_and_abort_reach_finished_statuses() {
        let mut wf = started();
        wf.cancel().unwrap();
        assert_eq!(wf.status(), WorkflowStatus::Cancelled);

        let mut wf = started();
        wf.abort().unwrap();
        assert_eq!(wf.status(), WorkflowStatus::Aborted);
    }

    #[test]
    fn pending_updates_coalesce() {
        let mut wf = started();
        let _ = wf.take_mutations();
        let id = review_step(&wf);

        wf.transition_step(id, "submit").unwrap();
        wf.transition_step(id, "approve").unwrap();
        wf.memorize("note", json!("ok")).unwrap();

        let mutations = wf.take_mutations();
        assert_eq!(mutations.len(), 2);
        assert!(mutations.iter().any(|m| matches!(
            m,
            Mutation::UpdateStep { changes, .. } if changes.label == "APPROVED"
        )));
    }

    #[test]
    fn participants_need_known_roles() {
        let mut wf = started();
        let user = Uuid::new_v4();

        assert!(wf.add_participant(user, "auditor").is_err());
        wf.add_participant(user, "reviewer").unwrap();
        assert!(wf.add_participant(user, "reviewer").is_err());

        wf.add_role("auditor").unwrap();
        assert!(wf.add_role("auditor").is_err());
        wf.add_participant(user, "auditor").unwrap();
        assert_eq!(wf.state().participants.len(), 2);

        assert!(wf.remove_role("auditor").unwrap_err().to_string().contains("still held"));
        assert!(wf.remove_role("reviewer").is_err());

        wf.remove_participant(user).unwrap();
        assert!(wf.state().participants.is_empty());
        assert!(wf.remove_participant(user).is_err());

        wf.remove_role("auditor").unwrap();
        assert!(wf.state().custom_roles.is_empty());
    }

    #[test]
    fn ignore_and_cancel_step() {
        let mut wf = started();
        let task = wf.add_step("task", None, None, Value::Null).unwrap();
        let review = review_step(&wf);

        wf.ignore_step(task).unwrap();
        assert_eq!(wf.step(task).unwrap().status, StepStatus::Ignored);
        assert_eq!(wf.step(task).unwrap().label, "CREATED");

        wf.cancel_step(review).unwrap();
        assert_eq!(wf.step(review).unwrap().status, StepStatus::Cancelled);
        assert_eq!(wf.step(review).unwrap().label, "CANCELLED");

        assert!(wf.cancel_step(review).is_err());
    }

    #[test]
    fn triggers_require_active_workflow() {
        let mut wf = new_workflow();
        let err = wf.schedule_trigger("time_based", json!({}), None, 300).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Execution error: Cannot send trigger to workflow in status NEW"
        );

        wf.start().unwrap();
        let trigger = wf.schedule_trigger("time_based", json!({"schedule": "daily"}), None, 300).unwrap();
        assert_eq!(trigger.due_at - trigger.created_at, Duration::seconds(300));
    }

    #[test]
    fn activities_apply_in_order() {
        let mut wf = started();
        let review = review_step(&wf);

        assert!(wf.apply_activity(Activity::transition_step("submit"), Some(review)).unwrap());
        assert!(wf.apply_activity(Activity::add_step("task"), None).unwrap());
        assert!(!wf.apply_activity(Activity::message("hello"), None).unwrap());
        assert!(wf.apply_activity(Activity::transition_step("submit"), None).is_err());

        assert_eq!(wf.step(review).unwrap().label, "REVIEW");
        assert_eq!(wf.step_count(), 2);
    }

    #[test]
    fn split_snapshot_hands_over_pending() {
        let mut wf = started();
        let snapshot = wf.split_snapshot();
        assert_eq!(snapshot.pending_mutations().len(), 2);
        assert!(!wf.has_pending());
        assert_eq!(snapshot.state(), wf.state());
    }
}
