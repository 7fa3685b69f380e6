//! Workflow manager.
//!
//! Owns the definition registry and the event router, creates and reloads
//! workflow instances, drives events through handlers and flushes the
//! resulting mutations to the store in transactions.

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    definition::WorkflowDefinition,
    metrics::{COMMITS_TOTAL, COMMIT_FAILURES_TOTAL, EVENTS_PROCESSED_TOTAL, WORKFLOWS_CREATED_TOTAL},
    router::{ActivityRouter, Dispatch},
    status::WorkflowStatus,
    store::{Mutation, Store},
    workflow::{Event, EventPayload, HandlerContext, ResourceRef, Workflow, WorkflowRegistry},
    Error, Result,
};

#[derive(Debug, Default)]
struct Transaction {
    open: bool,
    staged: Vec<Mutation>,
}

/// Instances resolved for one event and what was found so far.
#[derive(Debug, Default)]
struct Targets {
    ids: VecDeque<Uuid>,
    active: usize,
    inactive: Option<WorkflowStatus>,
}

/// Progress of one `process_event` drain.
enum EventRun {
    Resolve,
    Next {
        targets: Targets,
    },
    Dispatch {
        targets: Targets,
        workflow: Box<Workflow>,
        dispatches: VecDeque<Dispatch>,
    },
    Done,
}

pub struct WorkflowManager {
    store: Arc<dyn Store>,
    registry: Arc<WorkflowRegistry>,
    router: Arc<ActivityRouter>,
    config: EngineConfig,
    transaction: Mutex<Transaction>,
}

impl WorkflowManager {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        Self::with_parts(
            store,
            Arc::new(WorkflowRegistry::new()),
            Arc::new(ActivityRouter::new()),
            config,
        )
    }

    /// Build a manager around an existing registry and router, e.g. to share
    /// registrations between managers backed by different stores.
    pub fn with_parts(
        store: Arc<dyn Store>,
        registry: Arc<WorkflowRegistry>,
        router: Arc<ActivityRouter>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            router,
            config,
            transaction: Mutex::new(Transaction::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<ActivityRouter> {
        &self.router
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a definition and connect its event bindings. Registering a key
    /// again replaces the earlier definition and its bindings; the replaced
    /// definition is returned.
    pub fn register(&self, definition: WorkflowDefinition) -> Result<Option<Arc<WorkflowDefinition>>> {
        let definition = Arc::new(definition);
        let key = definition.key().to_string();

        let previous = self.registry.register(definition.clone())?;
        if let Some(previous) = &previous {
            let removed = self.router.disconnect_workflow(&key)?;
            warn!(
                "Workflow definition '{}' rev {} replaced by rev {} ({} binding(s) dropped)",
                key,
                previous.revision(),
                definition.revision(),
                removed
            );
        }

        let bindings = definition.router_bindings();
        let count = bindings.len();
        for binding in bindings {
            self.router.connect(binding)?;
        }

        info!(
            "Registered workflow definition '{}' rev {} with {} event binding(s)",
            key,
            definition.revision(),
            count
        );
        Ok(previous)
    }

    pub fn definition(&self, key: &str) -> Result<Arc<WorkflowDefinition>> {
        self.registry.get(key)
    }

    /// New instance of definition `key` in status `NEW`. Nothing is persisted
    /// until the instance's mutations are committed.
    pub fn create_workflow(
        &self,
        key: &str,
        resource_name: &str,
        resource_id: Uuid,
        params: Value,
    ) -> Result<Workflow> {
        let definition = self.registry.get(key)?;
        let params = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::Execution(format!(
                    "Workflow params must be a JSON object, got {}",
                    other
                )))
            }
        };

        let workflow = Workflow::create(
            definition,
            ResourceRef {
                name: resource_name.to_string(),
                id: resource_id,
            },
            params,
        );
        WORKFLOWS_CREATED_TOTAL.inc();
        info!(
            "Created workflow {} ('{}') for {}/{}",
            workflow.id(),
            key,
            resource_name,
            resource_id
        );
        Ok(workflow)
    }

    /// Rebuild a persisted instance with the definition registered under its key.
    pub async fn load_workflow(&self, id: Uuid) -> Result<Workflow> {
        let aggregate = self
            .store
            .fetch_aggregate(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Workflow {} not found", id)))?;

        let definition = self.registry.get(&aggregate.workflow.workflow_key)?;
        if definition.revision() != aggregate.workflow.revision {
            warn!(
                "Workflow {} was created with rev {} of '{}', loading with rev {}",
                id,
                aggregate.workflow.revision,
                definition.key(),
                definition.revision()
            );
        }
        Workflow::from_aggregate(definition, aggregate)
    }

    /// Like [`WorkflowManager::load_workflow`], but the instance must belong to definition `key`.
    pub async fn load_workflow_by_id(&self, key: &str, id: Uuid) -> Result<Workflow> {
        let workflow = self.load_workflow(id).await?;
        if workflow.key() != key {
            return Err(Error::Execution(format!(
                "Workflow {} belongs to '{}', not '{}'",
                id,
                workflow.key(),
                key
            )));
        }
        debug!("Loaded workflow {} with {} step(s)", id, workflow.step_count());
        Ok(workflow)
    }

    pub async fn begin(&self) -> Result<()> {
        let mut tx = self.transaction.lock().await;
        if tx.open {
            return Err(Error::Execution("A transaction is already open".into()));
        }
        tx.open = true;
        debug!("Transaction opened");
        Ok(())
    }

    pub async fn in_transaction(&self) -> bool {
        self.transaction.lock().await.open
    }

    /// Move the instance's pending mutations into the transaction buffer,
    /// opening a transaction if none is open. Returns the buffer size.
    pub async fn stage(&self, workflow: &mut Workflow) -> Result<usize> {
        let mut tx = self.transaction.lock().await;
        Self::stage_into(&mut tx, workflow, self.config.max_mutations)?;
        Ok(tx.staged.len())
    }

    /// Commit the instance's pending mutations. Inside an open transaction
    /// they are only staged and reach the store with `commit()`; otherwise
    /// they are written right away. Returns the number of mutations written.
    pub async fn commit_workflow(&self, workflow: &mut Workflow) -> Result<usize> {
        self.commit_workflows(std::slice::from_mut(workflow)).await
    }

    /// Like [`WorkflowManager::commit_workflow`] for several snapshots that
    /// must land together. Without an open transaction they are written in
    /// one batch, or not at all.
    pub async fn commit_workflows(&self, workflows: &mut [Workflow]) -> Result<usize> {
        let mut tx = self.transaction.lock().await;
        let max_mutations = self.config.max_mutations;

        if tx.open {
            for workflow in workflows.iter_mut() {
                Self::stage_into(&mut tx, workflow, max_mutations)?;
            }
            return Ok(0);
        }

        for workflow in workflows.iter_mut() {
            if let Err(e) = Self::stage_into(&mut tx, workflow, max_mutations) {
                tx.staged.clear();
                tx.open = false;
                return Err(e);
            }
        }
        let flushed = self.flush(&mut tx).await?;
        tx.open = false;
        Ok(flushed)
    }

    /// Flush the buffer and close the transaction. Returns the number of mutations written.
    pub async fn commit(&self) -> Result<usize> {
        let mut tx = self.transaction.lock().await;
        let flushed = self.flush(&mut tx).await?;
        tx.open = false;
        debug!("Transaction committed");
        Ok(flushed)
    }

    /// Discard the buffer and close the transaction. Returns the number of mutations dropped.
    pub async fn rollback(&self) -> usize {
        let mut tx = self.transaction.lock().await;
        let dropped = tx.staged.len();
        tx.staged.clear();
        tx.open = false;
        if dropped > 0 {
            warn!("Transaction rolled back, {} mutation(s) discarded", dropped);
        }
        dropped
    }

    fn stage_into(tx: &mut Transaction, workflow: &mut Workflow, max_mutations: usize) -> Result<()> {
        let incoming = workflow.pending_mutations().len();
        if tx.staged.len() + incoming > max_mutations {
            return Err(Error::Execution(format!(
                "Transaction would hold {} mutations, limit is {}",
                tx.staged.len() + incoming,
                max_mutations
            )));
        }
        tx.open = true;
        tx.staged.extend(workflow.take_mutations());
        Ok(())
    }

    async fn flush(&self, tx: &mut Transaction) -> Result<usize> {
        let batch = std::mem::take(&mut tx.staged);
        let count = batch.len();
        if count == 0 {
            return Ok(0);
        }

        match self.store.apply(batch).await {
            Ok(()) => {
                COMMITS_TOTAL.inc();
                debug!("Flushed {} mutation(s) to the store", count);
                Ok(count)
            }
            Err(e) => {
                COMMIT_FAILURES_TOTAL.inc();
                tx.open = false;
                error!("Store rejected {} mutation(s), transaction rolled back: {}", count, e);
                Err(e)
            }
        }
    }

    /// Deliver an event to every persisted instance of the payload's resource.
    ///
    /// The stream yields one snapshot per handler invocation that changed an
    /// instance, carrying the mutations produced by that invocation. Instances
    /// that are no longer active are skipped; when no resolved instance is
    /// active the stream yields an execution error. It stops at the first
    /// error, and callers roll back the enclosing transaction.
    pub fn process_event(
        &self,
        event_type: &str,
        payload: EventPayload,
    ) -> BoxStream<'_, Result<Workflow>> {
        let event = Event::new(event_type, payload);

        stream::unfold(
            (self, event, EventRun::Resolve),
            |(manager, event, mut run)| async move {
                loop {
                    run = match run {
                        EventRun::Done => return None,
                        EventRun::Resolve => match manager.resolve_targets(&event).await {
                            Ok(ids) => EventRun::Next {
                                targets: Targets {
                                    ids,
                                    ..Targets::default()
                                },
                            },
                            Err(e) => return Some((Err(e), (manager, event, EventRun::Done))),
                        },
                        EventRun::Next { mut targets } => match targets.ids.pop_front() {
                            None => match targets.inactive {
                                Some(status) if targets.active == 0 => {
                                    let err = Self::not_accepting(status);
                                    return Some((Err(err), (manager, event, EventRun::Done)));
                                }
                                _ => EventRun::Done,
                            },
                            Some(id) => match manager.prepare(id, &event, &mut targets).await {
                                Ok(Some((workflow, dispatches))) => {
                                    targets.active += 1;
                                    EventRun::Dispatch {
                                        targets,
                                        workflow: Box::new(workflow),
                                        dispatches,
                                    }
                                }
                                Ok(None) => EventRun::Next { targets },
                                Err(e) => return Some((Err(e), (manager, event, EventRun::Done))),
                            },
                        },
                        EventRun::Dispatch {
                            targets,
                            mut workflow,
                            mut dispatches,
                        } => match dispatches.pop_front() {
                            None => EventRun::Next { targets },
                            Some(dispatch) => {
                                match manager.run_dispatch(&mut workflow, &event, dispatch).await {
                                    Ok(true) => {
                                        let snapshot = workflow.split_snapshot();
                                        let next = EventRun::Dispatch {
                                            targets,
                                            workflow,
                                            dispatches,
                                        };
                                        return Some((Ok(snapshot), (manager, event, next)));
                                    }
                                    Ok(false) => EventRun::Dispatch {
                                        targets,
                                        workflow,
                                        dispatches,
                                    },
                                    Err(e) => {
                                        return Some((Err(e), (manager, event, EventRun::Done)))
                                    }
                                }
                            }
                        },
                    }
                }
            },
        )
        .boxed()
    }

    /// Deliver an event to an instance the caller already holds. Returns one
    /// snapshot per handler invocation that changed it; `workflow` ends up
    /// with the final state and no pending mutations.
    pub async fn inject_event(
        &self,
        workflow: &mut Workflow,
        event_type: &str,
        payload: EventPayload,
    ) -> Result<Vec<Workflow>> {
        Self::require_accepting(workflow)?;
        let event = Event::new(event_type, payload);
        let dispatches = self.router.dispatch(workflow.state(), &event)?;
        EVENTS_PROCESSED_TOTAL.inc();

        let mut snapshots = Vec::new();
        for dispatch in dispatches {
            if self.run_dispatch(workflow, &event, dispatch).await? {
                snapshots.push(workflow.split_snapshot());
            }
        }
        Ok(snapshots)
    }

    fn require_accepting(workflow: &Workflow) -> Result<()> {
        if workflow.status().is_active() {
            Ok(())
        } else {
            Err(Self::not_accepting(workflow.status()))
        }
    }

    fn not_accepting(status: WorkflowStatus) -> Error {
        Error::Execution(format!(
            "Cannot inject event into workflow in status {}",
            status
        ))
    }

    async fn resolve_targets(&self, event: &Event) -> Result<VecDeque<Uuid>> {
        let payload = &event.payload;
        let records = self
            .store
            .find_workflows_by_resource(&payload.resource_name, payload.resource_id)
            .await?;

        if records.is_empty() {
            warn!(
                "No workflow found for event '{}' on {}/{}",
                event.event_type, payload.resource_name, payload.resource_id
            );
        }
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    /// Load a resolved instance and its dispatches. `None` for an instance
    /// that no longer accepts events; it is remembered in `targets`.
    async fn prepare(
        &self,
        id: Uuid,
        event: &Event,
        targets: &mut Targets,
    ) -> Result<Option<(Workflow, VecDeque<Dispatch>)>> {
        let workflow = self.load_workflow(id).await?;
        if !workflow.status().is_active() {
            debug!(
                "Skipping workflow {} in status {} for event '{}'",
                id,
                workflow.status(),
                event.event_type
            );
            targets.inactive = Some(workflow.status());
            return Ok(None);
        }

        let dispatches = self.router.dispatch(workflow.state(), event)?;
        EVENTS_PROCESSED_TOTAL.inc();
        Ok(Some((workflow, dispatches.into())))
    }

    /// Run one handler invocation against a working copy and adopt the copy
    /// only when the handler's stream was drained without error.
    async fn run_dispatch(
        &self,
        workflow: &mut Workflow,
        event: &Event,
        dispatch: Dispatch,
    ) -> Result<bool> {
        if !workflow.status().is_active() {
            debug!(
                "Workflow {} left status ACTIVE, skipping {:?}",
                workflow.id(),
                dispatch.binding.owner
            );
            return Ok(false);
        }

        let step = match dispatch.step_id {
            Some(id) => match workflow.step(id) {
                Some(step) if !step.is_finished() => Some(step.clone()),
                _ => return Ok(false),
            },
            None => None,
        };

        let ctx = HandlerContext {
            event: event.clone(),
            workflow: workflow.state().clone(),
            step,
        };

        let mut draft = workflow.clone();
        let mut mutated = false;
        let mut activities = dispatch.binding.handler.invoke(ctx);
        while let Some(activity) = activities.next().await {
            let activity = activity.map_err(|e| {
                error!(
                    "Handler for '{}' on workflow {} failed: {}",
                    event.event_type,
                    workflow.id(),
                    e
                );
                e
            })?;
            mutated |= draft.apply_activity(activity, dispatch.step_id)?;
        }

        if mutated {
            *workflow = draft;
        }
        Ok(mutated)
    }
}
