//! Event routing table.
//!
//! Maps an event name to the ordered list of handler bindings declared on
//! workflow and step definitions. Populated when definitions are registered
//! and read on every dispatch.

use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::{
    workflow::{context::Event, Activity, HandlerContext, WorkflowState},
    Error, Result,
};

/// Lazy sequence of effects produced by one handler invocation.
pub type ActivityStream = BoxStream<'static, Result<Activity>>;

#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(HandlerContext) -> ActivityStream + Send + Sync>);

impl Handler {
    /// Wrap a handler that produces its own stream, e.g. one that awaits I/O between yields.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(HandlerContext) -> ActivityStream + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wrap a synchronous handler; the returned activities are yielded in order.
    pub fn from_fn<F, I>(f: F) -> Self
    where
        F: Fn(&HandlerContext) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Activity>,
        I::IntoIter: Send + 'static,
    {
        Self::new(move |ctx| stream::iter(f(&ctx).into_iter().map(Ok)).boxed())
    }

    /// Like [`Handler::from_fn`] but the handler may fail before yielding anything.
    pub fn try_from_fn<F, I>(f: F) -> Self
    where
        F: Fn(&HandlerContext) -> Result<I> + Send + Sync + 'static,
        I: IntoIterator<Item = Activity>,
        I::IntoIter: Send + 'static,
    {
        Self::new(move |ctx| match f(&ctx) {
            Ok(items) => stream::iter(items.into_iter().map(Ok)).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        })
    }

    pub fn invoke(&self, ctx: HandlerContext) -> ActivityStream {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// The definition a binding was declared on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingOwner {
    Workflow { workflow_key: String },
    Step { workflow_key: String, step_key: String },
}

impl BindingOwner {
    pub fn workflow_key(&self) -> &str {
        match self {
            BindingOwner::Workflow { workflow_key } => workflow_key,
            BindingOwner::Step { workflow_key, .. } => workflow_key,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub event: String,
    pub owner: BindingOwner,
    pub handler: Handler,
}

/// One handler invocation resolved for a concrete workflow instance.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub binding: Binding,
    /// The step instance a step-scoped binding runs for.
    pub step_id: Option<Uuid>,
}

#[derive(Debug, Default)]
pub struct ActivityRouter {
    table: RwLock<HashMap<String, Vec<Binding>>>,
}

impl ActivityRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, binding: Binding) -> Result<()> {
        debug!("Connecting {:?} to event '{}'", binding.owner, binding.event);
        let mut table = self
            .table
            .write()
            .map_err(|e| Error::Internal(format!("routing table lock poisoned: {}", e)))?;
        table.entry(binding.event.clone()).or_default().push(binding);
        Ok(())
    }

    /// Drop every binding owned by a workflow definition or its steps. Returns how many were removed.
    pub fn disconnect_workflow(&self, workflow_key: &str) -> Result<usize> {
        let mut table = self
            .table
            .write()
            .map_err(|e| Error::Internal(format!("routing table lock poisoned: {}", e)))?;
        let mut removed = 0;
        for bindings in table.values_mut() {
            let before = bindings.len();
            bindings.retain(|b| b.owner.workflow_key() != workflow_key);
            removed += before - bindings.len();
        }
        table.retain(|_, bindings| !bindings.is_empty());
        Ok(removed)
    }

    pub fn routes(&self, event: &str) -> Result<Vec<Binding>> {
        let table = self
            .table
            .read()
            .map_err(|e| Error::Internal(format!("routing table lock poisoned: {}", e)))?;
        Ok(table.get(event).cloned().unwrap_or_default())
    }

    pub fn contains(&self, event: &str) -> bool {
        self.table
            .read()
            .map(|table| table.contains_key(event))
            .unwrap_or(false)
    }

    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .table
            .read()
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Resolve the handler invocations an event causes on one workflow instance,
    /// in registration order. Step-scoped bindings run once per unfinished
    /// step instance of their step that the payload addresses.
    pub fn dispatch(&self, workflow: &WorkflowState, event: &Event) -> Result<Vec<Dispatch>> {
        let mut dispatches = Vec::new();

        for binding in self.routes(&event.event_type)? {
            match &binding.owner {
                BindingOwner::Workflow { workflow_key } => {
                    if *workflow_key == workflow.key {
                        dispatches.push(Dispatch {
                            binding: binding.clone(),
                            step_id: None,
                        });
                    }
                }
                BindingOwner::Step { workflow_key, step_key } => {
                    if *workflow_key != workflow.key {
                        continue;
                    }
                    for step in workflow.steps_of(step_key) {
                        if !step.is_finished() && event.payload.addresses(step) {
                            dispatches.push(Dispatch {
                                binding: binding.clone(),
                                step_id: Some(step.id),
                            });
                        }
                    }
                }
            }
        }

        debug!(
            "Event '{}' resolved to {} handler invocation(s) on workflow {}",
            event.event_type,
            dispatches.len(),
            workflow.id
        );
        Ok(dispatches)
    }
}
