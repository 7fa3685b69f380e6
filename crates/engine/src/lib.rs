pub mod config;
pub mod definition;
pub mod domain;
pub mod metrics;
pub mod router;
pub mod samples;
pub mod status;
pub mod store;
pub mod workflow;

pub use definition::{
    Role, Stage, StepBuilder, StepDefinition, Transition, WorkflowBuilder, WorkflowDefinition,
    ALL_STATES,
};
pub use router::{ActivityRouter, Binding, BindingOwner, Handler};
pub use status::{StepStatus, WorkflowStatus};
pub use workflow::{
    Activity, EventPayload, HandlerContext, StateChange, StateMachine, StepState, Workflow,
    WorkflowManager, WorkflowRegistry, WorkflowState,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Definition-time failures: the declaration was rejected and nothing was registered.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Runtime failures raised by the engine itself (bad transition, inactive workflow, unknown key or id).
    pub fn is_execution(&self) -> bool {
        matches!(self, Error::Execution(_) | Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        assert!(Error::Configuration("dup".into()).is_configuration());
        assert!(Error::Execution("bad".into()).is_execution());
        assert!(Error::NotFound("wf".into()).is_execution());
        assert!(!Error::Store("down".into()).is_execution());
        assert_eq!(
            Error::Execution("Cannot inject event into workflow in status COMPLETED".into()).to_string(),
            "Execution error: Cannot inject event into workflow in status COMPLETED"
        );
    }
}
