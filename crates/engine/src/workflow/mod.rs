pub mod activity;
pub mod context;
pub mod instance;
pub mod machine;
pub mod manager;
pub mod registry;
pub mod state;

pub use activity::Activity;
pub use context::{Event, EventPayload, HandlerContext};
pub use instance::Workflow;
pub use machine::{validate_labels, StateChange, StateMachine, Transition, ALL_STATES};
pub use manager::WorkflowManager;
pub use registry::WorkflowRegistry;
pub use state::{Participant, ResourceRef, StepState, WorkflowState};
