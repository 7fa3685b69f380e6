mod config;
mod conversions;
mod factory;
mod memory;
mod models;
mod sqlite;

pub use config::{DatabaseConfig, DatabaseType};
pub use factory::create_store;
pub use memory::MemoryStore;
pub use models::*;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use uuid::Uuid;

/// Aggregate store backing workflow instances.
///
/// Reads return records; writes go through [`Store::apply`], which must apply
/// a whole batch or nothing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    // Initialize database schema
    async fn init(&self) -> crate::Result<()>;

    // Aggregate reads
    async fn fetch_aggregate(&self, id: Uuid) -> crate::Result<Option<AggregateRecord>>;
    async fn get_workflow(&self, id: Uuid) -> crate::Result<Option<WorkflowRecord>>;
    async fn find_workflows_by_resource(
        &self,
        resource_name: &str,
        resource_id: Uuid,
    ) -> crate::Result<Vec<WorkflowRecord>>;
    async fn list_workflows(&self, limit: i64, offset: i64) -> crate::Result<Vec<WorkflowRecord>>;

    // Child records
    async fn list_workflow_steps(&self, workflow_id: Uuid) -> crate::Result<Vec<StepRecord>>;
    async fn list_participants(&self, workflow_id: Uuid) -> crate::Result<Vec<ParticipantRecord>>;
    async fn list_triggers(&self, workflow_id: Uuid) -> crate::Result<Vec<TriggerRecord>>;

    // Atomic write of a staged batch
    async fn apply(&self, batch: Vec<Mutation>) -> crate::Result<()>;
}
