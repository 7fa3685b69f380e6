use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, SqliteConnection,
};
use std::str::FromStr;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    store::{
        AggregateRecord, Mutation, ParticipantRecord, StepRecord, Store, TriggerRecord,
        WorkflowRecord,
    },
    Error, Result,
};

const WORKFLOW_COLUMNS: &str = r#"
    id, workflow_key, revision, title, description, resource_name, resource_id,
    params, memory, custom_roles, label, status,
    created_at, updated_at, started_at, finished_at
"#;

const STEP_COLUMNS: &str = r#"
    id, workflow_id, step_key, stage_key, title, label, status,
    selector, params, seq, created_at, updated_at
"#;

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 5).await
    }

    /// Open (creating if missing) the database at `database_url`. `:memory:`
    /// opens a private in-memory database held by a single connection.
    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting to SQLite database: {}", database_url);

        let in_memory = matches!(database_url, ":memory:" | "sqlite::memory:");
        let connected = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await
        } else {
            if let Some(parent) = std::path::Path::new(database_url.trim_start_matches("sqlite://"))
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options)
                .await
        };
        let pool = connected.map_err(|e| {
            error!("Failed to connect to SQLite: {}", e);
            Error::Sqlx(e)
        })?;

        Ok(Self { pool })
    }
}

fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    Ok(row.get::<String, _>(column).parse()?)
}

fn parse_optional_uuid(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    Ok(row
        .get::<Option<String>, _>(column)
        .map(|s| s.parse())
        .transpose()?)
}

fn parse_status<S>(row: &SqliteRow, column: &str) -> Result<S>
where
    S: FromStr<Err = Error>,
{
    row.get::<String, _>(column)
        .parse()
        .map_err(|e| Error::Store(format!("Corrupt '{}' column: {}", column, e)))
}

fn parse_json(row: &SqliteRow, column: &str) -> Result<JsonValue> {
    Ok(serde_json::from_str(row.get::<&str, _>(column))?)
}

fn workflow_from_row(r: &SqliteRow) -> Result<WorkflowRecord> {
    let revision: i64 = r.get("revision");
    Ok(WorkflowRecord {
        id: parse_uuid(r, "id")?,
        workflow_key: r.get("workflow_key"),
        revision: u32::try_from(revision)
            .map_err(|_| Error::Store(format!("Invalid workflow revision: {}", revision)))?,
        title: r.get("title"),
        description: r.get("description"),
        resource_name: r.get("resource_name"),
        resource_id: parse_uuid(r, "resource_id")?,
        params: parse_json(r, "params")?,
        memory: parse_json(r, "memory")?,
        custom_roles: serde_json::from_str(r.get::<&str, _>("custom_roles"))?,
        label: r.get("label"),
        status: parse_status(r, "status")?,
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
        updated_at: r.get::<DateTime<Utc>, _>("updated_at"),
        started_at: r.get::<Option<DateTime<Utc>>, _>("started_at"),
        finished_at: r.get::<Option<DateTime<Utc>>, _>("finished_at"),
    })
}

fn step_from_row(r: &SqliteRow) -> Result<StepRecord> {
    Ok(StepRecord {
        id: parse_uuid(r, "id")?,
        workflow_id: parse_uuid(r, "workflow_id")?,
        step_key: r.get("step_key"),
        stage_key: r.get("stage_key"),
        title: r.get("title"),
        label: r.get("label"),
        status: parse_status(r, "status")?,
        selector: parse_optional_uuid(r, "selector")?,
        params: parse_json(r, "params")?,
        seq: r.get("seq"),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
        updated_at: r.get::<DateTime<Utc>, _>("updated_at"),
    })
}

fn participant_from_row(r: &SqliteRow) -> Result<ParticipantRecord> {
    Ok(ParticipantRecord {
        id: parse_uuid(r, "id")?,
        workflow_id: parse_uuid(r, "workflow_id")?,
        user_id: parse_uuid(r, "user_id")?,
        role: r.get("role"),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
    })
}

fn trigger_from_row(r: &SqliteRow) -> Result<TriggerRecord> {
    Ok(TriggerRecord {
        id: parse_uuid(r, "id")?,
        workflow_id: parse_uuid(r, "workflow_id")?,
        trigger_type: r.get("trigger_type"),
        payload: parse_json(r, "payload")?,
        target_id: parse_optional_uuid(r, "target_id")?,
        delay_seconds: r.get("delay_seconds"),
        due_at: r.get::<DateTime<Utc>, _>("due_at"),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
    })
}

async fn apply_one(conn: &mut SqliteConnection, mutation: Mutation) -> Result<()> {
    match mutation {
        Mutation::CreateWorkflow(w) => {
            sqlx::query(
                r#"
                INSERT INTO workflows (
                    id, workflow_key, revision, title, description, resource_name, resource_id,
                    params, memory, custom_roles, label, status,
                    created_at, updated_at, started_at, finished_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                "#,
            )
            .bind(w.id.to_string())
            .bind(&w.workflow_key)
            .bind(w.revision as i64)
            .bind(&w.title)
            .bind(&w.description)
            .bind(&w.resource_name)
            .bind(w.resource_id.to_string())
            .bind(serde_json::to_string(&w.params)?)
            .bind(serde_json::to_string(&w.memory)?)
            .bind(serde_json::to_string(&w.custom_roles)?)
            .bind(&w.label)
            .bind(w.status.to_string())
            .bind(w.created_at)
            .bind(w.updated_at)
            .bind(w.started_at)
            .bind(w.finished_at)
            .execute(&mut *conn)
            .await?;
        }
        Mutation::UpdateWorkflow { id, changes } => {
            let result = sqlx::query(
                r#"
                UPDATE workflows SET
                    title = ?1, description = ?2, memory = ?3, custom_roles = ?4,
                    label = ?5, status = ?6, updated_at = ?7, started_at = ?8, finished_at = ?9
                WHERE id = ?10
                "#,
            )
            .bind(&changes.title)
            .bind(&changes.description)
            .bind(serde_json::to_string(&changes.memory)?)
            .bind(serde_json::to_string(&changes.custom_roles)?)
            .bind(&changes.label)
            .bind(changes.status.to_string())
            .bind(changes.updated_at)
            .bind(changes.started_at)
            .bind(changes.finished_at)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
            if result.rows_affected() == 0 {
                return Err(Error::Store(format!("Workflow {} does not exist", id)));
            }
        }
        Mutation::CreateStep(s) => {
            sqlx::query(
                r#"
                INSERT INTO workflow_steps (
                    id, workflow_id, step_key, stage_key, title, label, status,
                    selector, params, seq, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .bind(s.id.to_string())
            .bind(s.workflow_id.to_string())
            .bind(&s.step_key)
            .bind(&s.stage_key)
            .bind(&s.title)
            .bind(&s.label)
            .bind(s.status.to_string())
            .bind(s.selector.map(|id| id.to_string()))
            .bind(serde_json::to_string(&s.params)?)
            .bind(s.seq)
            .bind(s.created_at)
            .bind(s.updated_at)
            .execute(&mut *conn)
            .await?;
        }
        Mutation::UpdateStep { id, changes } => {
            let result = sqlx::query(
                "UPDATE workflow_steps SET label = ?1, status = ?2, params = ?3, updated_at = ?4 WHERE id = ?5",
            )
            .bind(&changes.label)
            .bind(changes.status.to_string())
            .bind(serde_json::to_string(&changes.params)?)
            .bind(changes.updated_at)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
            if result.rows_affected() == 0 {
                return Err(Error::Store(format!("Step {} does not exist", id)));
            }
        }
        Mutation::AddParticipant(p) => {
            sqlx::query(
                r#"
                INSERT INTO workflow_participants (id, workflow_id, user_id, role, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(p.id.to_string())
            .bind(p.workflow_id.to_string())
            .bind(p.user_id.to_string())
            .bind(&p.role)
            .bind(p.created_at)
            .execute(&mut *conn)
            .await?;
        }
        Mutation::RemoveParticipant { workflow_id, user_id } => {
            sqlx::query("DELETE FROM workflow_participants WHERE workflow_id = ?1 AND user_id = ?2")
                .bind(workflow_id.to_string())
                .bind(user_id.to_string())
                .execute(&mut *conn)
                .await?;
        }
        Mutation::CreateTrigger(t) => {
            sqlx::query(
                r#"
                INSERT INTO workflow_triggers (
                    id, workflow_id, trigger_type, payload, target_id, delay_seconds, due_at, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(t.id.to_string())
            .bind(t.workflow_id.to_string())
            .bind(&t.trigger_type)
            .bind(serde_json::to_string(&t.payload)?)
            .bind(t.target_id.map(|id| id.to_string()))
            .bind(t.delay_seconds)
            .bind(t.due_at)
            .bind(t.created_at)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn init(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                Error::Migrate(e)
            })?;

        Ok(())
    }

    async fn fetch_aggregate(&self, id: Uuid) -> Result<Option<AggregateRecord>> {
        debug!("Fetching workflow aggregate: {}", id);

        let workflow = match self.get_workflow(id).await? {
            Some(workflow) => workflow,
            None => return Ok(None),
        };
        let steps = self.list_workflow_steps(id).await?;
        let participants = self.list_participants(id).await?;

        Ok(Some(AggregateRecord {
            workflow,
            steps,
            participants,
        }))
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<WorkflowRecord>> {
        debug!("Getting workflow: {}", id);

        let row = sqlx::query(&format!("SELECT {} FROM workflows WHERE id = ?1", WORKFLOW_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(workflow_from_row).transpose()
    }

    async fn find_workflows_by_resource(
        &self,
        resource_name: &str,
        resource_id: Uuid,
    ) -> Result<Vec<WorkflowRecord>> {
        debug!("Finding workflows for resource {}/{}", resource_name, resource_id);

        let rows = sqlx::query(&format!(
            "SELECT {} FROM workflows WHERE resource_name = ?1 AND resource_id = ?2 ORDER BY created_at",
            WORKFLOW_COLUMNS
        ))
        .bind(resource_name)
        .bind(resource_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(workflow_from_row).collect()
    }

    async fn list_workflows(&self, limit: i64, offset: i64) -> Result<Vec<WorkflowRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM workflows ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            WORKFLOW_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(workflow_from_row).collect()
    }

    async fn list_workflow_steps(&self, workflow_id: Uuid) -> Result<Vec<StepRecord>> {
        debug!("Listing workflow steps for workflow: {}", workflow_id);

        let rows = sqlx::query(&format!(
            "SELECT {} FROM workflow_steps WHERE workflow_id = ?1 ORDER BY seq",
            STEP_COLUMNS
        ))
        .bind(workflow_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(step_from_row).collect()
    }

    async fn list_participants(&self, workflow_id: Uuid) -> Result<Vec<ParticipantRecord>> {
        let rows = sqlx::query(
            "SELECT id, workflow_id, user_id, role, created_at FROM workflow_participants WHERE workflow_id = ?1 ORDER BY created_at",
        )
        .bind(workflow_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(participant_from_row).collect()
    }

    async fn list_triggers(&self, workflow_id: Uuid) -> Result<Vec<TriggerRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, workflow_id, trigger_type, payload, target_id, delay_seconds, due_at, created_at
            FROM workflow_triggers
            WHERE workflow_id = ?1
            ORDER BY due_at
            "#,
        )
        .bind(workflow_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trigger_from_row).collect()
    }

    async fn apply(&self, batch: Vec<Mutation>) -> Result<()> {
        debug!("Applying batch of {} mutation(s)", batch.len());

        let mut tx = self.pool.begin().await?;
        for mutation in batch {
            let kind = mutation.kind();
            if let Err(e) = apply_one(&mut *tx, mutation).await {
                error!("Mutation {} failed, rolling back: {}", kind, e);
                tx.rollback().await?;
                return Err(e);
            }
        }
        tx.commit().await?;

        Ok(())
    }
}
