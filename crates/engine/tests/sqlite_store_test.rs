use chrono::{Duration, Utc};
use serde_json::json;
use stagehand::{
    store::{
        create_store, DatabaseConfig, Mutation, ParticipantRecord, SqliteStore, StepChanges,
        StepRecord, Store, TriggerRecord, WorkflowChanges, WorkflowRecord,
    },
    StepStatus, WorkflowStatus,
};
use std::path::PathBuf;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

async fn store() -> SqliteStore {
    let store = SqliteStore::new(":memory:").await.expect("Failed to create store");
    store.init().await.expect("Failed to initialize store");
    store
}

fn workflow(resource_id: Uuid) -> WorkflowRecord {
    let now = Utc::now();
    WorkflowRecord {
        id: Uuid::new_v4(),
        workflow_key: "sample-process".into(),
        revision: 1,
        title: "Sample Process".into(),
        description: None,
        resource_name: "test-resource".into(),
        resource_id,
        params: json!({ "test-param": "test-value" }),
        memory: json!({}),
        custom_roles: vec![],
        label: None,
        status: WorkflowStatus::New,
        created_at: now,
        updated_at: now,
        started_at: None,
        finished_at: None,
    }
}

fn step(workflow_id: Uuid, seq: i64) -> StepRecord {
    let now = Utc::now();
    StepRecord {
        id: Uuid::new_v4(),
        workflow_id,
        step_key: "task".into(),
        stage_key: "processing".into(),
        title: "Task".into(),
        label: "CREATED".into(),
        status: StepStatus::Active,
        selector: Some(Uuid::new_v4()),
        params: json!(null),
        seq,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn aggregate_round_trip() {
    let store = store().await;
    let resource = Uuid::new_v4();
    let wf = workflow(resource);
    let first = step(wf.id, 0);
    let second = step(wf.id, 1);
    let user = Uuid::new_v4();

    assert_ok!(
        store
            .apply(vec![
                Mutation::CreateWorkflow(wf.clone()),
                Mutation::CreateStep(second.clone()),
                Mutation::CreateStep(first.clone()),
                Mutation::AddParticipant(ParticipantRecord {
                    id: Uuid::new_v4(),
                    workflow_id: wf.id,
                    user_id: user,
                    role: "reviewer".into(),
                    created_at: Utc::now(),
                }),
            ])
            .await
    );

    let aggregate = store
        .fetch_aggregate(wf.id)
        .await
        .expect("fetch")
        .expect("aggregate exists");
    assert_eq!(aggregate.workflow.id, wf.id);
    assert_eq!(aggregate.workflow.params, wf.params);
    assert_eq!(aggregate.workflow.status, WorkflowStatus::New);
    assert_eq!(aggregate.steps.len(), 2);
    assert_eq!(aggregate.participants.len(), 1);
    assert_eq!(aggregate.participants[0].user_id, user);

    let ids: Vec<Uuid> = store
        .list_workflow_steps(wf.id)
        .await
        .expect("steps")
        .iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);

    let found = store
        .find_workflows_by_resource("test-resource", resource)
        .await
        .expect("find");
    assert_eq!(found.len(), 1);
    assert!(store
        .find_workflows_by_resource("other", resource)
        .await
        .expect("find")
        .is_empty());
    assert!(store.fetch_aggregate(Uuid::new_v4()).await.expect("fetch").is_none());
}

#[tokio::test]
async fn updates_and_triggers() {
    let store = store().await;
    let wf = workflow(Uuid::new_v4());
    let task = step(wf.id, 0);
    assert_ok!(
        store
            .apply(vec![
                Mutation::CreateWorkflow(wf.clone()),
                Mutation::CreateStep(task.clone()),
            ])
            .await
    );

    let now = Utc::now();
    let changes = WorkflowChanges {
        title: "Renamed".into(),
        description: Some("desc".into()),
        memory: json!({ "events-seen": 1 }),
        custom_roles: vec!["auditor".into()],
        label: Some("COMPLETED".into()),
        status: WorkflowStatus::Completed,
        updated_at: now,
        started_at: Some(now),
        finished_at: Some(now),
    };
    let step_changes = StepChanges {
        label: "COMPLETED".into(),
        status: StepStatus::Completed,
        params: json!({ "done": true }),
        updated_at: now,
    };
    let trigger = TriggerRecord {
        id: Uuid::new_v4(),
        workflow_id: wf.id,
        trigger_type: "time_based".into(),
        payload: json!({ "schedule": "daily" }),
        target_id: None,
        delay_seconds: 300,
        due_at: now + Duration::seconds(300),
        created_at: now,
    };
    assert_ok!(
        store
            .apply(vec![
                Mutation::UpdateWorkflow { id: wf.id, changes },
                Mutation::UpdateStep { id: task.id, changes: step_changes },
                Mutation::CreateTrigger(trigger.clone()),
            ])
            .await
    );

    let record = store.get_workflow(wf.id).await.expect("get").expect("exists");
    assert_eq!(record.title, "Renamed");
    assert_eq!(record.status, WorkflowStatus::Completed);
    assert_eq!(record.custom_roles, vec!["auditor".to_string()]);
    assert_eq!(record.memory["events-seen"], 1);

    let steps = store.list_workflow_steps(wf.id).await.expect("steps");
    assert_eq!(steps[0].status, StepStatus::Completed);
    assert_eq!(steps[0].params["done"], true);

    let triggers = store.list_triggers(wf.id).await.expect("triggers");
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].trigger_type, "time_based");
    assert_eq!(triggers[0].delay_seconds, 300);
}

#[tokio::test]
async fn failed_batch_is_rolled_back() {
    let store = store().await;
    let wf = workflow(Uuid::new_v4());

    let err = assert_err!(
        store
            .apply(vec![
                Mutation::CreateWorkflow(wf.clone()),
                Mutation::UpdateStep {
                    id: Uuid::new_v4(),
                    changes: StepChanges {
                        label: "CREATED".into(),
                        status: StepStatus::Active,
                        params: json!(null),
                        updated_at: Utc::now(),
                    },
                },
            ])
            .await
    );
    assert!(err.to_string().contains("does not exist"));
    assert!(store.get_workflow(wf.id).await.expect("get").is_none());
    assert!(store.list_workflows(10, 0).await.expect("list").is_empty());
}

#[tokio::test]
async fn factory_opens_file_database() {
    let dir = std::env::temp_dir().join(format!("stagehand-test-{}", Uuid::new_v4()));
    let path: PathBuf = dir.join("nested").join("workflows.db");

    let store = create_store(&DatabaseConfig::sqlite(&path))
        .await
        .expect("Failed to create store");
    store.init().await.expect("Failed to initialize store");
    assert!(path.exists());

    let wf = workflow(Uuid::new_v4());
    assert_ok!(store.apply(vec![Mutation::CreateWorkflow(wf.clone())]).await);
    let listed = store.list_workflows(5, 0).await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, wf.id);

    drop(store);
    let _ = std::fs::remove_dir_all(dir);
}
