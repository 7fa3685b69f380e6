use serde_json::json;
use stagehand::{
    config::EngineConfig,
    domain::{
        AddParticipantData, CreateWorkflowData, InjectEventData, ProcessActivityData,
        RemoveParticipantData, RoleData, SendTriggerData, StepRefData, UpdateWorkflowData,
        WorkflowCommand, WorkflowCommandHandler, WorkflowDomain, WorkflowQueryManager,
        WorkflowScope,
    },
    samples::{sample_process, SAMPLE_PROCESS},
    store::{MemoryStore, Store},
    workflow::{Activity, WorkflowManager},
    StepStatus, WorkflowStatus,
};
use std::sync::Arc;
use uuid::Uuid;

struct Harness {
    handler: WorkflowCommandHandler,
    queries: WorkflowQueryManager,
}

fn harness() -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let manager = Arc::new(WorkflowManager::new(store, EngineConfig::default()));
    manager
        .register(sample_process().expect("sample builds"))
        .expect("register");
    Harness {
        queries: WorkflowQueryManager::new(&manager),
        handler: WorkflowCommandHandler::new(manager),
    }
}

async fn create(h: &Harness, selector: Uuid) -> Uuid {
    let mut data = CreateWorkflowData::new("Test Workflow", SAMPLE_PROCESS, Uuid::new_v4());
    data.params = json!({ "step-selector": selector.to_string() });
    let created = h
        .handler
        .execute(None, WorkflowCommand::CreateWorkflow(data))
        .await
        .expect("create-workflow");
    assert_eq!(created["title"], "Test Workflow");
    assert_eq!(created["status"], "NEW");
    created["id"].as_str().expect("id").parse().expect("uuid")
}

#[test]
fn domain_and_queries_share_namespace() {
    let h = harness();
    let domain = WorkflowDomain::default();
    assert_eq!(domain.namespace(), h.queries.prefix());
    assert!(h.queries.tags().contains(&"workflow"));
}

#[tokio::test]
async fn command_lifecycle() {
    let h = harness();
    let selector = Uuid::new_v4();
    let id = create(&h, selector).await;
    let scope = WorkflowScope { workflow_id: id };

    h.handler
        .execute(Some(id), WorkflowCommand::StartWorkflow)
        .await
        .expect("start-workflow");
    let steps = h.queries.steps(&scope).await.expect("steps");
    assert_eq!(steps.len(), 1);

    let updated = h
        .handler
        .execute(
            Some(id),
            WorkflowCommand::UpdateWorkflow(UpdateWorkflowData {
                title: Some("Updated Title".into()),
                desc: Some("Updated description".into()),
            }),
        )
        .await
        .expect("update-workflow");
    assert_eq!(updated["title"], "Updated Title");
    assert_eq!(updated["description"], "Updated description");

    let injected = h
        .handler
        .execute(
            Some(id),
            WorkflowCommand::InjectEvent(InjectEventData {
                step_selector: Some(selector),
                priority: 1,
                ..InjectEventData::new("test-event")
            }),
        )
        .await
        .expect("inject-event");
    assert_eq!(injected["status"], "event_injected");
    assert_eq!(injected["event_type"], "test-event");
    assert_eq!(injected["workflow_id"], json!(id));
    assert_eq!(injected["applied"], 1);
    assert!(injected.get("timestamp").is_some());
    assert_eq!(h.queries.steps(&scope).await.expect("steps").len(), 3);

    let stages = h.queries.stages(&scope).await.expect("stages");
    assert_eq!(stages.len(), 2);
    assert_eq!(stages[0].key, "intake");
    assert_eq!(stages[0].step_count, 1);
    assert_eq!(stages[1].step_count, 2);

    let trigger = h
        .handler
        .execute(
            Some(id),
            WorkflowCommand::SendTrigger(SendTriggerData {
                trigger_type: "time_based".into(),
                trigger_data: json!({ "schedule": "daily" }),
                target_id: None,
                delay_seconds: 300,
            }),
        )
        .await
        .expect("send-trigger");
    assert_eq!(trigger["status"], "trigger_sent");
    assert_eq!(trigger["trigger_type"], "time_based");
    assert_eq!(trigger["delay_seconds"], 300);
    assert_eq!(h.queries.triggers(&scope).await.expect("triggers").len(), 1);

    let task = h
        .queries
        .steps(&scope)
        .await
        .expect("steps")
        .into_iter()
        .find(|s| s.step_key == "task")
        .expect("task step");
    h.handler
        .execute(Some(id), WorkflowCommand::IgnoreStep(StepRefData { step_id: task.id }))
        .await
        .expect("ignore-step");
    let view = h.queries.full(&scope).await.expect("full view");
    let ignored = view.steps.iter().find(|s| s.id == task.id).expect("ignored step");
    assert_eq!(ignored.status, StepStatus::Ignored);
    assert_eq!(view.stages[1].finished_count, 1);

    h.handler
        .execute(Some(id), WorkflowCommand::CancelWorkflow)
        .await
        .expect("cancel-workflow");
    let record = h.queries.get_workflow(id).await.expect("workflow");
    assert_eq!(record.status, WorkflowStatus::Cancelled);

    let err = h
        .handler
        .execute(Some(id), WorkflowCommand::InjectEvent(InjectEventData::new("test-event")))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Execution error: Cannot inject event into workflow in status CANCELLED"
    );

    let err = h
        .handler
        .execute(
            Some(id),
            WorkflowCommand::SendTrigger(SendTriggerData {
                trigger_type: "time_based".into(),
                trigger_data: json!(null),
                target_id: None,
                delay_seconds: 0,
            }),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Cannot send trigger to workflow in status CANCELLED"));
}

#[tokio::test]
async fn participants_and_roles() {
    let h = harness();
    let id = create(&h, Uuid::new_v4()).await;
    let scope = WorkflowScope { workflow_id: id };
    let user = Uuid::new_v4();

    h.handler
        .execute(
            Some(id),
            WorkflowCommand::AddParticipant(AddParticipantData {
                user_id: user,
                role: "reviewer".into(),
            }),
        )
        .await
        .expect("add-participant");

    let err = h
        .handler
        .execute(
            Some(id),
            WorkflowCommand::AddParticipant(AddParticipantData {
                user_id: user,
                role: "auditor".into(),
            }),
        )
        .await
        .unwrap_err();
    assert!(err.is_execution());

    h.handler
        .execute(Some(id), WorkflowCommand::AddRole(RoleData { role: "auditor".into() }))
        .await
        .expect("add-role");
    h.handler
        .execute(
            Some(id),
            WorkflowCommand::AddParticipant(AddParticipantData {
                user_id: user,
                role: "auditor".into(),
            }),
        )
        .await
        .expect("add-participant with granted role");
    assert_eq!(h.queries.participants(&scope).await.expect("participants").len(), 2);

    h.handler
        .execute(
            Some(id),
            WorkflowCommand::RemoveParticipant(RemoveParticipantData { user_id: user }),
        )
        .await
        .expect("remove-participant");
    assert!(h.queries.participants(&scope).await.expect("participants").is_empty());

    let roles = h
        .handler
        .execute(Some(id), WorkflowCommand::RemoveRole(RoleData { role: "auditor".into() }))
        .await
        .expect("remove-role");
    assert_eq!(roles["roles"], json!([]));
}

#[tokio::test]
async fn process_activity_and_abort() {
    let h = harness();
    let id = create(&h, Uuid::new_v4()).await;
    h.handler
        .execute(Some(id), WorkflowCommand::StartWorkflow)
        .await
        .expect("start-workflow");

    let response = h
        .handler
        .execute(
            Some(id),
            WorkflowCommand::ProcessActivity(ProcessActivityData {
                activity: Activity::add_step("task"),
                step_id: None,
            }),
        )
        .await
        .expect("process-activity");
    assert_eq!(response["changed"], true);

    let scope = WorkflowScope { workflow_id: id };
    let review = h
        .queries
        .steps(&scope)
        .await
        .expect("steps")
        .into_iter()
        .find(|s| s.step_key == "intake-review")
        .expect("review step");
    let cancelled = h
        .handler
        .execute(Some(id), WorkflowCommand::CancelStep(StepRefData { step_id: review.id }))
        .await
        .expect("cancel-step");
    assert_eq!(cancelled["label"], "CANCELLED");

    h.handler
        .execute(Some(id), WorkflowCommand::AbortWorkflow)
        .await
        .expect("abort-workflow");
    assert_eq!(
        h.queries.get_workflow(id).await.expect("workflow").status,
        WorkflowStatus::Aborted
    );
}

#[tokio::test]
async fn commands_need_a_known_workflow() {
    let h = harness();
    let err = h
        .handler
        .execute(None, WorkflowCommand::StartWorkflow)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("requires a workflow id"));

    let err = h
        .handler
        .execute(Some(Uuid::new_v4()), WorkflowCommand::StartWorkflow)
        .await
        .unwrap_err();
    assert!(err.is_execution());

    let err = h
        .handler
        .execute(
            None,
            WorkflowCommand::CreateWorkflow(CreateWorkflowData::new("X", "unknown", Uuid::new_v4())),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not registered"));

    assert!(h.queries.list_workflows(0, 0).await.is_err());
    assert!(h.queries.list_workflows(10, 0).await.expect("page").is_empty());
}
