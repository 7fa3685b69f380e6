use schemars::schema_for;
use stagehand::domain::{
    AddParticipantData, CreateWorkflowData, InjectEventData, ProcessActivityData,
    RemoveParticipantData, RoleData, SendTriggerData, StepRefData, UpdateWorkflowData,
    WorkflowCommand, COMMANDS,
};

fn main() -> anyhow::Result<()> {
    println!("// Command envelope");
    println!("{}", serde_json::to_string_pretty(&schema_for!(WorkflowCommand))?);

    let payloads = [
        ("create-workflow", schema_for!(CreateWorkflowData)),
        ("update-workflow", schema_for!(UpdateWorkflowData)),
        ("add-participant", schema_for!(AddParticipantData)),
        ("remove-participant", schema_for!(RemoveParticipantData)),
        ("process-activity", schema_for!(ProcessActivityData)),
        ("add-role / remove-role", schema_for!(RoleData)),
        ("ignore-step / cancel-step", schema_for!(StepRefData)),
        ("inject-event", schema_for!(InjectEventData)),
        ("send-trigger", schema_for!(SendTriggerData)),
    ];
    for (name, schema) in payloads {
        println!("// {}", name);
        println!("{}", serde_json::to_string_pretty(&schema)?);
    }

    println!("// Command metadata");
    println!("{}", serde_json::to_string_pretty(&COMMANDS)?);
    Ok(())
}
