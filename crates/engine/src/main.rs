use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use stagehand::{
    config::Config,
    domain::{WorkflowQueryManager, WorkflowScope},
    metrics,
    samples::{sample_process, SAMPLE_PROCESS},
    store::create_store,
    workflow::EventPayload,
    WorkflowManager,
};

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Declarative workflow engine with guarded step state machines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// List persisted workflow instances
    List {
        #[arg(long, default_value = "20")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
    },
    /// Print one workflow instance with its steps, participants and stages
    Show {
        id: Uuid,
    },
    /// Print the registered workflow definitions
    Definitions,
    /// Run the sample process: start it and deliver two events
    Demo,
    /// Print engine counters in Prometheus text format
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    metrics::register_metrics()?;

    let store = create_store(&config.database).await?;
    store.init().await?;

    let manager = Arc::new(WorkflowManager::new(store, config.engine.clone()));
    manager.register(sample_process()?)?;

    match cli.command {
        Commands::Init => {
            info!("Schema ready for {:?} store", config.database.db_type);
        }
        Commands::List { limit, offset } => {
            let queries = WorkflowQueryManager::new(&manager);
            for wf in queries.list_workflows(limit, offset).await? {
                println!(
                    "{}  {:<20} {:<10} {:<12} {}",
                    wf.id,
                    wf.workflow_key,
                    wf.status.as_str(),
                    wf.label.as_deref().unwrap_or("-"),
                    wf.title
                );
            }
        }
        Commands::Show { id } => {
            let queries = WorkflowQueryManager::new(&manager);
            let view = queries.full(&WorkflowScope { workflow_id: id }).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::Definitions => {
            for key in manager.registry().keys() {
                let definition = manager.definition(&key)?;
                println!(
                    "{} (rev {}): {} step(s), states {:?}",
                    key,
                    definition.revision(),
                    definition.steps().count(),
                    definition.machine().states()
                );
            }
        }
        Commands::Demo => run_demo(&manager).await?,
        Commands::Metrics => print!("{}", metrics::gather_metrics()?),
    }

    Ok(())
}

async fn drain_event(manager: &WorkflowManager, round: usize, payload: EventPayload) -> Result<()> {
    let mut snapshots = manager.process_event("test-event", payload);
    while let Some(mut snapshot) = snapshots.try_next().await? {
        info!("Round {}: workflow {} now has {} step(s)", round, snapshot.id(), snapshot.step_count());
        manager.commit_workflow(&mut snapshot).await?;
    }
    Ok(())
}

async fn run_demo(manager: &WorkflowManager) -> Result<()> {
    let resource_id = Uuid::new_v4();
    let selector = Uuid::new_v4();

    manager.begin().await?;
    let mut wf = manager.create_workflow(
        SAMPLE_PROCESS,
        "demo-resource",
        resource_id,
        json!({ "step-selector": selector.to_string() }),
    )?;
    wf.start()?;
    manager.commit_workflow(&mut wf).await?;
    manager.commit().await?;
    info!("Started {} with {} step(s)", wf.id(), wf.step_count());

    for round in 1..=2 {
        let payload = EventPayload::new("demo-resource", resource_id).with_selector(selector);
        manager.begin().await?;
        if let Err(e) = drain_event(manager, round, payload).await {
            let dropped = manager.rollback().await;
            warn!("Round {} rolled back ({} mutation(s) dropped)", round, dropped);
            return Err(e);
        }
        manager.commit().await?;
    }

    let reloaded = manager.load_workflow_by_id(SAMPLE_PROCESS, wf.id()).await?;
    for step in reloaded.steps() {
        println!("{}  {:<14} {:<10} {}", step.id, step.step_key, step.label, step.status.as_str());
    }
    Ok(())
}
