use std::sync::Arc;

use anyhow::{Context, Result, bail};
use jobhook_api::{JobsClient, job_id_from_env};
use jobhook_engine::{Orchestrator, OrchestratorSettings, PlatformJobTrigger, WorkflowRegistry};
use jobhook_server::{FrontDoorServer, init_tracing, load_config};
use jobhook_util::{JsonPromiseStore, JsonRunStore};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = load_config().context("failed to load server configuration")?;
    let registry = WorkflowRegistry::with_defaults();
    if !registry.contains(&config.workflow) {
        bail!(
            "workflow '{}' is not registered (known: {})",
            config.workflow,
            registry.names().collect::<Vec<_>>().join(", ")
        );
    }

    let job_id = match config.job_id {
        Some(job_id) => job_id,
        None => job_id_from_env()?,
    };
    let promises = JsonPromiseStore::open(config.promises_path())
        .with_context(|| format!("failed to open {}", config.promises_path().display()))?;
    let runs = JsonRunStore::open(config.runs_path())
        .with_context(|| format!("failed to open {}", config.runs_path().display()))?;
    let client = JobsClient::new_from_env()?;

    let orchestrator = Orchestrator::new(
        registry,
        Arc::new(promises),
        Arc::new(runs),
        Arc::new(PlatformJobTrigger::new(client)),
        OrchestratorSettings::new(job_id).with_await_timeout(config.await_timeout()),
    );
    let recovered = orchestrator.recover()?;
    info!(recovered, state_dir = %config.state_dir.display(), job_id, "workflow runs recovered");

    let server = FrontDoorServer::new(config.bind_socket_address()?, orchestrator, config.workflow.clone())
        .start()
        .await?;
    info!(address = %server.bound_address(), "jobhook server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for the shutdown signal")?;
    info!("shutting down");
    server.stop().await
}
