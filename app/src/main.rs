mod background_service;
mod config;
mod infrastructure;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use domain::model::entity::job::JobType;
use service::executor::{BasicExecutor, KubernetesExecutor};
use service::{ExecutorRegistry, Scheduler};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use self::background_service::report_status;
use self::config::{build_config, ControlConfig};
use self::infrastructure::cluster::KubeCluster;
use self::infrastructure::database::JsonDb;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = build_config().with_context(|| "Failed to build config".red())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db = Arc::new(
        JsonDb::new(&config.data_dir)
            .await
            .with_context(|| "Cannot open job database".red())?,
    );

    let shutdown = CancellationToken::new();
    let registry = Arc::new(build_registry(&config, db.clone(), shutdown.clone()).await?);

    let scheduler = Arc::new(Scheduler::with_tick(
        registry,
        db.clone(),
        Duration::from_secs(config.scheduler.tick_interval.max(1)),
    ));

    let background_services = [
        tokio::spawn({
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            async move { scheduler.run(shutdown).await }
        }),
        tokio::spawn(report_status(scheduler.clone(), shutdown.clone())),
    ];
    tracing::info!("Control plane started");

    tokio::signal::ctrl_c().await.with_context(|| "Failed to listen for ctrl-c".red())?;
    tracing::info!("Stopping services (ctrl-c handling).");
    shutdown.cancel();
    for handle in background_services {
        let _ = handle.await;
    }
    Ok(())
}

async fn build_registry(
    config: &ControlConfig,
    db: Arc<JsonDb>,
    shutdown: CancellationToken,
) -> anyhow::Result<ExecutorRegistry> {
    let mut registry = ExecutorRegistry::new();
    match config.executor.as_str() {
        "basic" => {
            let executor = Arc::new(BasicExecutor::new(db));
            registry.register(JobType::Normal, executor.clone());
            registry.register(JobType::Gpu, executor);
        }
        _ => {
            let client = kube::Client::try_default()
                .await
                .with_context(|| "Cannot connect to the cluster".red())?;
            let cluster = Arc::new(KubeCluster::new(client));
            let executor = Arc::new(KubernetesExecutor::new(cluster, db, shutdown));
            registry.register(JobType::Normal, executor.clone());
            registry.register(JobType::Gpu, executor);
        }
    }
    Ok(registry)
}
