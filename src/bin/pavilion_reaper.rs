//! Periodically sweeps orphaned preview containers.
//!
//! Usage:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/pavilion pavilion_reaper
//! ```
//!
//! Every `PAVILION_REAP_INTERVAL_SECS` the reaper removes managed engine
//! containers that no active row accounts for, and closes rows whose process
//! ended, disappeared, or never became ready. It runs until interrupted with
//! Ctrl-C. The remaining `PAVILION_*` variables configure the engine client
//! and readiness window exactly as they do for the deploying service.

use diesel::r2d2::{ConnectionManager, Pool};
use mockable::DefaultClock;
use pavilion::config::{ConfigError, OrchestratorConfig};
use pavilion::deployment::adapters::docker::{DockerCliEngine, TokioCommandRunner};
use pavilion::deployment::adapters::postgres::{
    DeploymentPgPool, PostgresContainerRepository, PostgresProjectRepository,
};
use pavilion::deployment::services::CleanupReaper;
use pavilion::telemetry::{self, LogFormat, TryInitError};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;

/// Errors that stop the reaper from starting.
#[derive(Debug, Error)]
enum ReaperError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to install tracing subscriber: {0}")]
    Telemetry(#[from] TryInitError),
    #[error("failed to build database pool: {0}")]
    Pool(#[source] diesel::r2d2::PoolError),
    #[error("runtime init failed: {0}")]
    RuntimeInit(#[source] std::io::Error),
}

fn main() -> Result<(), ReaperError> {
    telemetry::init_tracing(LogFormat::from_env())?;
    let config = OrchestratorConfig::from_env()?;
    let pool = build_pool(config.require_database_url()?)?;
    let reaper = build_reaper(&config, pool);

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(ReaperError::RuntimeInit)?;
    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("interrupt received; shutting down"),
                Err(err) => tracing::error!(error = %err, "failed to listen for interrupt"),
            }
            shutdown.cancel();
        });
        reaper.run(config.reap_interval, &cancel).await;
    });
    Ok(())
}

fn build_pool(database_url: &str) -> Result<DeploymentPgPool, ReaperError> {
    Pool::builder()
        .build(ConnectionManager::new(database_url))
        .map_err(ReaperError::Pool)
}

type Reaper = CleanupReaper<
    PostgresContainerRepository,
    PostgresProjectRepository,
    DockerCliEngine<TokioCommandRunner>,
    DefaultClock,
>;

fn build_reaper(config: &OrchestratorConfig, pool: DeploymentPgPool) -> Reaper {
    let mut runner = TokioCommandRunner::new(config.engine.binary.as_str());
    if let Some(host) = &config.engine.host {
        runner = runner.with_host(host.as_str());
    }
    let engine = DockerCliEngine::new(runner, config.engine.timeouts);
    let stale_after = config.stale_starting_window();

    tracing::info!(
        engine = %config.engine.binary,
        reap_interval_secs = config.reap_interval.as_secs(),
        stale_after_secs = stale_after.as_secs(),
        "starting pavilion reaper"
    );
    CleanupReaper::standalone(
        Arc::new(PostgresContainerRepository::new(pool.clone())),
        Arc::new(PostgresProjectRepository::new(pool)),
        Arc::new(engine),
        Arc::new(DefaultClock),
        stale_after,
    )
}
