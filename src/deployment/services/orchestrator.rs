//! Deployment lifecycle orchestration.
//!
//! The orchestrator is the only writer of container rows during a lifecycle
//! operation. Every mutating operation runs under the project's lock, and
//! stop, restart and delete cancel any in-flight readiness poll before
//! queueing for that lock.

use super::{
    CleanupReaper, DeploymentError, DeploymentResult, HealthChecker, HealthSettings,
    PortAllocator, ReadinessOutcome, ReapReport,
    coordination::{LifecycleCoordinator, ProjectGuard},
};
use crate::deployment::{
    domain::{
        ContainerRecord, ContainerStatus, EngineContainerId, Freshness, HealthReport,
        LOG_SNAPSHOT_LINES, PortRange, Project, ProjectId, ProjectStatus,
    },
    ports::{
        BuildArtifactSource, BuildArtifacts, ContainerEngine, ContainerRepository, ContainerSpec,
        EngineContainerSummary, EngineError, MANAGED_LABEL, PROJECT_LABEL, PortProbe,
        ProjectRepository, RECORD_LABEL,
    },
};
use mockable::Clock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How preview URLs are composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewUrlSettings {
    /// URL scheme.
    pub scheme: String,
    /// Host used for port-based URLs.
    pub host: String,
    /// Base domain for subdomain URLs; port-based URLs are used when unset.
    pub domain: Option<String>,
}

impl Default for PreviewUrlSettings {
    fn default() -> Self {
        Self {
            scheme: String::from("http"),
            host: String::from("localhost"),
            domain: None,
        }
    }
}

impl PreviewUrlSettings {
    /// Returns the preview URL for `project` served on host `port`.
    #[must_use]
    pub fn url_for(&self, project: &Project, port: u16) -> String {
        match (project.subdomain(), self.domain.as_deref()) {
            (Some(subdomain), Some(domain)) => format!("{}://{subdomain}.{domain}", self.scheme),
            _ => format!("{}://{}:{port}", self.scheme, self.host),
        }
    }
}

/// Orchestrator tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Host ports available to preview containers.
    pub port_range: PortRange,
    /// Prefix of engine container names.
    pub container_prefix: String,
    /// Preview URL composition.
    pub preview: PreviewUrlSettings,
    /// Readiness polling and health classification.
    pub health: HealthSettings,
    /// Extra time past the readiness window before the reaper treats a
    /// `starting` row as abandoned.
    pub stale_starting_grace: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            port_range: PortRange::default(),
            container_prefix: String::from("pavilion"),
            preview: PreviewUrlSettings::default(),
            health: HealthSettings::default(),
            stale_starting_grace: Duration::from_secs(60),
        }
    }
}

/// Collaborators the orchestrator drives.
#[derive(Debug)]
pub struct OrchestratorPorts<R, P, E, A, Q, C> {
    /// Container record store.
    pub containers: Arc<R>,
    /// Project store.
    pub projects: Arc<P>,
    /// Container engine.
    pub engine: Arc<E>,
    /// Build artifact source.
    pub artifacts: Arc<A>,
    /// Operating-system port probe.
    pub probe: Arc<Q>,
    /// Time source.
    pub clock: Arc<C>,
}

/// Result of [`DeploymentOrchestrator::deploy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    /// The project's active container.
    pub container: ContainerRecord,
    /// Whether the project was already deployed and nothing was started.
    pub already_deployed: bool,
}

impl DeployOutcome {
    /// Returns the engine container identifier.
    #[must_use]
    pub const fn engine_id(&self) -> Option<&EngineContainerId> {
        self.container.engine_id()
    }

    /// Returns the preview URL, once the container is running.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.container.url()
    }
}

/// Result of [`DeploymentOrchestrator::stop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    /// The record that was stopped, or `None` when nothing was active.
    pub stopped: Option<ContainerRecord>,
}

/// How a restart was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartMode {
    /// The existing process was restarted, keeping its port and URL.
    InPlace,
    /// A fresh container row and process were deployed.
    Redeployed,
}

/// Result of [`DeploymentOrchestrator::restart`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartOutcome {
    /// The running container after the restart.
    pub container: ContainerRecord,
    /// How the restart was carried out.
    pub mode: RestartMode,
}

/// Result of [`DeploymentOrchestrator::status`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentStatusReport {
    /// Project the report describes.
    pub project_id: ProjectId,
    /// Active container, or the most recent one when none is active.
    pub container: Option<ContainerRecord>,
    /// Health classification.
    pub health: HealthReport,
    /// CPU usage in percent of one core.
    pub cpu_percent: Option<f64>,
    /// Memory usage in percent of the container limit.
    pub memory_percent: Option<f64>,
    /// Human-readable memory usage.
    pub memory_usage: Option<String>,
    /// Time since the container last entered `running`.
    pub uptime: Option<Duration>,
    /// Whether the engine was consulted for this report.
    pub freshness: Freshness,
}

impl DeploymentStatusReport {
    /// Returns the container status, if the project has a container.
    #[must_use]
    pub fn status(&self) -> Option<ContainerStatus> {
        self.container.as_ref().map(ContainerRecord::status)
    }

    /// Returns whether the container is healthy.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    /// Returns the health message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.health.message()
    }
}

/// Result of [`DeploymentOrchestrator::logs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogsOutcome {
    /// Log text, oldest line first.
    pub logs: String,
    /// Whether the text came from the engine or from the cached snapshot.
    pub freshness: Freshness,
}

/// Result of [`DeploymentOrchestrator::delete_project`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteProjectReport {
    /// What engine cleanup achieved.
    pub reap: ReapReport,
    /// Number of container rows removed with the project.
    pub records_deleted: usize,
}

/// Coordinates deploy, stop, restart, status, logs and deletion of project
/// previews.
pub struct DeploymentOrchestrator<R, P, E, A, Q, C> {
    containers: Arc<R>,
    projects: Arc<P>,
    engine: Arc<E>,
    artifacts: Arc<A>,
    clock: Arc<C>,
    allocator: PortAllocator<R, Q>,
    health: Arc<HealthChecker<E, C>>,
    reaper: Arc<CleanupReaper<R, P, E, C>>,
    coordinator: Arc<LifecycleCoordinator>,
    settings: OrchestratorSettings,
}

impl<R, P, E, A, Q, C> DeploymentOrchestrator<R, P, E, A, Q, C>
where
    R: ContainerRepository,
    P: ProjectRepository,
    E: ContainerEngine,
    A: BuildArtifactSource,
    Q: PortProbe,
    C: Clock + Send + Sync,
{
    /// Creates an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(ports: OrchestratorPorts<R, P, E, A, Q, C>, settings: OrchestratorSettings) -> Self {
        let OrchestratorPorts {
            containers,
            projects,
            engine,
            artifacts,
            probe,
            clock,
        } = ports;
        let coordinator = Arc::new(LifecycleCoordinator::default());
        let health = Arc::new(HealthChecker::new(
            Arc::clone(&engine),
            Arc::clone(&clock),
            settings.health,
        ));
        let reaper = Arc::new(CleanupReaper::new(
            Arc::clone(&containers),
            Arc::clone(&projects),
            Arc::clone(&engine),
            Arc::clone(&clock),
            Arc::clone(&coordinator),
            settings
                .health
                .readiness_timeout
                .saturating_add(settings.stale_starting_grace),
        ));
        let allocator = PortAllocator::new(Arc::clone(&containers), probe, settings.port_range);

        Self {
            containers,
            projects,
            engine,
            artifacts,
            clock,
            allocator,
            health,
            reaper,
            coordinator,
            settings,
        }
    }

    /// Returns the orchestrator settings.
    #[must_use]
    pub const fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Returns the health checker.
    #[must_use]
    pub fn health(&self) -> Arc<HealthChecker<E, C>> {
        Arc::clone(&self.health)
    }

    /// Returns the cleanup reaper, sharing this orchestrator's locks.
    #[must_use]
    pub fn reaper(&self) -> Arc<CleanupReaper<R, P, E, C>> {
        Arc::clone(&self.reaper)
    }

    /// Deploys the project's preview.
    ///
    /// When the project already has an active container, that container is
    /// returned with `already_deployed` set and nothing else happens.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError::NoPortsAvailable`], engine failures,
    /// readiness failures and persistence failures. Every failure after the
    /// project entered `building` leaves the project and the attempted row in
    /// `error` and releases the port. [`DeploymentError::Cancelled`] leaves
    /// the row `starting` for the cancelling operation to settle.
    pub async fn deploy(&self, project_id: ProjectId) -> DeploymentResult<DeployOutcome> {
        let guard = self.coordinator.locks().acquire(project_id).await;
        let registration = self.coordinator.polls().register(project_id);
        self.deploy_locked(project_id, &guard, registration.token())
            .await
    }

    /// Stops the project's active container.
    ///
    /// Stopping a project with no active container succeeds without changing
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns the engine failure when the process could not be stopped. The
    /// row is still closed as `error` so its port returns to the pool.
    pub async fn stop(&self, project_id: ProjectId) -> DeploymentResult<StopOutcome> {
        self.cancel_readiness_poll(project_id, "stop");
        let guard = self.coordinator.locks().acquire(project_id).await;
        self.stop_locked(project_id, &guard).await
    }

    /// Restarts the project's preview.
    ///
    /// The existing process is restarted in place when it still exists,
    /// keeping its port and URL. Otherwise a fresh container is deployed.
    ///
    /// # Errors
    ///
    /// Returns the same failures as [`Self::deploy`].
    pub async fn restart(&self, project_id: ProjectId) -> DeploymentResult<RestartOutcome> {
        self.cancel_readiness_poll(project_id, "restart");
        let guard = self.coordinator.locks().acquire(project_id).await;
        let registration = self.coordinator.polls().register(project_id);
        let cancel = registration.token();

        let Some(mut record) = self.containers.find_active_for_project(project_id).await? else {
            return self.redeploy(project_id, &guard, cancel).await;
        };
        let Some(engine_id) = record.engine_id().cloned() else {
            self.close_failed(&mut record, "restart found no engine container for this row")
                .await?;
            return self.redeploy(project_id, &guard, cancel).await;
        };

        match self.engine.restart(&engine_id).await {
            Ok(()) => {}
            Err(EngineError::NotFound(_)) => {
                tracing::warn!(
                    project_id = %project_id,
                    container_id = %engine_id,
                    "container vanished; redeploying"
                );
                self.close_failed(&mut record, "container process no longer exists")
                    .await?;
                return self.redeploy(project_id, &guard, cancel).await;
            }
            Err(err) => {
                let failure = DeploymentError::from(err);
                self.close_failed(&mut record, &format!("restart failed: {failure}"))
                    .await?;
                self.mark_project_failed(project_id, &failure).await;
                return Err(failure);
            }
        }

        let mut project = self.load_project(project_id).await?;
        record.begin_restart(&*self.clock)?;
        self.containers.update(&record).await?;
        self.set_project_status(&mut project, ProjectStatus::Building)
            .await?;

        let confirmed = self
            .confirm_readiness(&project, &mut record, cancel)
            .await
            .map(|()| record);
        let container = self.settle_project(&mut project, confirmed).await?;
        tracing::info!(
            project_id = %project_id,
            container_id = %engine_id,
            "container restarted in place"
        );
        Ok(RestartOutcome {
            container,
            mode: RestartMode::InPlace,
        })
    }

    /// Reports the project's container state, reading through to the
    /// engine.
    ///
    /// When the engine is unreachable the last persisted state is returned,
    /// marked [`Freshness::Stale`].
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError::Store`] when records cannot be read.
    pub async fn status(&self, project_id: ProjectId) -> DeploymentResult<DeploymentStatusReport> {
        let now = self.clock.utc();
        let mut report = DeploymentStatusReport {
            project_id,
            container: None,
            health: HealthReport::unknown(now, "project has no container"),
            cpu_percent: None,
            memory_percent: None,
            memory_usage: None,
            uptime: None,
            freshness: Freshness::Live,
        };

        let Some(record) = self.current_record(project_id).await? else {
            return Ok(report);
        };
        report.health =
            HealthReport::unknown(now, format!("container is {}", record.status().as_str()));
        report.uptime = record
            .started_at()
            .filter(|_| record.status() == ContainerStatus::Running)
            .and_then(|started_at| now.signed_duration_since(started_at).to_std().ok());

        let live_engine_id = record.engine_id().filter(|_| record.is_active()).cloned();
        report.container = Some(record);
        let Some(engine_id) = live_engine_id else {
            return Ok(report);
        };

        match self.engine.inspect(&engine_id).await {
            Ok(inspection) => {
                let stats = self.health.sample_stats(&engine_id, &inspection).await;
                report.health = self.health.classify(&inspection, stats.as_ref()).report;
                if let Some(usage) = stats {
                    report.cpu_percent = Some(usage.cpu_percent);
                    report.memory_percent = Some(usage.memory_percent);
                    report.memory_usage = Some(usage.memory_usage);
                }
            }
            Err(EngineError::NotFound(_)) => {
                report.health = HealthReport::unhealthy(now, "container process no longer exists");
            }
            Err(err) => {
                tracing::warn!(
                    project_id = %project_id,
                    container_id = %engine_id,
                    error = %err,
                    "engine unreachable; reporting persisted state"
                );
                report.health = HealthReport::unknown(now, err.to_string());
                report.freshness = Freshness::stale(err.to_string());
            }
        }
        Ok(report)
    }

    /// Returns the project's container logs, limited to the last `tail`
    /// lines when given.
    ///
    /// Falls back to the cached snapshot, marked [`Freshness::Stale`], when
    /// the engine cannot supply them.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError::NoContainer`] when the project never had a
    /// container, or the engine failure when nothing is cached.
    pub async fn logs(
        &self,
        project_id: ProjectId,
        tail: Option<u32>,
    ) -> DeploymentResult<LogsOutcome> {
        let Some(record) = self.current_record(project_id).await? else {
            return Err(DeploymentError::NoContainer(project_id));
        };
        let Some(engine_id) = record.engine_id() else {
            return Ok(LogsOutcome {
                logs: last_lines(record.logs().unwrap_or_default(), tail),
                freshness: Freshness::Live,
            });
        };

        match self.engine.logs(engine_id, tail).await {
            Ok(engine_logs) => {
                let logs = if record.status().is_terminal() {
                    last_lines(&record.annotate_logs(&engine_logs), tail)
                } else {
                    engine_logs
                };
                let covers_snapshot = tail.is_none_or(|requested| {
                    usize::try_from(requested).is_ok_and(|lines| lines >= LOG_SNAPSHOT_LINES)
                });
                if covers_snapshot {
                    self.refresh_log_cache(&record, &logs).await;
                }
                Ok(LogsOutcome {
                    logs,
                    freshness: Freshness::Live,
                })
            }
            Err(err) => {
                let Some(cached) = record.logs() else {
                    return Err(err.into());
                };
                if err.is_not_found() {
                    // The process is gone; its final snapshot is all there is.
                    return Ok(LogsOutcome {
                        logs: last_lines(cached, tail),
                        freshness: Freshness::Live,
                    });
                }
                tracing::warn!(
                    project_id = %project_id,
                    container_id = %engine_id,
                    error = %err,
                    "engine logs unavailable; serving cached snapshot"
                );
                Ok(LogsOutcome {
                    logs: last_lines(cached, tail),
                    freshness: Freshness::stale(err.to_string()),
                })
            }
        }
    }

    /// Lists every managed container the engine reports as not yet ended.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError::Engine`] when the engine cannot list.
    pub async fn list_active(&self) -> DeploymentResult<Vec<EngineContainerSummary>> {
        let mut summaries = self.engine.list_managed().await?;
        summaries.retain(|summary| !summary.state.has_ended());
        Ok(summaries)
    }

    /// Tears down the project's containers and deletes the project.
    ///
    /// Engine cleanup failures are logged and reported but never block the
    /// deletion.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError::Store`] when the storage-level deletion
    /// fails.
    pub async fn delete_project(
        &self,
        project_id: ProjectId,
    ) -> DeploymentResult<DeleteProjectReport> {
        self.cancel_readiness_poll(project_id, "delete");
        let guard = self.coordinator.locks().acquire(project_id).await;

        let reap = self.reaper.reap_project_locked(project_id, &guard).await;
        if !reap.is_clean() {
            tracing::warn!(
                project_id = %project_id,
                failures = reap.failures.len(),
                "engine cleanup incomplete; deleting project anyway"
            );
        }
        let records_deleted = self.containers.delete_for_project(project_id).await?;
        self.projects.delete(project_id).await?;

        tracing::info!(
            project_id = %project_id,
            records_deleted,
            processes_removed = reap.processes_removed,
            "project deleted"
        );
        Ok(DeleteProjectReport {
            reap,
            records_deleted,
        })
    }

    fn cancel_readiness_poll(&self, project_id: ProjectId, operation: &str) {
        if self.coordinator.polls().cancel(project_id) {
            tracing::info!(
                project_id = %project_id,
                operation,
                "cancelled in-flight readiness poll"
            );
        }
    }

    async fn deploy_locked(
        &self,
        project_id: ProjectId,
        _guard: &ProjectGuard,
        cancel: &CancellationToken,
    ) -> DeploymentResult<DeployOutcome> {
        if let Some(active) = self.containers.find_active_for_project(project_id).await? {
            tracing::info!(
                project_id = %project_id,
                record_id = %active.id(),
                "project already has an active container"
            );
            return Ok(DeployOutcome {
                container: active,
                already_deployed: true,
            });
        }

        let mut project = self.load_project(project_id).await?;
        let artifacts = self.artifacts.artifacts_for(&project).await?;
        self.set_project_status(&mut project, ProjectStatus::Building)
            .await?;

        let launched = self.launch(&project, &artifacts, cancel).await;
        let container = self.settle_project(&mut project, launched).await?;
        tracing::info!(
            project_id = %project_id,
            port = container.port(),
            url = container.url().unwrap_or_default(),
            "preview deployed"
        );
        Ok(DeployOutcome {
            container,
            already_deployed: false,
        })
    }

    async fn redeploy(
        &self,
        project_id: ProjectId,
        guard: &ProjectGuard,
        cancel: &CancellationToken,
    ) -> DeploymentResult<RestartOutcome> {
        let outcome = self.deploy_locked(project_id, guard, cancel).await?;
        Ok(RestartOutcome {
            container: outcome.container,
            mode: RestartMode::Redeployed,
        })
    }

    /// Allocates a port, records the attempt and starts the container.
    async fn launch(
        &self,
        project: &Project,
        artifacts: &BuildArtifacts,
        cancel: &CancellationToken,
    ) -> DeploymentResult<ContainerRecord> {
        let claim = self.allocator.allocate().await?;
        let mut record = ContainerRecord::new(
            project.id(),
            &self.settings.container_prefix,
            claim.port(),
            artifacts.environment.clone(),
            &*self.clock,
        )?;
        self.containers.insert(&record).await?;
        drop(claim);

        if let Err(err) = self.start_container(project, &mut record, artifacts).await {
            return Err(self.abort_launch(&mut record, err).await);
        }
        self.confirm_readiness(project, &mut record, cancel).await?;
        Ok(record)
    }

    async fn start_container(
        &self,
        project: &Project,
        record: &mut ContainerRecord,
        artifacts: &BuildArtifacts,
    ) -> DeploymentResult<()> {
        let spec = container_spec(project, record, artifacts);
        let engine_id = self.engine.create(&spec).await?;
        record.attach_engine(engine_id.clone(), &*self.clock)?;
        self.containers.update(record).await?;
        self.engine.start(&engine_id).await?;
        tracing::debug!(
            project_id = %project.id(),
            container_id = %engine_id,
            port = spec.host_port,
            "container started; waiting for readiness"
        );
        Ok(())
    }

    /// Waits for a `starting` row to become healthy and marks it running.
    ///
    /// `cancel` is the token registered when the operation took the
    /// project's lock, so a competing stop can interrupt the wait.
    async fn confirm_readiness(
        &self,
        project: &Project,
        record: &mut ContainerRecord,
        cancel: &CancellationToken,
    ) -> DeploymentResult<()> {
        let outcome = self.health.wait_until_ready(record, cancel).await;

        let failure = match outcome {
            ReadinessOutcome::Ready(_) => {
                let url = self
                    .settings
                    .preview
                    .url_for(project, record.port().unwrap_or_default());
                let promoted = match record.mark_running(url, &*self.clock) {
                    Ok(()) => self.containers.update(record).await.map_err(DeploymentError::from),
                    Err(err) => Err(err.into()),
                };
                match promoted {
                    Ok(()) => return Ok(()),
                    Err(err) => err,
                }
            }
            ReadinessOutcome::Cancelled => return Err(DeploymentError::Cancelled(project.id())),
            ReadinessOutcome::Exited(reason) => DeploymentError::StartupFailed {
                project_id: project.id(),
                reason,
            },
            ReadinessOutcome::TimedOut(reason) => DeploymentError::ReadinessTimedOut {
                project_id: project.id(),
                timeout: self.settings.health.readiness_timeout,
                reason,
            },
        };
        Err(self.abort_launch(record, failure).await)
    }

    /// Applies the outcome of a launch to the project.
    async fn settle_project(
        &self,
        project: &mut Project,
        launched: DeploymentResult<ContainerRecord>,
    ) -> DeploymentResult<ContainerRecord> {
        match launched {
            Ok(record) => {
                self.set_project_status(project, ProjectStatus::Ready).await?;
                Ok(record)
            }
            Err(DeploymentError::Cancelled(project_id)) => {
                tracing::info!(
                    project_id = %project_id,
                    "readiness wait cancelled by a competing operation"
                );
                Err(DeploymentError::Cancelled(project_id))
            }
            Err(failure) => {
                tracing::error!(
                    project_id = %project.id(),
                    error = %failure,
                    "deployment failed"
                );
                self.fail_project(project).await;
                Err(failure)
            }
        }
    }

    /// Cleans up after a failed launch and returns `failure` for the caller.
    async fn abort_launch(
        &self,
        record: &mut ContainerRecord,
        failure: DeploymentError,
    ) -> DeploymentError {
        if let Some(engine_id) = record.engine_id().cloned() {
            self.capture_logs(record).await;
            match self.engine.remove(&engine_id, true).await {
                Ok(()) | Err(EngineError::NotFound(_)) => {}
                Err(err) => tracing::warn!(
                    project_id = %record.project_id(),
                    container_id = %engine_id,
                    error = %err,
                    "failed to remove container of failed deployment"
                ),
            }
        }
        if let Err(err) = self.close_failed(record, &failure.to_string()).await {
            tracing::error!(
                project_id = %record.project_id(),
                record_id = %record.id(),
                error = %err,
                "failed to record deployment failure"
            );
        }
        failure
    }

    async fn stop_locked(
        &self,
        project_id: ProjectId,
        _guard: &ProjectGuard,
    ) -> DeploymentResult<StopOutcome> {
        let Some(mut record) = self.containers.find_active_for_project(project_id).await? else {
            tracing::debug!(project_id = %project_id, "stop requested with no active container");
            return Ok(StopOutcome { stopped: None });
        };

        let stopped = match record.engine_id().cloned() {
            Some(engine_id) => match self.engine.stop(&engine_id).await {
                Ok(()) => Ok(()),
                Err(EngineError::NotFound(_)) => {
                    tracing::warn!(
                        project_id = %project_id,
                        container_id = %engine_id,
                        "container already gone; closing its row"
                    );
                    Ok(())
                }
                Err(err) => Err(err),
            },
            None => Ok(()),
        };
        self.capture_logs(&mut record).await;

        if let Err(err) = stopped {
            tracing::error!(
                project_id = %project_id,
                record_id = %record.id(),
                error = %err,
                "stop failed; closing row as error and releasing its port"
            );
            let failure = DeploymentError::from(err);
            self.close_failed(&mut record, &format!("stop failed: {failure}"))
                .await?;
            self.mark_project_failed(project_id, &failure).await;
            return Err(failure);
        }

        record.mark_stopped(&*self.clock)?;
        self.containers.update(&record).await?;
        self.close_interrupted_build(project_id).await?;
        tracing::info!(
            project_id = %project_id,
            record_id = %record.id(),
            port = record.port(),
            "container stopped"
        );
        Ok(StopOutcome {
            stopped: Some(record),
        })
    }

    /// A stop that lands while a deploy was still confirming readiness
    /// leaves the project `building`; the build never finished.
    async fn close_interrupted_build(&self, project_id: ProjectId) -> DeploymentResult<()> {
        let Some(mut project) = self.projects.find_by_id(project_id).await? else {
            return Ok(());
        };
        if project.status() == ProjectStatus::Building {
            tracing::info!(project_id = %project_id, "stop interrupted a deployment");
            self.set_project_status(&mut project, ProjectStatus::Error)
                .await?;
        }
        Ok(())
    }

    async fn close_failed(
        &self,
        record: &mut ContainerRecord,
        reason: &str,
    ) -> DeploymentResult<()> {
        record.mark_failed(reason, &*self.clock)?;
        self.containers.update(record).await?;
        Ok(())
    }

    async fn capture_logs(&self, record: &mut ContainerRecord) {
        let Some(engine_id) = record.engine_id().cloned() else {
            return;
        };
        let tail = u32::try_from(LOG_SNAPSHOT_LINES).unwrap_or(u32::MAX);
        match self.engine.logs(&engine_id, Some(tail)).await {
            Ok(logs) => record.cache_logs(&logs, &*self.clock),
            Err(err) => tracing::debug!(
                container_id = %engine_id,
                error = %err,
                "could not capture log snapshot"
            ),
        }
    }

    async fn refresh_log_cache(&self, record: &ContainerRecord, logs: &str) {
        let Some(_guard) = self.coordinator.locks().try_acquire(record.project_id()) else {
            tracing::debug!(
                project_id = %record.project_id(),
                "project busy; skipping log cache refresh"
            );
            return;
        };
        let refreshed = match self.containers.find_by_id(record.id()).await {
            Ok(Some(mut current)) => {
                current.cache_logs(logs, &*self.clock);
                self.containers.update(&current).await
            }
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = refreshed {
            tracing::warn!(
                project_id = %record.project_id(),
                record_id = %record.id(),
                error = %err,
                "failed to cache log snapshot"
            );
        }
    }

    /// Returns the active row, or the most recent one when none is active.
    async fn current_record(
        &self,
        project_id: ProjectId,
    ) -> DeploymentResult<Option<ContainerRecord>> {
        if let Some(active) = self.containers.find_active_for_project(project_id).await? {
            return Ok(Some(active));
        }
        Ok(self.containers.list_for_project(project_id).await?.pop())
    }

    async fn load_project(&self, project_id: ProjectId) -> DeploymentResult<Project> {
        self.projects
            .find_by_id(project_id)
            .await?
            .ok_or(DeploymentError::ProjectNotFound(project_id))
    }

    async fn set_project_status(
        &self,
        project: &mut Project,
        status: ProjectStatus,
    ) -> DeploymentResult<()> {
        if project.transition_to(status, &*self.clock)? {
            self.projects.update_status(project).await?;
        }
        Ok(())
    }

    async fn fail_project(&self, project: &mut Project) {
        if let Err(err) = self.set_project_status(project, ProjectStatus::Error).await {
            tracing::error!(
                project_id = %project.id(),
                error = %err,
                "failed to mark project as error"
            );
        }
    }

    async fn mark_project_failed(&self, project_id: ProjectId, failure: &DeploymentError) {
        match self.projects.find_by_id(project_id).await {
            Ok(Some(mut project)) => {
                tracing::warn!(
                    project_id = %project_id,
                    error = %failure,
                    "marking project as error"
                );
                self.fail_project(&mut project).await;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(
                project_id = %project_id,
                error = %err,
                "failed to load project to mark it as error"
            ),
        }
    }
}

fn container_spec(
    project: &Project,
    record: &ContainerRecord,
    artifacts: &BuildArtifacts,
) -> ContainerSpec {
    let labels = BTreeMap::from([
        (MANAGED_LABEL.to_owned(), String::from("true")),
        (PROJECT_LABEL.to_owned(), project.id().to_string()),
        (RECORD_LABEL.to_owned(), record.id().to_string()),
    ]);
    ContainerSpec {
        name: record.name().clone(),
        image: artifacts.image.clone(),
        host_port: record.port().unwrap_or_default(),
        container_port: artifacts.container_port,
        environment: artifacts.environment.clone(),
        labels,
        mount: artifacts.mount.clone(),
    }
}

fn last_lines(text: &str, tail: Option<u32>) -> String {
    let Some(count) = tail.and_then(|lines| usize::try_from(lines).ok()) else {
        return text.to_owned();
    };
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(count);
    lines.get(skip..).unwrap_or_default().join("\n")
}
