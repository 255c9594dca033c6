//! Teardown of a project's containers and periodic sweeping of orphans.
//!
//! The sweep is safe to run from a separate process. A running engine
//! container is only treated as an orphan when no active row names it,
//! either by engine identifier or through its record label. Rows are
//! inserted before their container is created, so a container listed first
//! always has its row visible to the subsequent row query.

use super::{
    DeploymentResult,
    coordination::{LifecycleCoordinator, ProjectGuard},
};
use crate::deployment::{
    domain::{ContainerRecord, ContainerStatus, EngineContainerId, ProjectId, ProjectStatus},
    ports::{
        ContainerEngine, ContainerRepository, EngineContainerSummary, EngineError,
        ProjectRepository, RECORD_LABEL,
    },
};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Outcome of tearing down one project's containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Active rows moved to a terminal status.
    pub records_closed: usize,
    /// Engine containers removed.
    pub processes_removed: usize,
    /// Cleanup steps that failed.
    pub failures: Vec<String>,
}

impl ReapReport {
    /// Returns whether every cleanup step succeeded.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of one orphan sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanSweepReport {
    /// Managed engine containers no active row accounts for, now removed.
    pub orphans_removed: usize,
    /// Active rows whose process had ended or disappeared.
    pub rows_failed: usize,
    /// `starting` rows abandoned past the readiness window.
    pub stale_starting: usize,
    /// Projects skipped because a lifecycle operation held their lock.
    pub skipped_projects: usize,
    /// Steps that failed and will be retried on the next sweep.
    pub failures: Vec<String>,
}

impl OrphanSweepReport {
    /// Returns whether the sweep found nothing to do.
    #[must_use]
    pub const fn is_quiet(&self) -> bool {
        self.orphans_removed == 0
            && self.rows_failed == 0
            && self.stale_starting == 0
            && self.failures.is_empty()
    }
}

/// Reconciles persisted container rows with the engine.
pub struct CleanupReaper<R, P, E, C> {
    containers: Arc<R>,
    projects: Arc<P>,
    engine: Arc<E>,
    clock: Arc<C>,
    coordinator: Arc<LifecycleCoordinator>,
    stale_after: Duration,
}

impl<R, P, E, C> CleanupReaper<R, P, E, C>
where
    R: ContainerRepository,
    P: ProjectRepository,
    E: ContainerEngine,
    C: Clock + Send + Sync,
{
    pub(crate) const fn new(
        containers: Arc<R>,
        projects: Arc<P>,
        engine: Arc<E>,
        clock: Arc<C>,
        coordinator: Arc<LifecycleCoordinator>,
        stale_after: Duration,
    ) -> Self {
        Self {
            containers,
            projects,
            engine,
            clock,
            coordinator,
            stale_after,
        }
    }

    /// Creates a reaper for a process that runs no lifecycle operations of
    /// its own, such as a dedicated sweeper.
    ///
    /// `stale_after` should cover the deploying processes' readiness window
    /// plus a grace period.
    #[must_use]
    pub fn standalone(
        containers: Arc<R>,
        projects: Arc<P>,
        engine: Arc<E>,
        clock: Arc<C>,
        stale_after: Duration,
    ) -> Self {
        Self::new(
            containers,
            projects,
            engine,
            clock,
            Arc::new(LifecycleCoordinator::default()),
            stale_after,
        )
    }

    /// Returns how long a `starting` row may go without an update before a
    /// sweep abandons it.
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Stops and removes every engine container belonging to the project
    /// and closes its active rows.
    ///
    /// Failures are collected in the report rather than returned; cleanup
    /// continues past each one.
    pub async fn reap_project(&self, project_id: ProjectId) -> ReapReport {
        self.coordinator.polls().cancel(project_id);
        let guard = self.coordinator.locks().acquire(project_id).await;
        self.reap_project_locked(project_id, &guard).await
    }

    pub(crate) async fn reap_project_locked(
        &self,
        project_id: ProjectId,
        _guard: &ProjectGuard,
    ) -> ReapReport {
        let mut report = ReapReport::default();
        let records = self
            .containers
            .list_for_project(project_id)
            .await
            .unwrap_or_else(|err| {
                report.failures.push(format!("listing container rows: {err}"));
                Vec::new()
            });

        let mut removed: Vec<EngineContainerId> = Vec::new();
        for mut record in records {
            let teardown = match record.engine_id().cloned() {
                Some(engine_id) => {
                    let outcome = self.remove_process(&engine_id, record.is_active()).await;
                    tally_removal(&engine_id, &outcome, &mut report);
                    if outcome.is_ok() {
                        removed.push(engine_id);
                    }
                    outcome.map(|_| ())
                }
                None => Ok(()),
            };
            if record.is_active() {
                self.close_torn_down(&mut record, teardown, &mut report).await;
            }
        }

        self.remove_labelled(project_id, &removed, &mut report).await;

        tracing::info!(
            project_id = %project_id,
            records_closed = report.records_closed,
            processes_removed = report.processes_removed,
            failures = report.failures.len(),
            "project containers reaped"
        );
        report
    }

    async fn close_torn_down(
        &self,
        record: &mut ContainerRecord,
        teardown: Result<(), EngineError>,
        report: &mut ReapReport,
    ) {
        let closed = match teardown {
            Ok(()) => record.mark_stopped(&*self.clock),
            Err(err) => record.mark_failed(&format!("teardown failed: {err}"), &*self.clock),
        };
        let persisted = match closed {
            Ok(()) => self.containers.update(record).await.map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };
        match persisted {
            Ok(()) => report.records_closed += 1,
            Err(err) => report
                .failures
                .push(format!("closing row {}: {err}", record.id())),
        }
    }

    /// Removes engine containers no active row accounts for and fails rows
    /// whose process has ended, vanished, or never became ready.
    ///
    /// Projects with a lifecycle operation in progress are skipped and
    /// revisited on the next sweep.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine cannot list containers or the
    /// active rows cannot be read. Individual cleanup failures are reported
    /// in [`OrphanSweepReport::failures`].
    pub async fn reap_orphans(&self) -> DeploymentResult<OrphanSweepReport> {
        let mut report = OrphanSweepReport::default();
        let managed = self.engine.list_managed().await?;
        let active = self.containers.list_active().await?;

        for summary in managed.iter().filter(|summary| !is_tracked(summary, &active)) {
            self.remove_orphan(summary, &mut report).await;
        }
        for record in &active {
            self.reconcile_row(record, &mut report).await;
        }

        if !report.is_quiet() {
            tracing::info!(
                orphans_removed = report.orphans_removed,
                rows_failed = report.rows_failed,
                stale_starting = report.stale_starting,
                skipped_projects = report.skipped_projects,
                failures = report.failures.len(),
                "orphan sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweeps for orphans every `interval` until `cancel` fires.
    pub async fn run(&self, interval: Duration, cancel: &CancellationToken) {
        tracing::info!(
            interval_secs = interval.as_secs(),
            stale_after_secs = self.stale_after.as_secs(),
            "orphan reaper started"
        );
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("orphan reaper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.reap_orphans().await {
                        Ok(report) if report.is_quiet() => {
                            tracing::debug!("orphan sweep found nothing to clean");
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::error!(error = %err, "orphan sweep failed");
                        }
                    }
                }
            }
        }
    }

    /// Stops (when `graceful`) then force-removes a container. Returns
    /// `Ok(false)` when the engine no longer knows it.
    async fn remove_process(
        &self,
        engine_id: &EngineContainerId,
        graceful: bool,
    ) -> Result<bool, EngineError> {
        if graceful {
            match self.engine.stop(engine_id).await {
                Ok(()) | Err(EngineError::NotFound(_)) => {}
                Err(err) => tracing::warn!(
                    container_id = %engine_id,
                    error = %err,
                    "graceful stop failed; forcing removal"
                ),
            }
        }
        match self.engine.remove(engine_id, true).await {
            Ok(()) => Ok(true),
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Removes managed containers labelled with the project that are still
    /// present, including ones whose first removal attempt failed.
    async fn remove_labelled(
        &self,
        project_id: ProjectId,
        already_removed: &[EngineContainerId],
        report: &mut ReapReport,
    ) {
        let summaries = match self.engine.list_managed().await {
            Ok(summaries) => summaries,
            Err(err) => {
                report
                    .failures
                    .push(format!("listing engine containers: {err}"));
                return;
            }
        };
        let label = project_id.to_string();
        let strays = summaries.iter().filter(|summary| {
            summary.project_label() == Some(label.as_str())
                && !already_removed.iter().any(|id| id.matches(&summary.id))
        });
        for summary in strays {
            let outcome = self.remove_process(&summary.id, false).await;
            tally_removal(&summary.id, &outcome, report);
        }
    }

    async fn remove_orphan(&self, summary: &EngineContainerSummary, report: &mut OrphanSweepReport) {
        let owner = summary
            .project_label()
            .and_then(|label| Uuid::parse_str(label).ok())
            .map(ProjectId::from_uuid);
        let _guard = match owner {
            Some(project_id) => match self.coordinator.locks().try_acquire(project_id) {
                Some(guard) => Some(guard),
                None => {
                    report.skipped_projects += 1;
                    return;
                }
            },
            None => None,
        };

        match self.remove_process(&summary.id, false).await {
            Ok(removed) => {
                if removed {
                    report.orphans_removed += 1;
                }
                tracing::warn!(
                    container_id = %summary.id,
                    name = %summary.name,
                    state = %summary.state,
                    project = summary.project_label().unwrap_or("unlabelled"),
                    "removed orphaned container"
                );
            }
            Err(err) => report
                .failures
                .push(format!("removing orphan {}: {err}", summary.id)),
        }
    }

    async fn reconcile_row(&self, snapshot: &ContainerRecord, report: &mut OrphanSweepReport) {
        let project_id = snapshot.project_id();
        let Some(_guard) = self.coordinator.locks().try_acquire(project_id) else {
            report.skipped_projects += 1;
            return;
        };
        let mut record = match self.containers.find_by_id(snapshot.id()).await {
            Ok(Some(current)) if current.is_active() => current,
            Ok(_) => return,
            Err(err) => {
                report
                    .failures
                    .push(format!("reloading row {}: {err}", snapshot.id()));
                return;
            }
        };

        let process = match record.engine_id().cloned() {
            Some(engine_id) => match self.process_gone(&engine_id).await {
                Ok(gone) => gone,
                Err(err) => {
                    report
                        .failures
                        .push(format!("inspecting container {engine_id}: {err}"));
                    return;
                }
            },
            None => None,
        };

        if let Some(reason) = process {
            if self.close_abandoned(&mut record, &reason, report).await {
                report.rows_failed += 1;
            }
        } else if self.is_abandoned(&record) {
            let reason = format!(
                "container did not become ready within {}s",
                self.stale_after.as_secs()
            );
            if self.close_abandoned(&mut record, &reason, report).await {
                report.stale_starting += 1;
            }
        }
    }

    /// Returns why the container's process is gone, or `None` while it lives.
    async fn process_gone(
        &self,
        engine_id: &EngineContainerId,
    ) -> Result<Option<String>, EngineError> {
        match self.engine.inspect(engine_id).await {
            Ok(inspection) if inspection.state.has_ended() => Ok(Some(format!(
                "container process ended ({})",
                inspection.state
            ))),
            Ok(_) => Ok(None),
            Err(EngineError::NotFound(_)) => {
                Ok(Some(String::from("container process no longer exists")))
            }
            Err(err) => Err(err),
        }
    }

    /// Removes the row's container, fails the row and its project.
    async fn close_abandoned(
        &self,
        record: &mut ContainerRecord,
        reason: &str,
        report: &mut OrphanSweepReport,
    ) -> bool {
        if let Some(engine_id) = record.engine_id().cloned()
            && let Err(err) = self.remove_process(&engine_id, false).await
        {
            report
                .failures
                .push(format!("removing container {engine_id}: {err}"));
        }
        let closed = self.fail_row(record, reason, report).await;
        if closed {
            self.fail_project(record.project_id()).await;
        }
        closed
    }

    fn is_abandoned(&self, record: &ContainerRecord) -> bool {
        record.status() == ContainerStatus::Starting
            && !self.coordinator.polls().is_polling(record.project_id())
            && self
                .clock
                .utc()
                .signed_duration_since(record.updated_at())
                .to_std()
                .is_ok_and(|idle| idle > self.stale_after)
    }

    async fn fail_row(
        &self,
        record: &mut ContainerRecord,
        reason: &str,
        report: &mut OrphanSweepReport,
    ) -> bool {
        let persisted = match record.mark_failed(reason, &*self.clock) {
            Ok(()) => self.containers.update(record).await.map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };
        match persisted {
            Ok(()) => {
                tracing::warn!(
                    project_id = %record.project_id(),
                    record_id = %record.id(),
                    reason,
                    "closed container row as error"
                );
                true
            }
            Err(err) => {
                report
                    .failures
                    .push(format!("closing row {}: {err}", record.id()));
                false
            }
        }
    }

    async fn fail_project(&self, project_id: ProjectId) {
        let outcome = match self.projects.find_by_id(project_id).await {
            Ok(Some(mut project)) => match project.transition_to(ProjectStatus::Error, &*self.clock)
            {
                Ok(true) => self
                    .projects
                    .update_status(&project)
                    .await
                    .map_err(|err| err.to_string()),
                Ok(false) => Ok(()),
                Err(err) => Err(err.to_string()),
            },
            Ok(None) => Ok(()),
            Err(err) => Err(err.to_string()),
        };
        if let Err(err) = outcome {
            tracing::warn!(
                project_id = %project_id,
                error = %err,
                "failed to mark project as error"
            );
        }
    }
}

fn tally_removal(
    engine_id: &EngineContainerId,
    outcome: &Result<bool, EngineError>,
    report: &mut ReapReport,
) {
    match outcome {
        Ok(true) => report.processes_removed += 1,
        Ok(false) => {}
        Err(err) => report
            .failures
            .push(format!("removing container {engine_id}: {err}")),
    }
}

fn is_tracked(summary: &EngineContainerSummary, active: &[ContainerRecord]) -> bool {
    let record_label = summary.labels.get(RECORD_LABEL);
    active.iter().any(|record| {
        record
            .engine_id()
            .is_some_and(|engine_id| engine_id.matches(&summary.id))
            || record_label.is_some_and(|label| *label == record.id().to_string())
    })
}
