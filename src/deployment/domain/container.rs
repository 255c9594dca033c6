//! Container record aggregate and container status state machine.

use super::{
    ContainerName, ContainerRecordId, DeploymentDomainError, EngineContainerId,
    ParseContainerStatusError, ProjectId,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of trailing log lines retained in a record's cached snapshot.
pub const LOG_SNAPSHOT_LINES: usize = 500;

/// Prefix marking lines the orchestrator appends to a log snapshot.
pub const FAILURE_NOTE_PREFIX: &str = "[pavilion] ";

/// Environment variables passed to the container process at creation time.
pub type EnvironmentVars = BTreeMap<String, String>;

/// Runtime status of one container instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    /// Process is being created or has not yet passed readiness checks.
    Starting,
    /// Process passed readiness checks and serves the preview.
    Running,
    /// Process was stopped intentionally. Terminal.
    Stopped,
    /// Process failed to start, crashed, or could not be stopped. Terminal.
    Error,
}

impl ContainerStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// Returns whether the status counts as active (non-terminal).
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Returns whether the status is terminal.
    ///
    /// Terminal rows are never resurrected; a redeploy creates a new row.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Returns whether transition to `target` is allowed.
    ///
    /// `running -> starting` is the in-place restart path.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Starting, Self::Running | Self::Stopped | Self::Error)
                | (Self::Running, Self::Starting | Self::Stopped | Self::Error)
        )
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl ContainerStatus {
    fn from_name(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "starting" => Some(Self::Starting),
            "running" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl TryFrom<&str> for ContainerStatus {
    type Error = ParseContainerStatusError;

    fn try_from(value: &str) -> Result<Self, ParseContainerStatusError> {
        Self::from_name(value).ok_or_else(|| ParseContainerStatusError(value.to_owned()))
    }
}

/// One physical container instance for a project.
///
/// Rows are historical: a restart that needs a new process creates a new
/// record rather than resetting this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    id: ContainerRecordId,
    project_id: ProjectId,
    engine_id: Option<EngineContainerId>,
    name: ContainerName,
    status: ContainerStatus,
    port: Option<u16>,
    url: Option<String>,
    environment: EnvironmentVars,
    logs: Option<String>,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted container record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedContainerData {
    /// Persisted record identifier.
    pub id: ContainerRecordId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Engine-assigned identifier, once creation succeeded.
    pub engine_id: Option<EngineContainerId>,
    /// Engine-facing container name.
    pub name: ContainerName,
    /// Persisted status.
    pub status: ContainerStatus,
    /// Allocated host port.
    pub port: Option<u16>,
    /// Preview URL.
    pub url: Option<String>,
    /// Environment passed at creation time.
    pub environment: EnvironmentVars,
    /// Cached log snapshot.
    pub logs: Option<String>,
    /// Timestamp of the latest transition into `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// Timestamp of the transition into `stopped` or `error`.
    pub stopped_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ContainerRecord {
    /// Creates a `starting` record holding an allocated port.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentDomainError`] when `name_prefix` produces an
    /// invalid container name.
    pub fn new(
        project_id: ProjectId,
        name_prefix: &str,
        port: u16,
        environment: EnvironmentVars,
        clock: &impl Clock,
    ) -> Result<Self, DeploymentDomainError> {
        let id = ContainerRecordId::new();
        let name = ContainerName::for_record(name_prefix, project_id, id)?;
        let timestamp = clock.utc();
        Ok(Self {
            id,
            project_id,
            engine_id: None,
            name,
            status: ContainerStatus::Starting,
            port: Some(port),
            url: None,
            environment,
            logs: None,
            started_at: None,
            stopped_at: None,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a record from persistence.
    #[must_use]
    pub fn from_persisted(data: PersistedContainerData) -> Self {
        Self {
            id: data.id,
            project_id: data.project_id,
            engine_id: data.engine_id,
            name: data.name,
            status: data.status,
            port: data.port,
            url: data.url,
            environment: data.environment,
            logs: data.logs,
            started_at: data.started_at,
            stopped_at: data.stopped_at,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> ContainerRecordId {
        self.id
    }

    /// Returns the owning project identifier.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the engine-assigned identifier, if creation succeeded.
    #[must_use]
    pub const fn engine_id(&self) -> Option<&EngineContainerId> {
        self.engine_id.as_ref()
    }

    /// Returns the engine-facing container name.
    #[must_use]
    pub const fn name(&self) -> &ContainerName {
        &self.name
    }

    /// Returns the container status.
    #[must_use]
    pub const fn status(&self) -> ContainerStatus {
        self.status
    }

    /// Returns whether the record is active (`starting` or `running`).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Returns the allocated host port.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the preview URL, set once the container is running.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Returns the environment passed at creation time.
    #[must_use]
    pub const fn environment(&self) -> &EnvironmentVars {
        &self.environment
    }

    /// Returns the cached log snapshot.
    #[must_use]
    pub fn logs(&self) -> Option<&str> {
        self.logs.as_deref()
    }

    /// Returns the timestamp of the latest transition into `running`.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns the timestamp of the transition into a terminal status.
    #[must_use]
    pub const fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Records the identifier the engine assigned on creation.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentDomainError::EngineIdAlreadyAssigned`] when a
    /// different identifier is already recorded.
    pub fn attach_engine(
        &mut self,
        engine_id: EngineContainerId,
        clock: &impl Clock,
    ) -> Result<(), DeploymentDomainError> {
        if let Some(existing) = &self.engine_id {
            if *existing == engine_id {
                return Ok(());
            }
            return Err(DeploymentDomainError::EngineIdAlreadyAssigned(self.id));
        }
        self.engine_id = Some(engine_id);
        self.touch(clock);
        Ok(())
    }

    /// Marks the container as confirmed running and publishes its URL.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentDomainError::InvalidContainerTransition`] when the
    /// record is not `starting`.
    pub fn mark_running(
        &mut self,
        url: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), DeploymentDomainError> {
        self.transition_to(ContainerStatus::Running)?;
        let timestamp = clock.utc();
        self.url = Some(url.into());
        self.started_at = Some(timestamp);
        self.updated_at = timestamp;
        Ok(())
    }

    /// Moves a running container back to `starting` for an in-place restart.
    ///
    /// A record that is already `starting` is left as is.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentDomainError::InvalidContainerTransition`] when the
    /// record is terminal.
    pub fn begin_restart(&mut self, clock: &impl Clock) -> Result<(), DeploymentDomainError> {
        if self.status != ContainerStatus::Starting {
            self.transition_to(ContainerStatus::Starting)?;
        }
        self.touch(clock);
        Ok(())
    }

    /// Marks the container as intentionally stopped.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentDomainError::InvalidContainerTransition`] when the
    /// record is already terminal.
    pub fn mark_stopped(&mut self, clock: &impl Clock) -> Result<(), DeploymentDomainError> {
        self.transition_to(ContainerStatus::Stopped)?;
        self.close(clock);
        Ok(())
    }

    /// Marks the container as failed and appends `reason` to the log cache.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentDomainError::InvalidContainerTransition`] when the
    /// record is already terminal.
    pub fn mark_failed(
        &mut self,
        reason: &str,
        clock: &impl Clock,
    ) -> Result<(), DeploymentDomainError> {
        self.transition_to(ContainerStatus::Error)?;
        let mut snapshot = self.logs.take().unwrap_or_default();
        if !snapshot.is_empty() && !snapshot.ends_with('\n') {
            snapshot.push('\n');
        }
        snapshot.push_str(FAILURE_NOTE_PREFIX);
        snapshot.push_str(reason.trim());
        self.logs = Some(trim_to_recent_lines(&snapshot));
        self.close(clock);
        Ok(())
    }

    /// Replaces the cached log snapshot with the most recent lines of `logs`.
    ///
    /// Failure notes already recorded on the row are kept after the new
    /// output.
    pub fn cache_logs(&mut self, logs: &str, clock: &impl Clock) {
        self.logs = Some(trim_to_recent_lines(&self.annotate_logs(logs)));
        self.touch(clock);
    }

    /// Returns the failure notes recorded in the log snapshot.
    pub fn failure_notes(&self) -> impl Iterator<Item = &str> {
        self.logs
            .as_deref()
            .unwrap_or_default()
            .lines()
            .filter(|line| line.starts_with(FAILURE_NOTE_PREFIX))
    }

    /// Appends this row's failure notes that `logs` does not already carry.
    #[must_use]
    pub fn annotate_logs(&self, logs: &str) -> String {
        let mut annotated = logs.trim_end_matches('\n').to_owned();
        for note in self.failure_notes() {
            if logs.lines().any(|line| line == note) {
                continue;
            }
            if !annotated.is_empty() {
                annotated.push('\n');
            }
            annotated.push_str(note);
        }
        annotated
    }

    fn close(&mut self, clock: &impl Clock) {
        let timestamp = clock.utc();
        self.stopped_at = Some(timestamp);
        self.updated_at = timestamp;
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }

    fn transition_to(&mut self, target: ContainerStatus) -> Result<(), DeploymentDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(DeploymentDomainError::InvalidContainerTransition {
                from: self.status.as_str().to_owned(),
                to: target.as_str().to_owned(),
            });
        }
        self.status = target;
        Ok(())
    }
}

fn trim_to_recent_lines(logs: &str) -> String {
    let line_count = logs.lines().count();
    let skip = line_count.saturating_sub(LOG_SNAPSHOT_LINES);
    logs.lines().skip(skip).collect::<Vec<_>>().join("\n")
}
