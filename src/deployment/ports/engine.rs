//! Container engine port: the single point of contact with the OS-level
//! container runtime.

use super::BindMount;
use crate::deployment::domain::{ContainerName, EngineContainerId, EnvironmentVars};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Label marking containers created by this orchestrator.
pub const MANAGED_LABEL: &str = "pavilion.managed";

/// Label carrying the owning project identifier.
pub const PROJECT_LABEL: &str = "pavilion.project";

/// Label carrying the container record identifier.
pub const RECORD_LABEL: &str = "pavilion.record";

/// Result type for container engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine operation, used to tag failures and pick timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOperation {
    /// Create a container from a specification.
    Create,
    /// Start a created container.
    Start,
    /// Stop a running container.
    Stop,
    /// Restart a container in place.
    Restart,
    /// Remove a container.
    Remove,
    /// Inspect container state.
    Inspect,
    /// Fetch container logs.
    Logs,
    /// Sample resource usage.
    Stats,
    /// List managed containers.
    List,
}

impl EngineOperation {
    /// Returns the operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Remove => "remove",
            Self::Inspect => "inspect",
            Self::Logs => "logs",
            Self::Stats => "stats",
            Self::List => "list",
        }
    }
}

impl fmt::Display for EngineOperation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Errors returned by container engine adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine daemon cannot be reached. Nothing works until this is
    /// resolved externally.
    #[error("container engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran the command and it exited unsuccessfully.
    #[error("container engine {operation} failed (exit code {exit_code:?}): {stderr}")]
    CommandFailed {
        /// Failed operation.
        operation: EngineOperation,
        /// Process exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The command did not finish within its hard timeout.
    #[error("container engine {operation} timed out after {timeout:?}")]
    TimedOut {
        /// Operation that hung.
        operation: EngineOperation,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The referenced container does not exist.
    #[error("container {0} not found")]
    NotFound(String),

    /// The engine produced output that could not be parsed.
    #[error("container engine {operation} returned malformed output: {reason}")]
    MalformedOutput {
        /// Operation whose output was malformed.
        operation: EngineOperation,
        /// Parse failure detail.
        reason: String,
    },
}

impl EngineError {
    /// Returns whether the engine itself is unreachable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Returns whether the referenced container is gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Structured result of one engine process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Whether the process exited successfully.
    pub ok: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
}

/// One invocation of the engine binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    /// Operation the invocation performs.
    pub operation: EngineOperation,
    /// Arguments passed to the engine binary.
    pub args: Vec<String>,
    /// Hard timeout for the invocation.
    pub timeout: Duration,
}

/// Raw process execution with a hard timeout.
///
/// Spawn failures that mean the engine binary is missing are reported as
/// [`EngineError::Unavailable`]; an elapsed timeout as
/// [`EngineError::TimedOut`]. Non-zero exits are returned as output with
/// `ok == false` for the caller to classify.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the engine binary with the command's arguments.
    async fn run(&self, command: EngineCommand) -> EngineResult<CommandOutput>;
}

/// Parameters for creating a preview container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Engine-facing container name.
    pub name: ContainerName,
    /// Image to run.
    pub image: String,
    /// Host port published for the preview.
    pub host_port: u16,
    /// Port the application listens on inside the container.
    pub container_port: u16,
    /// Environment passed to the process.
    pub environment: EnvironmentVars,
    /// Labels attached to the container.
    pub labels: BTreeMap<String, String>,
    /// Optional bind mount of build artifacts.
    pub mount: Option<BindMount>,
}

/// Process state reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineContainerState {
    /// Created but never started.
    Created,
    /// Process is running.
    Running,
    /// Engine is restarting the process.
    Restarting,
    /// Process is paused.
    Paused,
    /// Process exited.
    Exited,
    /// Process is dead and cannot be restarted.
    Dead,
    /// State string the adapter does not recognise.
    Unknown,
}

impl EngineContainerState {
    /// Parses an engine state string.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "restarting" => Self::Restarting,
            "paused" => Self::Paused,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }

    /// Returns the canonical state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Restarting => "restarting",
            Self::Paused => "paused",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        }
    }

    /// Returns whether the process has ended for good.
    #[must_use]
    pub const fn has_ended(self) -> bool {
        matches!(self, Self::Exited | Self::Dead)
    }
}

impl fmt::Display for EngineContainerState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// State of a container's internal health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeStatus {
    /// Probe has not passed yet.
    Starting,
    /// Probe passes.
    Healthy,
    /// Probe fails.
    Unhealthy,
}

/// Result of inspecting a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInspection {
    /// Process state.
    pub state: EngineContainerState,
    /// Exit code of the last run, when the process ended.
    pub exit_code: Option<i64>,
    /// Whether the process was killed for exceeding its memory limit.
    pub oom_killed: bool,
    /// Start time of the current run.
    pub started_at: Option<DateTime<Utc>>,
    /// Internal health probe state, when the image defines one.
    pub probe: Option<ProbeStatus>,
    /// Engine-reported error, if any.
    pub error: Option<String>,
}

/// Point-in-time resource usage of a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerStats {
    /// CPU usage in percent of one core.
    pub cpu_percent: f64,
    /// Memory usage in percent of the container limit.
    pub memory_percent: f64,
    /// Human-readable memory usage, as reported by the engine.
    pub memory_usage: String,
}

/// Fleet-wide summary of one managed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineContainerSummary {
    /// Engine-assigned identifier.
    pub id: EngineContainerId,
    /// Container name.
    pub name: String,
    /// Process state.
    pub state: EngineContainerState,
    /// Published port description.
    pub ports: String,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
}

impl EngineContainerSummary {
    /// Returns the owning project label, if present.
    #[must_use]
    pub fn project_label(&self) -> Option<&str> {
        self.labels.get(PROJECT_LABEL).map(String::as_str)
    }
}

/// Container lifecycle control contract.
///
/// Each adapter enforces a hard timeout per call and never retries; retry
/// policy belongs to the orchestrator.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Creates a container and returns the engine-assigned identifier.
    async fn create(&self, spec: &ContainerSpec) -> EngineResult<EngineContainerId>;

    /// Starts a created container.
    async fn start(&self, container: &EngineContainerId) -> EngineResult<()>;

    /// Stops a running container.
    async fn stop(&self, container: &EngineContainerId) -> EngineResult<()>;

    /// Restarts a container in place, keeping its port bindings.
    async fn restart(&self, container: &EngineContainerId) -> EngineResult<()>;

    /// Removes a container, killing it first when `force` is set.
    async fn remove(&self, container: &EngineContainerId, force: bool) -> EngineResult<()>;

    /// Reports the process state of a container.
    async fn inspect(&self, container: &EngineContainerId) -> EngineResult<ContainerInspection>;

    /// Fetches container logs, limited to the last `tail` lines when given.
    async fn logs(&self, container: &EngineContainerId, tail: Option<u32>) -> EngineResult<String>;

    /// Samples container resource usage.
    async fn stats(&self, container: &EngineContainerId) -> EngineResult<ContainerStats>;

    /// Lists every container carrying [`MANAGED_LABEL`], in any state.
    async fn list_managed(&self) -> EngineResult<Vec<EngineContainerSummary>>;
}
