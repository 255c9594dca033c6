//! Service-level errors for deployment lifecycle operations.

use super::PortAllocationError;
use crate::deployment::{
    domain::{DeploymentDomainError, PortRange, ProjectId},
    ports::{ArtifactError, EngineError, StoreError},
};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`DeploymentOrchestrator`](super::DeploymentOrchestrator)
/// and [`CleanupReaper`](super::CleanupReaper).
#[derive(Debug, Clone, Error)]
pub enum DeploymentError {
    /// No project exists with the given identifier.
    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),

    /// The project has never had a container.
    #[error("project {0} has no container")]
    NoContainer(ProjectId),

    /// Every port in the allocation range is taken.
    #[error("no ports available in range {0}")]
    NoPortsAvailable(PortRange),

    /// Build artifacts could not be obtained.
    #[error(transparent)]
    Artifacts(#[from] ArtifactError),

    /// The container engine failed or is unreachable.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The container did not report healthy within the readiness window.
    #[error("project {project_id} container not ready after {timeout:?}: {reason}")]
    ReadinessTimedOut {
        /// Project being deployed.
        project_id: ProjectId,
        /// Readiness window that elapsed.
        timeout: Duration,
        /// Last health observation.
        reason: String,
    },

    /// The container process ended before becoming healthy.
    #[error("project {project_id} container exited during startup: {reason}")]
    StartupFailed {
        /// Project being deployed.
        project_id: ProjectId,
        /// Exit description.
        reason: String,
    },

    /// A stop, restart or delete on the same project cancelled this
    /// operation while it waited for readiness.
    #[error("deployment of project {0} was cancelled")]
    Cancelled(ProjectId),

    /// A domain invariant rejected a transition.
    #[error(transparent)]
    Domain(#[from] DeploymentDomainError),

    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Free ports could not be probed.
    #[error("port probe failed: {0}")]
    PortProbe(String),
}

impl DeploymentError {
    /// Returns whether the failure means the container engine is down, as
    /// opposed to a problem with this deployment.
    #[must_use]
    pub const fn is_engine_unavailable(&self) -> bool {
        matches!(self, Self::Engine(EngineError::Unavailable(_)))
    }
}

impl From<PortAllocationError> for DeploymentError {
    fn from(err: PortAllocationError) -> Self {
        match err {
            PortAllocationError::NoPortsAvailable(range) => Self::NoPortsAvailable(range),
            PortAllocationError::Store(store) => Self::Store(store),
            PortAllocationError::ProbeFailed(reason) => Self::PortProbe(reason),
        }
    }
}

/// Result type for deployment lifecycle operations.
pub type DeploymentResult<T> = Result<T, DeploymentError>;
