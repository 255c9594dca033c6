//! Domain model for project deployments and container records.
//!
//! The deployment domain models project and container status state machines,
//! port ranges, preview URLs and health classification. Infrastructure
//! concerns remain outside this boundary.

mod container;
mod error;
mod health;
mod ids;
mod port_range;
mod project;

pub use container::{
    ContainerRecord, ContainerStatus, EnvironmentVars, FAILURE_NOTE_PREFIX, LOG_SNAPSHOT_LINES,
    PersistedContainerData,
};
pub use error::{DeploymentDomainError, ParseContainerStatusError, ParseProjectStatusError};
pub use health::{Freshness, HealthReport, HealthStatus};
pub use ids::{ContainerName, ContainerRecordId, EngineContainerId, ProjectId, Subdomain};
pub use port_range::PortRange;
pub use project::{PersistedProjectData, Project, ProjectSettings, ProjectStatus};
