//! Port contracts for container lifecycle orchestration.

mod artifacts;
mod engine;
mod port_probe;
mod repository;

pub use artifacts::{ArtifactError, BindMount, BuildArtifactSource, BuildArtifacts};
pub use engine::{
    CommandOutput, CommandRunner, ContainerEngine, ContainerInspection, ContainerSpec,
    ContainerStats, EngineCommand, EngineContainerState, EngineContainerSummary, EngineError,
    EngineOperation, EngineResult, MANAGED_LABEL, PROJECT_LABEL, ProbeStatus, RECORD_LABEL,
};
pub use port_probe::PortProbe;
pub use repository::{ContainerRepository, ProjectRepository, StoreError, StoreResult};

#[cfg(test)]
pub(crate) use engine::MockCommandRunner;
