//! Application services for deployment lifecycle orchestration.
//!
//! [`DeploymentOrchestrator`] owns every lifecycle write. It serialises
//! operations per project, allocates host ports, drives the container engine
//! and confirms readiness through [`HealthChecker`]. [`CleanupReaper`]
//! shares the orchestrator's locks to tear projects down and sweep orphaned
//! containers.

mod coordination;
mod error;
mod health;
mod orchestrator;
mod port_allocator;
mod reaper;

pub use error::{DeploymentError, DeploymentResult};
pub use health::{HealthChecker, HealthSettings, ReadinessOutcome};
pub use orchestrator::{
    DeleteProjectReport, DeployOutcome, DeploymentOrchestrator, DeploymentStatusReport,
    LogsOutcome, OrchestratorPorts, OrchestratorSettings, PreviewUrlSettings, RestartMode,
    RestartOutcome, StopOutcome,
};
pub use port_allocator::{PortAllocationError, PortAllocator, PortClaim};
pub use reaper::{CleanupReaper, OrphanSweepReport, ReapReport};
