//! Shared world state for deployment lifecycle BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use mockable::DefaultClock;
use pavilion::deployment::{
    adapters::{
        InMemoryContainerEngine,
        memory::{
            InMemoryArtifactSource, InMemoryContainerRepository, InMemoryProjectRepository,
            StaticPortProbe,
        },
    },
    domain::{EngineContainerId, PortRange, ProjectId},
    ports::BuildArtifacts,
    services::{
        DeployOutcome, DeploymentOrchestrator, DeploymentResult, HealthSettings,
        OrchestratorPorts, OrchestratorSettings, OrphanSweepReport, PreviewUrlSettings,
    },
};
use rstest::fixture;

/// Orchestrator type used by the BDD world.
pub type TestOrchestrator = DeploymentOrchestrator<
    InMemoryContainerRepository,
    InMemoryProjectRepository,
    InMemoryContainerEngine,
    InMemoryArtifactSource,
    StaticPortProbe,
    DefaultClock,
>;

/// Scenario world for deployment lifecycle behaviour tests.
pub struct LifecycleWorld {
    pub containers: Arc<InMemoryContainerRepository>,
    pub projects: Arc<InMemoryProjectRepository>,
    pub engine: Arc<InMemoryContainerEngine>,
    pub orchestrator: TestOrchestrator,
    pub deployed: Vec<ProjectId>,
    pub current: Option<ProjectId>,
    pub last_deploy: Option<DeploymentResult<DeployOutcome>>,
    pub untracked: Option<EngineContainerId>,
    pub last_sweep: Option<OrphanSweepReport>,
}

impl LifecycleWorld {
    /// Creates a world allocating from a two-port range.
    #[must_use]
    pub fn new() -> Self {
        let containers = Arc::new(InMemoryContainerRepository::new());
        let projects = Arc::new(InMemoryProjectRepository::new());
        let engine = Arc::new(InMemoryContainerEngine::new());
        let artifacts = Arc::new(InMemoryArtifactSource::serving(
            BuildArtifacts::new("node:20-alpine", 3000).with_env("NODE_ENV", "development"),
        ));
        let settings = OrchestratorSettings {
            port_range: PortRange::new(3000, 3001).expect("valid port range"),
            container_prefix: "pavilion".to_owned(),
            preview: PreviewUrlSettings::default(),
            health: HealthSettings {
                interval: Duration::from_millis(10),
                readiness_timeout: Duration::from_millis(300),
                memory_pressure_percent: 95.0,
            },
            stale_starting_grace: Duration::ZERO,
        };
        let orchestrator = DeploymentOrchestrator::new(
            OrchestratorPorts {
                containers: Arc::clone(&containers),
                projects: Arc::clone(&projects),
                engine: Arc::clone(&engine),
                artifacts,
                probe: Arc::new(StaticPortProbe::new()),
                clock: Arc::new(DefaultClock),
            },
            settings,
        );

        Self {
            containers,
            projects,
            engine,
            orchestrator,
            deployed: Vec::new(),
            current: None,
            last_deploy: None,
            untracked: None,
            last_sweep: None,
        }
    }
}

impl Default for LifecycleWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> LifecycleWorld {
    LifecycleWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
