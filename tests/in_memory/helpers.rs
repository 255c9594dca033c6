//! Shared harness for in-memory orchestration tests.

use mockable::DefaultClock;
use pavilion::deployment::{
    adapters::{
        InMemoryContainerEngine,
        memory::{
            InMemoryArtifactSource, InMemoryContainerRepository, InMemoryProjectRepository,
            StaticPortProbe,
        },
    },
    domain::{
        ContainerRecord, PortRange, Project, ProjectId, ProjectSettings, ProjectStatus, Subdomain,
    },
    ports::{BuildArtifacts, ContainerRepository, ProjectRepository},
    services::{
        DeploymentOrchestrator, HealthSettings, OrchestratorPorts, OrchestratorSettings,
        PreviewUrlSettings,
    },
};
use rstest::fixture;
use std::sync::Arc;
use std::time::Duration;

/// Orchestrator wired entirely to in-memory adapters.
pub type TestOrchestrator = DeploymentOrchestrator<
    InMemoryContainerRepository,
    InMemoryProjectRepository,
    InMemoryContainerEngine,
    InMemoryArtifactSource,
    StaticPortProbe,
    DefaultClock,
>;

/// Orchestrator plus handles on every adapter it drives.
pub struct Harness {
    pub containers: Arc<InMemoryContainerRepository>,
    pub projects: Arc<InMemoryProjectRepository>,
    pub engine: Arc<InMemoryContainerEngine>,
    pub artifacts: Arc<InMemoryArtifactSource>,
    pub probe: Arc<StaticPortProbe>,
    pub orchestrator: Arc<TestOrchestrator>,
}

/// Settings with short polling windows so failure paths finish quickly.
#[must_use]
pub fn fast_settings(start: u16, end: u16) -> OrchestratorSettings {
    OrchestratorSettings {
        port_range: PortRange::new(start, end).expect("valid port range"),
        container_prefix: "pavilion".to_owned(),
        preview: PreviewUrlSettings::default(),
        health: HealthSettings {
            interval: Duration::from_millis(10),
            readiness_timeout: Duration::from_millis(300),
            memory_pressure_percent: 95.0,
        },
        stale_starting_grace: Duration::ZERO,
    }
}

/// Artifacts every project deploys with unless a test publishes others.
#[must_use]
pub fn default_artifacts() -> BuildArtifacts {
    BuildArtifacts::new("node:20-alpine", 3000)
        .with_env("NODE_ENV", "development")
        .with_mount("/var/lib/pavilion/builds", "/app")
}

impl Harness {
    /// Builds a harness allocating ports from `start..=end`.
    #[must_use]
    pub fn with_settings(settings: OrchestratorSettings) -> Self {
        let containers = Arc::new(InMemoryContainerRepository::new());
        let projects = Arc::new(InMemoryProjectRepository::new());
        let engine = Arc::new(InMemoryContainerEngine::new());
        let artifacts = Arc::new(InMemoryArtifactSource::serving(default_artifacts()));
        let probe = Arc::new(StaticPortProbe::new());
        let orchestrator = Arc::new(DeploymentOrchestrator::new(
            OrchestratorPorts {
                containers: Arc::clone(&containers),
                projects: Arc::clone(&projects),
                engine: Arc::clone(&engine),
                artifacts: Arc::clone(&artifacts),
                probe: Arc::clone(&probe),
                clock: Arc::new(DefaultClock),
            },
            settings,
        ));

        Self {
            containers,
            projects,
            engine,
            artifacts,
            probe,
            orchestrator,
        }
    }

    /// Seeds a draft project and returns its identifier.
    #[must_use]
    pub fn add_project(&self) -> ProjectId {
        self.seed(Project::new(ProjectSettings::default(), &DefaultClock))
    }

    /// Seeds a draft project with a preview subdomain.
    #[must_use]
    pub fn add_project_with_subdomain(&self, subdomain: &str) -> ProjectId {
        let project = Project::new(ProjectSettings::default(), &DefaultClock)
            .with_subdomain(Subdomain::new(subdomain).expect("valid subdomain"));
        self.seed(project)
    }

    fn seed(&self, project: Project) -> ProjectId {
        let id = project.id();
        self.projects.insert(project).expect("seed project");
        id
    }

    /// Returns the persisted project status.
    pub async fn project_status(&self, project_id: ProjectId) -> ProjectStatus {
        self.projects
            .find_by_id(project_id)
            .await
            .expect("project lookup")
            .expect("project exists")
            .status()
    }

    /// Returns every container row of the project, oldest first.
    pub async fn records(&self, project_id: ProjectId) -> Vec<ContainerRecord> {
        self.containers
            .list_for_project(project_id)
            .await
            .expect("list container rows")
    }

    /// Returns every active row across all projects.
    pub async fn active_records(&self) -> Vec<ContainerRecord> {
        self.containers.list_active().await.expect("list active rows")
    }
}

/// Harness allocating from a ten-port range.
#[fixture]
pub fn harness() -> Harness {
    Harness::with_settings(fast_settings(3000, 3009))
}

/// Harness allocating from exactly two ports.
#[fixture]
pub fn narrow_harness() -> Harness {
    Harness::with_settings(fast_settings(3000, 3001))
}
