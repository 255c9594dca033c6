//! In-memory container engine for deterministic lifecycle flows and tests.

use crate::deployment::{
    domain::EngineContainerId,
    ports::{
        ContainerEngine, ContainerInspection, ContainerSpec, ContainerStats, EngineContainerState,
        EngineContainerSummary, EngineError, EngineOperation, EngineResult, MANAGED_LABEL,
        PROJECT_LABEL, ProbeStatus,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// How fake containers behave once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FakeReadiness {
    /// The process runs and reports healthy straight away.
    #[default]
    Immediate,
    /// The process runs but its probe stays `starting` until
    /// [`InMemoryContainerEngine::mark_ready`] is called.
    Pending,
    /// The process exits with a non-zero code right after starting.
    ExitOnStart,
}

/// In-memory container engine.
///
/// Models container lifecycle without touching a real runtime. Failures can
/// be injected per operation, and the whole engine can be made unreachable.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContainerEngine {
    state: Arc<RwLock<FakeEngineState>>,
}

#[derive(Debug, Default)]
struct FakeEngineState {
    containers: HashMap<String, FakeContainer>,
    next_id: u64,
    unavailable: bool,
    readiness: FakeReadiness,
    latency: Duration,
    failures: HashMap<EngineOperation, VecDeque<EngineError>>,
    calls: HashMap<EngineOperation, usize>,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    name: String,
    host_port: u16,
    container_port: u16,
    labels: BTreeMap<String, String>,
    state: EngineContainerState,
    probe: Option<ProbeStatus>,
    exit_code: Option<i64>,
    memory_percent: f64,
    logs: Vec<String>,
}

impl FakeContainer {
    fn boot(&mut self, readiness: FakeReadiness) {
        match readiness {
            FakeReadiness::Immediate => {
                self.state = EngineContainerState::Running;
                self.probe = None;
                self.exit_code = None;
                self.logs
                    .push(format!("listening on port {}", self.container_port));
            }
            FakeReadiness::Pending => {
                self.state = EngineContainerState::Running;
                self.probe = Some(ProbeStatus::Starting);
                self.exit_code = None;
                self.logs.push("starting up".to_owned());
            }
            FakeReadiness::ExitOnStart => {
                self.state = EngineContainerState::Exited;
                self.probe = None;
                self.exit_code = Some(1);
                self.logs.push("fatal: application crashed".to_owned());
            }
        }
    }
}

impl FakeEngineState {
    fn enter(&mut self, operation: EngineOperation) -> EngineResult<()> {
        *self.calls.entry(operation).or_default() += 1;
        if self.unavailable {
            return Err(EngineError::Unavailable(
                "in-memory engine is offline".to_owned(),
            ));
        }
        if let Some(err) = self
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(())
    }

    fn container_mut(&mut self, id: &EngineContainerId) -> EngineResult<&mut FakeContainer> {
        self.containers
            .get_mut(id.as_str())
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }
}

impl InMemoryContainerEngine {
    /// Creates an empty engine whose containers become ready immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, FakeEngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FakeEngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets how containers started from now on behave.
    pub fn set_readiness(&self, readiness: FakeReadiness) {
        self.write().readiness = readiness;
    }

    /// Makes every call sleep for `latency` before acting.
    pub fn set_latency(&self, latency: Duration) {
        self.write().latency = latency;
    }

    /// Makes the engine unreachable, or reachable again.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    /// Queues a failure for the next call of `operation`.
    pub fn fail_next(&self, operation: EngineOperation, err: EngineError) {
        self.write()
            .failures
            .entry(operation)
            .or_default()
            .push_back(err);
    }

    /// Flips a pending container's probe to healthy.
    pub fn mark_ready(&self, id: &EngineContainerId) {
        if let Some(container) = self.write().containers.get_mut(id.as_str()) {
            container.probe = Some(ProbeStatus::Healthy);
            container
                .logs
                .push(format!("listening on port {}", container.container_port));
        }
    }

    /// Simulates the process dying outside the orchestrator's control.
    pub fn kill(&self, id: &EngineContainerId) {
        if let Some(container) = self.write().containers.get_mut(id.as_str()) {
            container.state = EngineContainerState::Exited;
            container.exit_code = Some(137);
            container.logs.push("killed".to_owned());
        }
    }

    /// Removes a container behind the orchestrator's back.
    pub fn forget(&self, id: &EngineContainerId) {
        self.write().containers.remove(id.as_str());
    }

    /// Sets the memory usage reported for a container.
    pub fn set_memory_percent(&self, id: &EngineContainerId, percent: f64) {
        if let Some(container) = self.write().containers.get_mut(id.as_str()) {
            container.memory_percent = percent;
        }
    }

    /// Appends a line to a container's output.
    pub fn push_log(&self, id: &EngineContainerId, line: impl Into<String>) {
        if let Some(container) = self.write().containers.get_mut(id.as_str()) {
            container.logs.push(line.into());
        }
    }

    /// Starts a managed container that has no container record, as a crash
    /// between engine creation and persistence would leave behind.
    pub fn spawn_untracked(&self, project_label: &str) -> EngineContainerId {
        let mut state = self.write();
        state.next_id += 1;
        let id = format!("{:012x}", state.next_id);
        let labels = BTreeMap::from([
            (MANAGED_LABEL.to_owned(), "true".to_owned()),
            (PROJECT_LABEL.to_owned(), project_label.to_owned()),
        ]);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: format!("untracked-{id}"),
                host_port: 0,
                container_port: 0,
                labels,
                state: EngineContainerState::Running,
                probe: None,
                exit_code: None,
                memory_percent: 0.0,
                logs: Vec::new(),
            },
        );
        EngineContainerId::from_trusted(id)
    }

    /// Returns whether the engine knows the container.
    #[must_use]
    pub fn contains(&self, id: &EngineContainerId) -> bool {
        self.read().containers.contains_key(id.as_str())
    }

    /// Returns the process state of a container, if it exists.
    #[must_use]
    pub fn state_of(&self, id: &EngineContainerId) -> Option<EngineContainerState> {
        self.read()
            .containers
            .get(id.as_str())
            .map(|container| container.state)
    }

    /// Returns the host port a container publishes, if it exists.
    #[must_use]
    pub fn host_port_of(&self, id: &EngineContainerId) -> Option<u16> {
        self.read()
            .containers
            .get(id.as_str())
            .map(|container| container.host_port)
    }

    /// Returns the number of containers in the running state.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.read()
            .containers
            .values()
            .filter(|container| container.state == EngineContainerState::Running)
            .count()
    }

    /// Returns the number of containers the engine knows, in any state.
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.read().containers.len()
    }

    /// Returns how many times `operation` was invoked.
    #[must_use]
    pub fn call_count(&self, operation: EngineOperation) -> usize {
        self.read().calls.get(&operation).copied().unwrap_or_default()
    }

    async fn pause(&self) {
        let latency = self.read().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ContainerEngine for InMemoryContainerEngine {
    async fn create(&self, spec: &ContainerSpec) -> EngineResult<EngineContainerId> {
        self.pause().await;
        let mut state = self.write();
        state.enter(EngineOperation::Create)?;

        if state
            .containers
            .values()
            .any(|container| container.name == spec.name.as_str())
        {
            return Err(EngineError::CommandFailed {
                operation: EngineOperation::Create,
                exit_code: Some(125),
                stderr: format!("container name {} is already in use", spec.name),
            });
        }

        state.next_id += 1;
        let id = format!("{:012x}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: spec.name.as_str().to_owned(),
                host_port: spec.host_port,
                container_port: spec.container_port,
                labels: spec.labels.clone(),
                state: EngineContainerState::Created,
                probe: None,
                exit_code: None,
                memory_percent: 1.0,
                logs: vec![format!("created from image {}", spec.image)],
            },
        );
        Ok(EngineContainerId::from_trusted(id))
    }

    async fn start(&self, container: &EngineContainerId) -> EngineResult<()> {
        self.pause().await;
        let mut state = self.write();
        state.enter(EngineOperation::Start)?;
        let readiness = state.readiness;
        state.container_mut(container)?.boot(readiness);
        Ok(())
    }

    async fn stop(&self, container: &EngineContainerId) -> EngineResult<()> {
        self.pause().await;
        let mut state = self.write();
        state.enter(EngineOperation::Stop)?;
        let entry = state.container_mut(container)?;
        if entry.state != EngineContainerState::Exited {
            entry.state = EngineContainerState::Exited;
            entry.exit_code = Some(0);
            entry.logs.push("stopped".to_owned());
        }
        Ok(())
    }

    async fn restart(&self, container: &EngineContainerId) -> EngineResult<()> {
        self.pause().await;
        let mut state = self.write();
        state.enter(EngineOperation::Restart)?;
        let readiness = state.readiness;
        let entry = state.container_mut(container)?;
        entry.logs.push("restarting".to_owned());
        entry.boot(readiness);
        Ok(())
    }

    async fn remove(&self, container: &EngineContainerId, force: bool) -> EngineResult<()> {
        self.pause().await;
        let mut state = self.write();
        state.enter(EngineOperation::Remove)?;
        let entry = state.container_mut(container)?;
        if entry.state == EngineContainerState::Running && !force {
            return Err(EngineError::CommandFailed {
                operation: EngineOperation::Remove,
                exit_code: Some(1),
                stderr: "cannot remove a running container".to_owned(),
            });
        }
        state.containers.remove(container.as_str());
        Ok(())
    }

    async fn inspect(&self, container: &EngineContainerId) -> EngineResult<ContainerInspection> {
        let mut state = self.write();
        state.enter(EngineOperation::Inspect)?;
        let entry = state.container_mut(container)?;
        Ok(ContainerInspection {
            state: entry.state,
            exit_code: entry.exit_code,
            oom_killed: false,
            started_at: (entry.state == EngineContainerState::Running).then(Utc::now),
            probe: entry.probe,
            error: None,
        })
    }

    async fn logs(&self, container: &EngineContainerId, tail: Option<u32>) -> EngineResult<String> {
        let mut state = self.write();
        state.enter(EngineOperation::Logs)?;
        let entry = state.container_mut(container)?;
        let skip = tail.map_or(0, |tail| {
            entry
                .logs
                .len()
                .saturating_sub(usize::try_from(tail).unwrap_or(usize::MAX))
        });
        Ok(entry
            .logs
            .get(skip..)
            .map(|lines| lines.join("\n"))
            .unwrap_or_default())
    }

    async fn stats(&self, container: &EngineContainerId) -> EngineResult<ContainerStats> {
        let mut state = self.write();
        state.enter(EngineOperation::Stats)?;
        let entry = state.container_mut(container)?;
        Ok(ContainerStats {
            cpu_percent: 0.5,
            memory_percent: entry.memory_percent,
            memory_usage: format!("{:.1}%", entry.memory_percent),
        })
    }

    async fn list_managed(&self) -> EngineResult<Vec<EngineContainerSummary>> {
        let mut state = self.write();
        state.enter(EngineOperation::List)?;
        let mut summaries: Vec<_> = state
            .containers
            .iter()
            .filter(|(_, container)| {
                container.labels.get(MANAGED_LABEL).map(String::as_str) == Some("true")
            })
            .map(|(id, container)| EngineContainerSummary {
                id: EngineContainerId::from_trusted(id.clone()),
                name: container.name.clone(),
                state: container.state,
                ports: format!("{}->{}/tcp", container.host_port, container.container_port),
                labels: container.labels.clone(),
            })
            .collect();
        summaries.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(summaries)
    }
}
