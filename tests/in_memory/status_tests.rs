//! In-memory integration tests for status, logs and active listings.

use super::helpers::{Harness, harness};
use pavilion::deployment::{
    domain::{ContainerStatus, Freshness, HealthStatus, ProjectStatus},
    ports::{EngineContainerState, PROJECT_LABEL},
    services::DeploymentError,
};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn status_of_undeployed_project_is_unknown(harness: Harness) {
    let project_id = harness.add_project();

    let report = harness
        .orchestrator
        .status(project_id)
        .await
        .expect("status should succeed");

    assert_eq!(report.container, None);
    assert_eq!(report.health.status(), HealthStatus::Unknown);
    assert_eq!(report.freshness, Freshness::Live);
    assert_eq!(report.uptime, None);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn running_container_reports_healthy_with_usage(harness: Harness) {
    let project_id = harness.add_project();
    harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");

    let report = harness
        .orchestrator
        .status(project_id)
        .await
        .expect("status should succeed");

    assert_eq!(report.status(), Some(ContainerStatus::Running));
    assert!(report.is_healthy(), "report: {report:?}");
    assert!(report.cpu_percent.is_some());
    assert!(report.memory_percent.is_some());
    assert!(report.memory_usage.is_some());
    assert!(report.uptime.is_some());
    assert_eq!(report.freshness, Freshness::Live);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn memory_pressure_is_reported_unhealthy(harness: Harness) {
    let project_id = harness.add_project();
    let deployed = harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness
        .engine
        .set_memory_percent(deployed.engine_id().expect("engine id"), 97.0);

    let report = harness
        .orchestrator
        .status(project_id)
        .await
        .expect("status should succeed");

    assert_eq!(report.health.status(), HealthStatus::Unhealthy);
    let message = report.message().expect("pressure message");
    assert!(message.contains("memory"), "message: {message}");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn killed_process_is_reported_with_its_exit_code(harness: Harness) {
    let project_id = harness.add_project();
    let deployed = harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness.engine.kill(deployed.engine_id().expect("engine id"));

    let report = harness
        .orchestrator
        .status(project_id)
        .await
        .expect("status should succeed");

    assert_eq!(report.health.status(), HealthStatus::Unhealthy);
    let message = report.message().expect("exit message");
    assert!(message.contains("137"), "message: {message}");
    // Status reads through; it does not rewrite the row.
    assert_eq!(report.status(), Some(ContainerStatus::Running));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreachable_engine_yields_stale_persisted_state(harness: Harness) {
    let project_id = harness.add_project();
    harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness.engine.set_unavailable(true);

    let report = harness
        .orchestrator
        .status(project_id)
        .await
        .expect("status should still succeed");

    assert!(report.freshness.is_stale());
    assert_eq!(report.health.status(), HealthStatus::Unknown);
    assert_eq!(report.status(), Some(ContainerStatus::Running));
    assert_eq!(harness.project_status(project_id).await, ProjectStatus::Ready);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stopped_container_is_reported_without_consulting_the_engine(harness: Harness) {
    let project_id = harness.add_project();
    harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness.orchestrator.stop(project_id).await.expect("stop");
    harness.engine.set_unavailable(true);

    let report = harness
        .orchestrator
        .status(project_id)
        .await
        .expect("status should succeed");

    assert_eq!(report.status(), Some(ContainerStatus::Stopped));
    assert_eq!(report.health.status(), HealthStatus::Unknown);
    assert_eq!(report.freshness, Freshness::Live);
    assert_eq!(report.uptime, None);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn logs_are_read_from_the_engine(harness: Harness) {
    let project_id = harness.add_project();
    let deployed = harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    let engine_id = deployed.engine_id().expect("engine id");
    harness.engine.push_log(engine_id, "GET / 200");
    harness.engine.push_log(engine_id, "GET /about 200");

    let all = harness
        .orchestrator
        .logs(project_id, None)
        .await
        .expect("logs should succeed");
    let tail = harness
        .orchestrator
        .logs(project_id, Some(1))
        .await
        .expect("tailed logs should succeed");

    assert_eq!(all.freshness, Freshness::Live);
    assert!(all.logs.contains("listening on port 3000"), "logs: {}", all.logs);
    assert!(all.logs.ends_with("GET /about 200"), "logs: {}", all.logs);
    assert_eq!(tail.logs, "GET /about 200");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn logs_of_project_without_container_are_rejected(harness: Harness) {
    let project_id = harness.add_project();

    let result = harness.orchestrator.logs(project_id, None).await;

    assert!(matches!(result, Err(DeploymentError::NoContainer(id)) if id == project_id));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreachable_engine_without_snapshot_fails_logs(harness: Harness) {
    let project_id = harness.add_project();
    harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness.engine.set_unavailable(true);

    let err = harness
        .orchestrator
        .logs(project_id, Some(10))
        .await
        .expect_err("logs should fail without a snapshot");

    assert!(err.is_engine_unavailable());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreachable_engine_serves_the_cached_snapshot_as_stale(harness: Harness) {
    let project_id = harness.add_project();
    harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness
        .orchestrator
        .logs(project_id, None)
        .await
        .expect("full read refreshes the snapshot");
    harness.engine.set_unavailable(true);

    let outcome = harness
        .orchestrator
        .logs(project_id, Some(1))
        .await
        .expect("cached logs should be served");

    assert!(outcome.freshness.is_stale());
    assert_eq!(outcome.logs, "listening on port 3000");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stopped_container_logs_come_from_the_snapshot(harness: Harness) {
    let project_id = harness.add_project();
    let deployed = harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness.orchestrator.stop(project_id).await.expect("stop");
    harness
        .engine
        .forget(deployed.engine_id().expect("engine id"));

    let outcome = harness
        .orchestrator
        .logs(project_id, None)
        .await
        .expect("snapshot should be served");

    assert_eq!(outcome.freshness, Freshness::Live);
    assert!(outcome.logs.ends_with("stopped"), "logs: {}", outcome.logs);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn list_active_includes_untracked_and_skips_exited(harness: Harness) {
    let running = harness.add_project();
    let stopped = harness.add_project();
    let live = harness
        .orchestrator
        .deploy(running)
        .await
        .expect("deploy should succeed");
    let halted = harness
        .orchestrator
        .deploy(stopped)
        .await
        .expect("deploy should succeed");
    harness.orchestrator.stop(stopped).await.expect("stop");
    let untracked = harness.engine.spawn_untracked("leftover");

    let active = harness
        .orchestrator
        .list_active()
        .await
        .expect("listing should succeed");

    let ids: Vec<_> = active.iter().map(|summary| summary.id.clone()).collect();
    assert_eq!(active.len(), 2, "active: {active:?}");
    assert!(ids.contains(live.engine_id().expect("engine id")));
    assert!(ids.contains(&untracked));
    assert!(!ids.contains(halted.engine_id().expect("engine id")));
    assert!(
        active
            .iter()
            .all(|summary| summary.state == EngineContainerState::Running)
    );
    let leftover = active
        .iter()
        .find(|summary| summary.id == untracked)
        .expect("untracked container listed");
    assert_eq!(
        leftover.labels.get(PROJECT_LABEL).map(String::as_str),
        Some("leftover")
    );
}
