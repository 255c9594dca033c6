//! In-memory integration tests for stopping previews.

use super::helpers::{Harness, harness, narrow_harness};
use pavilion::deployment::{
    adapters::FakeReadiness,
    domain::{ContainerRecord, ContainerStatus, ProjectId, ProjectStatus},
    ports::{EngineContainerState, EngineError, EngineOperation},
    services::DeploymentError,
};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

/// Waits until the project's starting row has been handed to the engine.
async fn wait_for_engine_row(harness: &Harness, project_id: ProjectId) -> ContainerRecord {
    for _ in 0..200 {
        if let Some(record) = harness
            .active_records()
            .await
            .into_iter()
            .find(|record| record.project_id() == project_id && record.engine_id().is_some())
        {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("deploy never created an engine container");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stop_closes_the_row_and_keeps_the_project_ready(harness: Harness) {
    let project_id = harness.add_project();
    let deployed = harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    let engine_id = deployed.engine_id().expect("engine id").clone();

    let outcome = harness
        .orchestrator
        .stop(project_id)
        .await
        .expect("stop should succeed");

    let stopped = outcome.stopped.expect("a container was stopped");
    assert_eq!(stopped.id(), deployed.container.id());
    assert_eq!(stopped.status(), ContainerStatus::Stopped);
    assert!(stopped.stopped_at().is_some());
    assert!(
        stopped.logs().is_some_and(|logs| logs.contains("stopped")),
        "stop should capture a log snapshot"
    );
    assert_eq!(
        harness.engine.state_of(&engine_id),
        Some(EngineContainerState::Exited)
    );
    assert_eq!(harness.project_status(project_id).await, ProjectStatus::Ready);
    assert!(harness.active_records().await.is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stop_without_active_container_changes_nothing(harness: Harness) {
    let project_id = harness.add_project();
    harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness
        .orchestrator
        .stop(project_id)
        .await
        .expect("first stop should succeed");
    let before = harness.records(project_id).await;

    let outcome = harness
        .orchestrator
        .stop(project_id)
        .await
        .expect("second stop should succeed");

    assert_eq!(outcome.stopped, None);
    assert_eq!(harness.records(project_id).await, before);
    assert_eq!(harness.engine.call_count(EngineOperation::Stop), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stop_of_never_deployed_project_is_a_no_op(harness: Harness) {
    let project_id = harness.add_project();

    let outcome = harness
        .orchestrator
        .stop(project_id)
        .await
        .expect("stop should succeed");

    assert_eq!(outcome.stopped, None);
    assert!(harness.records(project_id).await.is_empty());
    assert_eq!(harness.project_status(project_id).await, ProjectStatus::Draft);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stopped_port_is_reallocated_to_another_project(narrow_harness: Harness) {
    let first = narrow_harness.add_project();
    let second = narrow_harness.add_project();
    let third = narrow_harness.add_project();
    narrow_harness
        .orchestrator
        .deploy(first)
        .await
        .expect("first deploy");
    narrow_harness
        .orchestrator
        .deploy(second)
        .await
        .expect("second deploy");
    assert!(matches!(
        narrow_harness.orchestrator.deploy(third).await,
        Err(DeploymentError::NoPortsAvailable(_))
    ));

    narrow_harness.orchestrator.stop(first).await.expect("stop");
    let reused = narrow_harness
        .orchestrator
        .deploy(third)
        .await
        .expect("freed port should be allocatable");

    assert_eq!(reused.container.port(), Some(3000));
    assert_eq!(narrow_harness.project_status(third).await, ProjectStatus::Ready);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_stop_still_releases_the_port(narrow_harness: Harness) {
    let project_id = narrow_harness.add_project();
    narrow_harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    narrow_harness.engine.fail_next(
        EngineOperation::Stop,
        EngineError::CommandFailed {
            operation: EngineOperation::Stop,
            exit_code: Some(1),
            stderr: "container is stuck".to_owned(),
        },
    );

    let result = narrow_harness.orchestrator.stop(project_id).await;

    assert!(matches!(
        result,
        Err(DeploymentError::Engine(EngineError::CommandFailed { .. }))
    ));
    let records = narrow_harness.records(project_id).await;
    let closed = records.first().expect("row kept");
    assert_eq!(closed.status(), ContainerStatus::Error);
    assert!(
        closed.logs().is_some_and(|logs| logs.contains("stop failed")),
        "failure should be recorded in the log snapshot"
    );
    assert_eq!(
        narrow_harness.project_status(project_id).await,
        ProjectStatus::Error
    );

    let other = narrow_harness.add_project();
    let redeployed = narrow_harness
        .orchestrator
        .deploy(other)
        .await
        .expect("released port should be allocatable");
    assert_eq!(redeployed.container.port(), Some(3000));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_stop_reason_survives_a_full_log_read(harness: Harness) {
    let project_id = harness.add_project();
    harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness.engine.fail_next(
        EngineOperation::Stop,
        EngineError::CommandFailed {
            operation: EngineOperation::Stop,
            exit_code: Some(1),
            stderr: "container is stuck".to_owned(),
        },
    );
    harness
        .orchestrator
        .stop(project_id)
        .await
        .expect_err("stop should fail");

    let read = harness
        .orchestrator
        .logs(project_id, None)
        .await
        .expect("logs should be readable");

    assert!(read.logs.contains("listening on port 3000"), "logs: {}", read.logs);
    assert!(read.logs.contains("stop failed"), "logs: {}", read.logs);
    let records = harness.records(project_id).await;
    let cached = records
        .first()
        .and_then(ContainerRecord::logs)
        .expect("snapshot kept");
    assert!(cached.contains("stop failed"), "snapshot: {cached}");

    let tail = harness
        .orchestrator
        .logs(project_id, Some(1))
        .await
        .expect("tail should be readable");
    assert!(tail.logs.starts_with("[pavilion] stop failed"), "tail: {}", tail.logs);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stop_tolerates_a_container_removed_out_of_band(harness: Harness) {
    let project_id = harness.add_project();
    let deployed = harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness
        .engine
        .forget(deployed.engine_id().expect("engine id"));

    let outcome = harness
        .orchestrator
        .stop(project_id)
        .await
        .expect("stop should succeed");

    assert_eq!(
        outcome.stopped.map(|record| record.status()),
        Some(ContainerStatus::Stopped)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stop_during_readiness_poll_cancels_it_and_wins(harness: Harness) {
    harness.engine.set_readiness(FakeReadiness::Pending);
    let project_id = harness.add_project();
    let orchestrator = Arc::clone(&harness.orchestrator);
    let deploy = tokio::spawn(async move { orchestrator.deploy(project_id).await });

    let starting = wait_for_engine_row(&harness, project_id).await;
    assert_eq!(starting.status(), ContainerStatus::Starting);

    let outcome = harness
        .orchestrator
        .stop(project_id)
        .await
        .expect("stop should succeed");
    let deploy_result = deploy.await.expect("deploy task should not panic");

    assert!(
        matches!(deploy_result, Err(DeploymentError::Cancelled(id)) if id == project_id),
        "unexpected deploy result: {deploy_result:?}"
    );
    assert_eq!(
        outcome.stopped.map(|record| record.id()),
        Some(starting.id())
    );

    let engine_id = starting.engine_id().expect("engine id").clone();
    harness.engine.mark_ready(&engine_id);
    tokio::time::sleep(Duration::from_millis(400)).await;

    let records = harness.records(project_id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(
        records.first().map(ContainerRecord::status),
        Some(ContainerStatus::Stopped)
    );
    assert_eq!(harness.project_status(project_id).await, ProjectStatus::Error);
}
