//! In-memory integration tests for restarting previews.

use super::helpers::{Harness, harness};
use pavilion::deployment::{
    adapters::FakeReadiness,
    domain::{ContainerStatus, ProjectStatus},
    ports::{EngineError, EngineOperation},
    services::{DeploymentError, RestartMode},
};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restart_keeps_record_port_and_url_when_process_exists(harness: Harness) {
    let project_id = harness.add_project();
    let deployed = harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");

    let outcome = harness
        .orchestrator
        .restart(project_id)
        .await
        .expect("restart should succeed");

    assert_eq!(outcome.mode, RestartMode::InPlace);
    assert_eq!(outcome.container.id(), deployed.container.id());
    assert_eq!(outcome.container.port(), deployed.container.port());
    assert_eq!(outcome.container.url(), deployed.url());
    assert_eq!(outcome.container.status(), ContainerStatus::Running);
    assert_eq!(harness.engine.call_count(EngineOperation::Restart), 1);
    assert_eq!(harness.engine.call_count(EngineOperation::Create), 1);
    assert_eq!(harness.records(project_id).await.len(), 1);
    assert_eq!(harness.project_status(project_id).await, ProjectStatus::Ready);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restart_redeploys_when_the_process_vanished(harness: Harness) {
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
        .restart(project_id)
        .await
        .expect("restart should succeed");

    assert_eq!(outcome.mode, RestartMode::Redeployed);
    assert_ne!(outcome.container.id(), deployed.container.id());
    assert_eq!(outcome.container.status(), ContainerStatus::Running);

    let records = harness.records(project_id).await;
    assert_eq!(records.len(), 2);
    let old = records
        .iter()
        .find(|record| record.id() == deployed.container.id())
        .expect("old row kept");
    assert_eq!(old.status(), ContainerStatus::Error);
    assert_eq!(
        records.iter().filter(|record| record.is_active()).count(),
        1
    );
    assert_eq!(harness.project_status(project_id).await, ProjectStatus::Ready);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restart_after_stop_deploys_a_fresh_container(harness: Harness) {
    let project_id = harness.add_project();
    harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness.orchestrator.stop(project_id).await.expect("stop");

    let outcome = harness
        .orchestrator
        .restart(project_id)
        .await
        .expect("restart should succeed");

    assert_eq!(outcome.mode, RestartMode::Redeployed);
    assert_eq!(outcome.container.status(), ContainerStatus::Running);
    assert_eq!(harness.engine.call_count(EngineOperation::Restart), 0);
    assert_eq!(harness.engine.call_count(EngineOperation::Create), 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restart_of_never_deployed_project_deploys_it(harness: Harness) {
    let project_id = harness.add_project();

    let outcome = harness
        .orchestrator
        .restart(project_id)
        .await
        .expect("restart should succeed");

    assert_eq!(outcome.mode, RestartMode::Redeployed);
    assert_eq!(harness.project_status(project_id).await, ProjectStatus::Ready);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_engine_restart_fails_row_and_project(harness: Harness) {
    let project_id = harness.add_project();
    let deployed = harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness.engine.fail_next(
        EngineOperation::Restart,
        EngineError::CommandFailed {
            operation: EngineOperation::Restart,
            exit_code: Some(1),
            stderr: "cannot restart container".to_owned(),
        },
    );

    let result = harness.orchestrator.restart(project_id).await;

    assert!(matches!(
        result,
        Err(DeploymentError::Engine(EngineError::CommandFailed { .. }))
    ));
    let records = harness.records(project_id).await;
    let failed = records
        .iter()
        .find(|record| record.id() == deployed.container.id())
        .expect("row kept");
    assert_eq!(failed.status(), ContainerStatus::Error);
    assert!(
        failed.logs().is_some_and(|logs| logs.contains("restart failed")),
        "failure should be recorded in the log snapshot"
    );
    assert!(harness.active_records().await.is_empty());
    assert_eq!(harness.project_status(project_id).await, ProjectStatus::Error);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn crash_after_restart_fails_the_row_and_removes_the_process(harness: Harness) {
    let project_id = harness.add_project();
    harness
        .orchestrator
        .deploy(project_id)
        .await
        .expect("deploy should succeed");
    harness.engine.set_readiness(FakeReadiness::ExitOnStart);

    let result = harness.orchestrator.restart(project_id).await;

    assert!(
        matches!(result, Err(DeploymentError::StartupFailed { .. })),
        "unexpected result: {result:?}"
    );
    assert!(harness.active_records().await.is_empty());
    assert_eq!(harness.engine.container_count(), 0);
    assert_eq!(harness.project_status(project_id).await, ProjectStatus::Error);
}
