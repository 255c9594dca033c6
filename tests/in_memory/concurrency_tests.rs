//! Concurrent lifecycle operations against the in-memory adapters.

use super::helpers::{Harness, harness};
use pavilion::deployment::{
    domain::{ContainerStatus, ProjectId},
    services::DeploymentError,
};
use rstest::rstest;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_deploys_of_one_project_start_one_container(harness: Harness) {
    let project_id = harness.add_project();
    harness.engine.set_latency(Duration::from_millis(5));

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let orchestrator = Arc::clone(&harness.orchestrator);
        tasks.spawn(async move { orchestrator.deploy(project_id).await });
    }
    let mut fresh = 0;
    let mut record_ids = BTreeSet::new();
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined
            .expect("deploy task should not panic")
            .expect("every deploy should succeed");
        if !outcome.already_deployed {
            fresh += 1;
        }
        record_ids.insert(outcome.container.id());
    }

    assert_eq!(fresh, 1);
    assert_eq!(record_ids.len(), 1);
    assert_eq!(harness.records(project_id).await.len(), 1);
    assert_eq!(harness.engine.container_count(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_deploys_of_many_projects_get_distinct_ports(harness: Harness) {
    let projects: Vec<ProjectId> = (0..10).map(|_| harness.add_project()).collect();

    let mut tasks = JoinSet::new();
    for project_id in projects {
        let orchestrator = Arc::clone(&harness.orchestrator);
        tasks.spawn(async move { orchestrator.deploy(project_id).await });
    }
    let mut ports = BTreeSet::new();
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined
            .expect("deploy task should not panic")
            .expect("every deploy should fit the range");
        ports.insert(outcome.container.port().expect("port allocated"));
    }

    assert_eq!(ports, (3000..=3009).collect::<BTreeSet<u16>>());

    let eleventh = harness.add_project();
    assert!(matches!(
        harness.orchestrator.deploy(eleventh).await,
        Err(DeploymentError::NoPortsAvailable(_))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn interleaved_deploys_and_stops_never_leave_two_active_rows(harness: Harness) {
    let project_id = harness.add_project();
    harness.engine.set_latency(Duration::from_millis(2));

    let mut tasks = JoinSet::new();
    for round in 0..6 {
        let orchestrator = Arc::clone(&harness.orchestrator);
        if round % 2 == 0 {
            tasks.spawn(async move { orchestrator.deploy(project_id).await.map(|_| ()) });
        } else {
            tasks.spawn(async move { orchestrator.stop(project_id).await.map(|_| ()) });
        }
    }
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("task should not panic") {
            Ok(()) | Err(DeploymentError::Cancelled(_)) => {}
            Err(err) => panic!("unexpected lifecycle failure: {err}"),
        }
    }

    let active = harness.active_records().await;
    assert!(active.len() <= 1, "active rows: {active:?}");
    assert!(
        active
            .iter()
            .all(|record| record.status() == ContainerStatus::Running),
        "active rows: {active:?}"
    );
    assert_eq!(harness.engine.running_count(), active.len());
}
