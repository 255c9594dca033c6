//! Then steps for deployment lifecycle BDD scenarios.

use super::world::{LifecycleWorld, run_async};
use eyre::{WrapErr, eyre};
use pavilion::deployment::{
    domain::{ContainerStatus, ProjectId, ProjectStatus},
    ports::{ContainerRepository, EngineContainerState, ProjectRepository},
    services::{DeployOutcome, DeploymentError},
};
use rstest_bdd_macros::then;

fn current_project(world: &LifecycleWorld) -> Result<ProjectId, eyre::Report> {
    world
        .current
        .ok_or_else(|| eyre!("missing project in scenario world"))
}

fn successful_deploy(world: &LifecycleWorld) -> Result<&DeployOutcome, eyre::Report> {
    match world.last_deploy.as_ref() {
        Some(Ok(outcome)) => Ok(outcome),
        Some(Err(err)) => Err(eyre!("deploy failed: {err}")),
        None => Err(eyre!("no deploy was attempted")),
    }
}

fn failed_deploy(world: &LifecycleWorld) -> Result<&DeploymentError, eyre::Report> {
    match world.last_deploy.as_ref() {
        Some(Err(err)) => Ok(err),
        Some(Ok(outcome)) => Err(eyre!("deploy unexpectedly succeeded: {outcome:?}")),
        None => Err(eyre!("no deploy was attempted")),
    }
}

#[then("the deployment is running on port {port}")]
fn running_on_port(world: &LifecycleWorld, port: u16) -> Result<(), eyre::Report> {
    let outcome = successful_deploy(world)?;
    if outcome.container.status() != ContainerStatus::Running {
        return Err(eyre!(
            "expected running container, got {}",
            outcome.container.status()
        ));
    }
    if outcome.container.port() != Some(port) {
        return Err(eyre!(
            "expected port {port}, got {:?}",
            outcome.container.port()
        ));
    }
    Ok(())
}

#[then(r#"the preview URL is "{url}""#)]
fn preview_url(world: &LifecycleWorld, url: String) -> Result<(), eyre::Report> {
    let outcome = successful_deploy(world)?;
    if outcome.url() != Some(url.as_str()) {
        return Err(eyre!("expected URL {url}, got {:?}", outcome.url()));
    }
    Ok(())
}

#[then(r#"the project status is "{status}""#)]
fn project_status(world: &LifecycleWorld, status: String) -> Result<(), eyre::Report> {
    let expected = ProjectStatus::try_from(status.as_str()).wrap_err("parse project status")?;
    let project = run_async(world.projects.find_by_id(current_project(world)?))
        .wrap_err("load project")?
        .ok_or_else(|| eyre!("project not found"))?;
    if project.status() != expected {
        return Err(eyre!("expected {expected}, got {}", project.status()));
    }
    Ok(())
}

#[then("the existing container is returned")]
fn existing_container(world: &LifecycleWorld) -> Result<(), eyre::Report> {
    let outcome = successful_deploy(world)?;
    if !outcome.already_deployed {
        return Err(eyre!("expected the existing container to be returned"));
    }
    Ok(())
}

#[then("the project has {count} container row")]
fn container_rows(world: &LifecycleWorld, count: usize) -> Result<(), eyre::Report> {
    let rows = run_async(world.containers.list_for_project(current_project(world)?))
        .wrap_err("list container rows")?;
    if rows.len() != count {
        return Err(eyre!("expected {count} rows, got {}", rows.len()));
    }
    Ok(())
}

#[then("the deployment fails because no ports are available")]
fn no_ports(world: &LifecycleWorld) -> Result<(), eyre::Report> {
    match failed_deploy(world)? {
        DeploymentError::NoPortsAvailable(_) => Ok(()),
        other => Err(eyre!("expected port exhaustion, got {other}")),
    }
}

#[then("the deployment fails during startup")]
fn startup_failure(world: &LifecycleWorld) -> Result<(), eyre::Report> {
    match failed_deploy(world)? {
        DeploymentError::StartupFailed { .. } => Ok(()),
        other => Err(eyre!("expected startup failure, got {other}")),
    }
}

#[then("no container process remains")]
fn no_process(world: &LifecycleWorld) -> Result<(), eyre::Report> {
    let count = world.engine.container_count();
    if count != 0 {
        return Err(eyre!("expected no engine containers, found {count}"));
    }
    Ok(())
}

#[then("the untracked container is removed")]
fn untracked_removed(world: &LifecycleWorld) -> Result<(), eyre::Report> {
    let untracked = world
        .untracked
        .as_ref()
        .ok_or_else(|| eyre!("no untracked container in scenario world"))?;
    let report = world
        .last_sweep
        .as_ref()
        .ok_or_else(|| eyre!("no sweep was run"))?;
    if world.engine.contains(untracked) || report.orphans_removed != 1 {
        return Err(eyre!("untracked container survived the sweep: {report:?}"));
    }
    Ok(())
}

#[then("the deployed container is still running")]
fn deployed_still_running(world: &LifecycleWorld) -> Result<(), eyre::Report> {
    let row = run_async(
        world
            .containers
            .find_active_for_project(current_project(world)?),
    )
    .wrap_err("load active row")?
    .ok_or_else(|| eyre!("deployed project lost its active row"))?;
    let engine_id = row
        .engine_id()
        .ok_or_else(|| eyre!("active row has no engine container"))?;
    if world.engine.state_of(engine_id) != Some(EngineContainerState::Running) {
        return Err(eyre!("deployed container is no longer running"));
    }
    Ok(())
}
