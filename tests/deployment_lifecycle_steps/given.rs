//! Given steps for deployment lifecycle BDD scenarios.

use super::world::{LifecycleWorld, run_async};
use eyre::WrapErr;
use mockable::DefaultClock;
use pavilion::deployment::{
    adapters::FakeReadiness,
    domain::{Project, ProjectId, ProjectSettings},
};
use rstest_bdd_macros::given;

fn seed_project(world: &LifecycleWorld) -> Result<ProjectId, eyre::Report> {
    let project = Project::new(ProjectSettings::default(), &DefaultClock);
    let id = project.id();
    world.projects.insert(project).wrap_err("seed project")?;
    Ok(id)
}

fn deploy_new_project(world: &mut LifecycleWorld) -> Result<ProjectId, eyre::Report> {
    let project_id = seed_project(world)?;
    run_async(world.orchestrator.deploy(project_id)).wrap_err("deploy seeded project")?;
    world.deployed.push(project_id);
    Ok(project_id)
}

#[given("a draft project")]
fn draft_project(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    world.current = Some(seed_project(world)?);
    Ok(())
}

#[given("a deployed project")]
fn deployed_project(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    world.current = Some(deploy_new_project(world)?);
    Ok(())
}

#[given("{count} deployed projects")]
fn deployed_projects(world: &mut LifecycleWorld, count: usize) -> Result<(), eyre::Report> {
    for _ in 0..count {
        deploy_new_project(world)?;
    }
    Ok(())
}

#[given("previews crash on start")]
fn previews_crash(world: &mut LifecycleWorld) {
    world.engine.set_readiness(FakeReadiness::ExitOnStart);
}

#[given("an untracked managed container")]
fn untracked_container(world: &mut LifecycleWorld) {
    let label = ProjectId::new().to_string();
    world.untracked = Some(world.engine.spawn_untracked(&label));
}
