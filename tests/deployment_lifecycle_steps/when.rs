//! When steps for deployment lifecycle BDD scenarios.

use super::world::{LifecycleWorld, run_async};
use eyre::{WrapErr, eyre};
use rstest_bdd_macros::when;

#[when("the project is deployed")]
fn deploy_project(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    let project_id = world
        .current
        .ok_or_else(|| eyre!("missing project in scenario world"))?;
    world.last_deploy = Some(run_async(world.orchestrator.deploy(project_id)));
    Ok(())
}

#[when("the first project is stopped")]
fn stop_first_project(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    let project_id = world
        .deployed
        .first()
        .copied()
        .ok_or_else(|| eyre!("no deployed project in scenario world"))?;
    run_async(world.orchestrator.stop(project_id)).wrap_err("stop first project")?;
    Ok(())
}

#[when("the orphan sweep runs")]
fn run_sweep(world: &mut LifecycleWorld) -> Result<(), eyre::Report> {
    let report =
        run_async(world.orchestrator.reaper().reap_orphans()).wrap_err("run orphan sweep")?;
    world.last_sweep = Some(report);
    Ok(())
}
