//! Given steps for package session BDD scenarios.

use super::world::{SessionWorld, run_async};
use eyre::WrapErr;
use package_session::session::domain::{
    CommitConstraints, InstallParameters, TimeoutStrategy, UninstallParameters,
};
use rstest_bdd_macros::given;
use std::time::Duration;

#[given("an in-memory session registry")]
fn in_memory_registry(world: &mut SessionWorld) {
    world.registry = Some(world.build_registry());
}

#[given(r#"an install session for package "{package}""#)]
fn install_session(world: &mut SessionWorld, package: String) -> Result<(), eyre::Report> {
    let parameters = InstallParameters::new([package])?;
    let session = run_async(world.registry()?.create_install(parameters))
        .wrap_err("create install session")?;
    world.session = Some(session);
    Ok(())
}

#[given(r#"an install session for package "{package}" retrying {retries:u32} times on timeout"#)]
fn constrained_install_session(
    world: &mut SessionWorld,
    package: String,
    retries: u32,
) -> Result<(), eyre::Report> {
    let parameters = InstallParameters::new([package])?.with_constraints(
        CommitConstraints::new(Duration::from_secs(60))
            .with_device_idle()
            .with_timeout_strategy(TimeoutStrategy::Retry { retries }),
    );
    let session = run_async(world.registry()?.create_install(parameters))
        .wrap_err("create constrained install session")?;
    world.session = Some(session);
    Ok(())
}

#[given(r#"an uninstall session for package "{package}""#)]
fn uninstall_session(world: &mut SessionWorld, package: String) -> Result<(), eyre::Report> {
    let parameters = UninstallParameters::new(package)?;
    let session = run_async(world.registry()?.create_uninstall(parameters))
        .wrap_err("create uninstall session")?;
    world.session = Some(session);
    Ok(())
}
