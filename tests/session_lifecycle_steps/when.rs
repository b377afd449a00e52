//! When steps for package session BDD scenarios.

use super::world::{SessionWorld, run_async};
use eyre::WrapErr;
use package_session::session::{
    domain::{Completion, Failure, SessionKind, SessionStateKind},
    ports::{InstallerEvent, SessionStore},
    services::TerminalCallbacks,
};
use rstest_bdd_macros::when;
use std::sync::Arc;

#[when("the session is driven")]
fn session_is_driven(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    let session = world.session()?;
    let record = |kind: SessionStateKind| {
        let outcomes = Arc::clone(&world.driver_outcomes);
        move || {
            if let Ok(mut recorded) = outcomes.lock() {
                recorded.push(kind);
            }
        }
    };
    let succeeded = record(SessionStateKind::Succeeded);
    let failed = record(SessionStateKind::Failed);
    let cancelled = record(SessionStateKind::Cancelled);
    let subscription = TerminalCallbacks::new()
        .on_success(move |_| succeeded())
        .on_failure(move |_, _| failed())
        .on_cancelled(move |_| cancelled())
        .bind(session);
    drop(subscription);
    run_async(session.settled());
    Ok(())
}

#[when("the session is launched and committed")]
fn session_is_launched_and_committed(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    let session = world.session()?;
    eyre::ensure!(session.launch(), "launch was refused");
    run_async(session.settled());
    eyre::ensure!(session.commit(), "commit was refused");
    run_async(session.settled());
    Ok(())
}

#[when("the session is cancelled")]
fn session_is_cancelled(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    let session = world.session()?;
    session.cancel();
    run_async(session.settled());
    Ok(())
}

#[when("the installer reports that the commit succeeded")]
fn commit_succeeded(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    deliver(world, InstallerEvent::CommitFinished(Completion::Succeeded))
}

#[when("the installer reports that the commit timed out")]
fn commit_timed_out(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    deliver(
        world,
        InstallerEvent::CommitFinished(Completion::Failed(Failure::timeout(
            "constraints not met in time",
        ))),
    )
}

#[when("the user dismisses the confirmation")]
fn confirmation_dismissed(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    deliver(world, InstallerEvent::ConfirmationDismissed)
}

#[when("the process restarts")]
fn process_restarts(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    let id = world.session()?.id();
    world.session = None;
    let registry = world.build_registry();
    let restored = run_async(registry.restore_unfinished()).wrap_err("restore sessions")?;
    let session = restored
        .into_iter()
        .find(|session| session.id() == id)
        .ok_or_else(|| eyre::eyre!("session {id} was not restored"))?;
    world.registry = Some(registry);
    world.session = Some(session);
    Ok(())
}

/// Routes an installer event the way the platform addresses it: install
/// sessions by native handle, uninstall sessions by session identifier.
fn deliver(world: &SessionWorld, event: InstallerEvent) -> Result<(), eyre::Report> {
    let session = world.session()?;
    let registry = world.registry()?;
    let routed = match session.kind() {
        SessionKind::Install => {
            let native = run_async(world.store.find_by_id(session.id()))?
                .and_then(|record| record.native_session_id())
                .ok_or_else(|| eyre::eyre!("session {} has no installer session", session.id()))?;
            run_async(registry.dispatch_native(native, event))
        }
        SessionKind::Uninstall => run_async(registry.dispatch(session.id(), event)),
    }
    .wrap_err("dispatch installer event")?;
    eyre::ensure!(routed, "event was not routed to session {}", session.id());
    run_async(session.settled());
    Ok(())
}
