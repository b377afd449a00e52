//! Then steps for package session BDD scenarios.

use super::world::{SessionWorld, run_async};
use package_session::session::{
    domain::{SessionState, SessionStateKind},
    ports::SessionStore,
};
use rstest_bdd_macros::then;

fn expected_kind(state: &str) -> Result<SessionStateKind, eyre::Report> {
    SessionStateKind::try_from(state)
        .map_err(|err| eyre::eyre!("invalid expected state in scenario: {err}"))
}

#[then(r#"the session state is "{state}""#)]
fn session_state_is(world: &SessionWorld, state: String) -> Result<(), eyre::Report> {
    let expected = expected_kind(&state)?;
    let session = world.session()?;
    let actual = session.state();
    eyre::ensure!(
        actual.kind() == expected,
        "expected state {}, found {actual}",
        expected.as_str()
    );

    let record = run_async(world.store.find_by_id(session.id()))?
        .ok_or_else(|| eyre::eyre!("missing record for session {}", session.id()))?;
    eyre::ensure!(
        record.state() == &actual,
        "persisted state {} differs from live state {actual}",
        record.state()
    );
    Ok(())
}

#[then(r#"the failure category is "{category}""#)]
fn failure_category_is(world: &SessionWorld, category: String) -> Result<(), eyre::Report> {
    let SessionState::Failed(failure) = world.session()?.state() else {
        return Err(eyre::eyre!("session has not failed"));
    };
    eyre::ensure!(
        failure.category() == category,
        "expected {category} failure, found {failure}"
    );
    Ok(())
}

#[then("the session made {attempts:u32} commit attempts")]
fn session_made_attempts(world: &SessionWorld, attempts: u32) -> Result<(), eyre::Report> {
    let actual = world.session()?.commit_attempts();
    eyre::ensure!(
        actual == attempts,
        "expected {attempts} commit attempts, found {actual}"
    );
    Ok(())
}

#[then("the session notification was cleared")]
fn notification_cleared(world: &SessionWorld) -> Result<(), eyre::Report> {
    let session = world.session()?;
    let cleared = world.notifier.cancelled();
    eyre::ensure!(
        cleared == vec![(session.id(), session.notification_id())],
        "unexpected cleared notifications: {cleared:?}"
    );
    Ok(())
}

#[then(r#"the driver reported "{state}""#)]
fn driver_reported(world: &SessionWorld, state: String) -> Result<(), eyre::Report> {
    let expected = expected_kind(&state)?;
    let reported = world
        .driver_outcomes
        .lock()
        .map_err(|_| eyre::eyre!("driver outcomes lock poisoned"))?
        .clone();
    eyre::ensure!(
        reported == vec![expected],
        "expected driver to report {}, got {reported:?}",
        expected.as_str()
    );
    Ok(())
}
