//! Resuming sessions with a fresh registry over the same adapters.

use super::helpers::{Outcome, Outcomes, Stack, install_parameters, stack};
use package_session::session::{
    adapters::memory::InstallerCall,
    domain::{Completion, PreapprovalDetails, SessionState},
    ports::{InstallerEvent, PreapprovalOutcome},
};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn committed_session_resumes_with_next_attempt(stack: Stack) -> Result<(), eyre::Report> {
    let id = {
        let registry = stack.registry();
        let session = registry.create_install(install_parameters()).await?;
        eyre::ensure!(session.launch(), "launch was refused");
        session.settled().await;
        eyre::ensure!(session.commit(), "commit was refused");
        session.settled().await;
        session.id()
    };

    let registry = stack.registry();
    let restored = registry.restore_unfinished().await?;
    let [session] = restored.as_slice() else {
        return Err(eyre::eyre!("expected one restored session, got {}", restored.len()));
    };
    assert_eq!(session.id(), id);
    assert_eq!(session.state(), SessionState::Committed);
    assert_eq!(session.commit_attempts(), 1);

    let outcomes = Outcomes::default();
    outcomes.drive(session);
    session.settled().await;
    let native = stack.native_session_id(id).await?;
    registry
        .dispatch_native(native, InstallerEvent::CommitFinished(Completion::Succeeded))
        .await?;
    session.settled().await;

    assert_eq!(outcomes.recorded(), vec![(id, Outcome::Succeeded)]);
    assert_eq!(stack.record(id).await?.commit_attempts(), 2);
    assert_eq!(
        stack
            .installer
            .count_calls(|call| matches!(call, InstallerCall::CreateSession { .. })),
        1
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn outstanding_preapproval_is_not_requested_again(stack: Stack) -> Result<(), eyre::Report> {
    let parameters = install_parameters().with_preapproval(PreapprovalDetails::new(
        "com.example.app",
        "Example",
        "en-GB",
    ));
    let id = {
        let registry = stack.registry();
        let session = registry.create_install(parameters).await?;
        eyre::ensure!(session.launch(), "launch was refused");
        session.settled().await;
        session.id()
    };

    let registry = stack.registry();
    let restored = registry.restore_unfinished().await?;
    let [session] = restored.as_slice() else {
        return Err(eyre::eyre!("expected one restored session, got {}", restored.len()));
    };
    let outcomes = Outcomes::default();
    outcomes.drive(session);
    session.settled().await;
    let native = stack.native_session_id(id).await?;
    registry
        .dispatch_native(
            native,
            InstallerEvent::PreapprovalFinished(PreapprovalOutcome::Approved),
        )
        .await?;
    session.settled().await;
    registry
        .dispatch_native(native, InstallerEvent::CommitFinished(Completion::Succeeded))
        .await?;
    session.settled().await;

    assert_eq!(outcomes.recorded(), vec![(id, Outcome::Succeeded)]);
    assert_eq!(
        stack
            .installer
            .count_calls(|call| matches!(call, InstallerCall::RequestPreapproval(_))),
        1
    );
    assert_eq!(
        stack
            .installer
            .count_calls(|call| matches!(call, InstallerCall::WritePackages { .. })),
        1
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn finished_session_stays_finished_after_restart(stack: Stack) -> Result<(), eyre::Report> {
    let id = {
        let registry = stack.registry();
        let session = registry.create_install(install_parameters()).await?;
        session.cancel();
        session.settled().await;
        session.id()
    };

    let registry = stack.registry();
    let restored = registry.restore_unfinished().await?;
    let session = registry
        .get(id)
        .await?
        .ok_or_else(|| eyre::eyre!("session {id} was not found after restart"))?;
    let outcomes = Outcomes::default();
    outcomes.drive(&session);

    eyre::ensure!(restored.is_empty(), "finished session was restored");
    assert_eq!(session.state(), SessionState::Cancelled);
    assert!(!session.launch());
    assert_eq!(outcomes.recorded(), vec![(id, Outcome::Cancelled)]);
    Ok(())
}
