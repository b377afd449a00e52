//! End-to-end flows through the registry with driven sessions.

use super::helpers::{Outcome, Outcomes, Stack, install_parameters, stack};
use package_session::session::{
    adapters::memory::{InstallerCall, InstallerOperation},
    domain::{
        CommitConstraints, Completion, Failure, PreapprovalDetails, PreapprovalFlags,
        SessionState, TimeoutStrategy, UninstallParameters,
    },
    ports::{InstallerError, InstallerEvent, PreapprovalOutcome},
};
use rstest::rstest;
use std::time::Duration;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn driven_install_succeeds_after_installer_reports_success(
    stack: Stack,
) -> Result<(), eyre::Report> {
    let registry = stack.registry();
    let outcomes = Outcomes::default();
    let session = registry.create_install(install_parameters()).await?;

    outcomes.drive(&session);
    session.settled().await;
    eyre::ensure!(
        session.state() == SessionState::Committed,
        "expected committed session, found {}",
        session.state()
    );
    let native = stack.native_session_id(session.id()).await?;
    let routed = registry
        .dispatch_native(native, InstallerEvent::CommitFinished(Completion::Succeeded))
        .await?;
    session.settled().await;

    eyre::ensure!(routed, "commit outcome was not routed");
    assert_eq!(outcomes.recorded(), vec![(session.id(), Outcome::Succeeded)]);
    let record = stack.record(session.id()).await?;
    assert_eq!(record.state(), &SessionState::Succeeded);
    assert_eq!(record.commit_attempts(), 1);
    assert!(!stack.installer.is_abandoned(native));
    assert_eq!(
        stack.notifier.cancelled(),
        vec![(session.id(), session.notification_id())]
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn driven_install_waits_for_preapproval_before_staging(
    stack: Stack,
) -> Result<(), eyre::Report> {
    let registry = stack.registry();
    let outcomes = Outcomes::default();
    let parameters = install_parameters().with_preapproval(PreapprovalDetails::new(
        "com.example.app",
        "Example",
        "en-GB",
    ));
    let session = registry.create_install(parameters).await?;

    outcomes.drive(&session);
    session.settled().await;
    let native = stack.native_session_id(session.id()).await?;
    let staged_early = stack
        .installer
        .count_calls(|call| matches!(call, InstallerCall::WritePackages { .. }));
    eyre::ensure!(staged_early == 0, "packages staged before approval");
    eyre::ensure!(
        session.state() == SessionState::Active,
        "expected active session, found {}",
        session.state()
    );

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

    assert_eq!(outcomes.recorded(), vec![(session.id(), Outcome::Succeeded)]);
    assert_eq!(
        stack.installer.count_calls(|call| matches!(call, InstallerCall::RequestPreapproval(_))),
        1
    );
    assert_eq!(
        stack.record(session.id()).await?.preapproval(),
        PreapprovalFlags {
            preapproved: true,
            ..PreapprovalFlags::default()
        }
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn timed_out_commit_is_retried_until_the_installer_succeeds(
    stack: Stack,
) -> Result<(), eyre::Report> {
    let registry = stack.registry();
    let outcomes = Outcomes::default();
    let parameters = install_parameters().with_constraints(
        CommitConstraints::new(Duration::from_secs(60))
            .with_timeout_strategy(TimeoutStrategy::Retry { retries: 3 }),
    );
    let session = registry.create_install(parameters).await?;
    outcomes.drive(&session);
    session.settled().await;
    let native = stack.native_session_id(session.id()).await?;

    for _ in 0..2 {
        registry
            .dispatch_native(
                native,
                InstallerEvent::CommitFinished(Completion::Failed(Failure::timeout(
                    "device stayed busy",
                ))),
            )
            .await?;
        session.settled().await;
    }
    registry
        .dispatch_native(native, InstallerEvent::CommitFinished(Completion::Succeeded))
        .await?;
    session.settled().await;

    assert_eq!(outcomes.recorded(), vec![(session.id(), Outcome::Succeeded)]);
    assert_eq!(session.commit_attempts(), 3);
    assert_eq!(
        stack
            .installer
            .count_calls(|call| matches!(call, InstallerCall::Commit { .. })),
        3
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn staging_failure_fails_and_abandons_the_installer_session(
    stack: Stack,
) -> Result<(), eyre::Report> {
    stack.installer.fail_on(
        InstallerOperation::WritePackages,
        InstallerError::runtime(std::io::Error::other("archive truncated")),
    );
    let registry = stack.registry();
    let outcomes = Outcomes::default();
    let session = registry.create_install(install_parameters()).await?;

    outcomes.drive(&session);
    session.settled().await;

    let native = stack.native_session_id(session.id()).await?;
    let recorded = outcomes.recorded();
    eyre::ensure!(
        matches!(
            recorded.as_slice(),
            [(_, Outcome::Failed(Failure::Exceptional { cause }))] if cause.contains("archive truncated")
        ),
        "unexpected outcomes: {recorded:?}"
    );
    assert!(stack.installer.is_abandoned(native));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelling_a_committed_install_reports_cancellation(
    stack: Stack,
) -> Result<(), eyre::Report> {
    let registry = stack.registry();
    let outcomes = Outcomes::default();
    let session = registry.create_install(install_parameters()).await?;
    outcomes.drive(&session);
    session.settled().await;

    session.cancel();
    session.settled().await;
    let native = stack.native_session_id(session.id()).await?;
    registry
        .dispatch_native(native, InstallerEvent::CommitFinished(Completion::Succeeded))
        .await?;
    session.settled().await;

    assert_eq!(outcomes.recorded(), vec![(session.id(), Outcome::Cancelled)]);
    assert_eq!(
        stack.record(session.id()).await?.state(),
        &SessionState::Cancelled
    );
    assert!(stack.installer.is_abandoned(native));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn driven_uninstall_succeeds(stack: Stack) -> Result<(), eyre::Report> {
    let registry = stack.registry();
    let outcomes = Outcomes::default();
    let session = registry
        .create_uninstall(UninstallParameters::new("com.example.app")?)
        .await?;

    outcomes.drive(&session);
    session.settled().await;
    registry
        .dispatch(
            session.id(),
            InstallerEvent::CommitFinished(Completion::Succeeded),
        )
        .await?;
    session.settled().await;

    assert_eq!(outcomes.recorded(), vec![(session.id(), Outcome::Succeeded)]);
    assert_eq!(
        stack.uninstaller.requests(),
        vec![(session.id(), "com.example.app".to_owned())]
    );
    assert!(stack.installer.calls().is_empty());
    Ok(())
}
