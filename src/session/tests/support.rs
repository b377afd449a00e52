//! Shared fixtures for session unit tests.

use crate::session::{
    adapters::memory::{
        InMemoryInstallerService, InMemoryNotifier, InMemorySessionStore,
        InMemoryUninstallerService,
    },
    concurrency::{BinarySemaphore, SerialLane},
    domain::{
        CommitConstraints, Completion, Failure, InstallParameters, NativeSessionId,
        PersistedSessionData, Progress, SessionConfig, SessionId, SessionParameters, SessionRecord, SessionState, TimeoutStrategy,
    },
    machine::{Session, SessionDeps},
    services::{SessionEnvironment, SessionRegistry},
    ports::{
        ProgressListener, RoutineError, RoutineResult, SessionRoutines, SessionStore,
        StateListener,
    },
};
use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use rstest::fixture;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(super) fn install_parameters() -> InstallParameters {
    InstallParameters::new(["base.apk"]).expect("valid package list")
}

pub(super) fn constrained_parameters(strategy: TimeoutStrategy) -> InstallParameters {
    install_parameters().with_constraints(
        CommitConstraints::new(Duration::from_secs(30)).with_timeout_strategy(strategy),
    )
}

pub(super) fn timeout() -> Failure {
    Failure::timeout("constraints not met in time")
}

/// Builds a record as it would have been persisted before a restart.
pub(super) fn persisted_record(
    parameters: impl Into<SessionParameters>,
    state: SessionState,
    commit_attempts: u32,
) -> SessionRecord {
    let fresh = SessionRecord::new(parameters.into(), 100, &DefaultClock);
    SessionRecord::from_persisted(PersistedSessionData {
        id: fresh.id(),
        parameters: fresh.parameters().clone(),
        state,
        progress: Progress::zero(100),
        commit_attempts,
        notification_id: fresh.notification_id(),
        confirmation_launched: false,
        native_session_id: None,
        preapproval: fresh.preapproval(),
        last_launched_at: Some(DefaultClock.utc()),
        created_at: fresh.created_at(),
    })
}

/// What the scripted preparation does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) enum PrepareScript {
    /// Reach `Awaiting` right away.
    #[default]
    Stage,
    /// Return without reaching `Awaiting`.
    Hold,
    /// Fail with an arbitrary error.
    Fail,
    /// Fail with a cancellation.
    Cancel,
}

/// What the scripted confirmation does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) enum ConfirmScript {
    /// Wait for an explicit completion.
    #[default]
    Hold,
    /// Complete with the given outcome.
    Complete(Completion),
    /// Fail with an arbitrary error.
    Fail,
}

/// Calls observed by [`ScriptedRoutines`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum RoutineCall {
    Prepare,
    Committed { attempt: u32 },
    LaunchConfirmation { attempt: u32 },
    Cleanup(SessionState),
}

/// Routines whose behaviour is set per test.
#[derive(Debug, Default)]
pub(super) struct ScriptedRoutines {
    prepare: Mutex<PrepareScript>,
    confirm: Mutex<ConfirmScript>,
    calls: Mutex<Vec<RoutineCall>>,
}

impl ScriptedRoutines {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(super) fn with_prepare(script: PrepareScript) -> Arc<Self> {
        let routines = Self::new();
        routines.set_prepare(script);
        routines
    }

    pub(super) fn set_prepare(&self, script: PrepareScript) {
        *self.prepare.lock().expect("prepare script lock") = script;
    }

    pub(super) fn set_confirm(&self, script: ConfirmScript) {
        *self.confirm.lock().expect("confirm script lock") = script;
    }

    pub(super) fn calls(&self) -> Vec<RoutineCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(super) fn count(&self, predicate: impl Fn(&RoutineCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: RoutineCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl SessionRoutines for ScriptedRoutines {
    async fn prepare(&self, session: &Session) -> RoutineResult<()> {
        self.record(RoutineCall::Prepare);
        let script = *self.prepare.lock().expect("prepare script lock");
        match script {
            PrepareScript::Stage => {
                session.notify_awaiting();
                Ok(())
            }
            PrepareScript::Hold => Ok(()),
            PrepareScript::Fail => Err(RoutineError::other(std::io::Error::other(
                "staging failed",
            ))),
            PrepareScript::Cancel => Err(RoutineError::Cancelled),
        }
    }

    async fn on_committed(&self, session: &Session) -> RoutineResult<()> {
        self.record(RoutineCall::Committed {
            attempt: session.commit_attempts(),
        });
        Ok(())
    }

    async fn launch_confirmation(&self, session: &Session) -> RoutineResult<()> {
        self.record(RoutineCall::LaunchConfirmation {
            attempt: session.commit_attempts(),
        });
        let script = self.confirm.lock().expect("confirm script lock").clone();
        match script {
            ConfirmScript::Hold => Ok(()),
            ConfirmScript::Complete(completion) => {
                session.complete(completion);
                Ok(())
            }
            ConfirmScript::Fail => Err(RoutineError::other(std::io::Error::other(
                "confirmation failed",
            ))),
        }
    }

    async fn cleanup(&self, session: &Session) {
        self.record(RoutineCall::Cleanup(session.state()));
    }
}

/// State listener recording every delivery.
#[derive(Debug, Default)]
pub(super) struct StateRecorder {
    states: Mutex<Vec<SessionState>>,
}

impl StateRecorder {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(super) fn states(&self) -> Vec<SessionState> {
        self.states.lock().expect("recorded states lock").clone()
    }
}

impl StateListener for StateRecorder {
    fn on_state_changed(&self, _session_id: SessionId, state: &SessionState) {
        self.states
            .lock()
            .expect("recorded states lock")
            .push(state.clone());
    }
}

/// Progress listener recording every delivery.
#[derive(Debug, Default)]
pub(super) struct ProgressRecorder {
    values: Mutex<Vec<Progress>>,
}

impl ProgressRecorder {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(super) fn values(&self) -> Vec<Progress> {
        self.values.lock().expect("recorded progress lock").clone()
    }
}

impl ProgressListener for ProgressRecorder {
    fn on_progress_changed(&self, _session_id: SessionId, progress: Progress) {
        self.values
            .lock()
            .expect("recorded progress lock")
            .push(progress);
    }
}

/// In-memory collaborators for building sessions directly.
pub(super) struct Harness {
    pub(super) store: Arc<InMemorySessionStore>,
    pub(super) notifier: Arc<InMemoryNotifier>,
    pub(super) write_guard: BinarySemaphore,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self {
            store: Arc::new(InMemorySessionStore::new()),
            notifier: Arc::new(InMemoryNotifier::new()),
            write_guard: BinarySemaphore::new(),
        }
    }

    /// Persists a fresh pending session and returns it.
    pub(super) async fn session(
        &self,
        parameters: impl Into<SessionParameters>,
        routines: Arc<ScriptedRoutines>,
    ) -> Session {
        let record = SessionRecord::new(parameters.into(), 100, &DefaultClock);
        self.store
            .insert(&record)
            .await
            .expect("record insert should succeed");
        self.attach(&record, routines)
    }

    /// Persists `record` and returns the session restored from it.
    pub(super) async fn restore(
        &self,
        record: &SessionRecord,
        routines: Arc<ScriptedRoutines>,
    ) -> Session {
        self.store
            .insert(record)
            .await
            .expect("record insert should succeed");
        self.attach(record, routines)
    }

    pub(super) async fn stored(&self, session: &Session) -> SessionRecord {
        self.store
            .find_by_id(session.id())
            .await
            .expect("record lookup should succeed")
            .expect("record should exist")
    }

    fn attach(&self, record: &SessionRecord, routines: Arc<ScriptedRoutines>) -> Session {
        let deps = SessionDeps {
            store: Arc::clone(&self.store) as Arc<dyn SessionStore>,
            notifier: Arc::clone(&self.notifier) as _,
            clock: Arc::new(DefaultClock),
            write_guard: self.write_guard.clone(),
            lane: SerialLane::current().expect("tests run inside a tokio runtime"),
        };
        Session::new(record, routines, deps)
    }
}

#[fixture]
pub(super) fn harness() -> Harness {
    Harness::new()
}

/// Launches and settles a fresh session so that it awaits a commit.
pub(super) async fn awaiting_session(harness: &Harness, routines: Arc<ScriptedRoutines>) -> Session {
    let session = harness.session(install_parameters(), routines).await;
    assert!(session.launch());
    session.settled().await;
    assert_eq!(session.state(), SessionState::Awaiting);
    session
}

/// In-memory adapters wired into a registry.
pub(super) struct Services {
    pub(super) store: Arc<InMemorySessionStore>,
    pub(super) installer: Arc<InMemoryInstallerService>,
    pub(super) uninstaller: Arc<InMemoryUninstallerService>,
    pub(super) notifier: Arc<InMemoryNotifier>,
}

impl Services {
    pub(super) fn new() -> Self {
        Self {
            store: Arc::new(InMemorySessionStore::new()),
            installer: Arc::new(InMemoryInstallerService::new()),
            uninstaller: Arc::new(InMemoryUninstallerService::new()),
            notifier: Arc::new(InMemoryNotifier::new()),
        }
    }

    /// Builds a registry over these adapters. Call from inside a runtime.
    pub(super) fn registry(&self) -> SessionRegistry<DefaultClock> {
        SessionRegistry::new(SessionEnvironment {
            store: Arc::clone(&self.store) as _,
            preapproval_store: Arc::clone(&self.store) as _,
            installer: Arc::clone(&self.installer) as _,
            uninstaller: Arc::clone(&self.uninstaller) as _,
            notifier: Arc::clone(&self.notifier) as _,
            clock: Arc::new(DefaultClock),
            runtime: tokio::runtime::Handle::current(),
            config: SessionConfig::default(),
        })
    }

    pub(super) async fn record(&self, session: &Session) -> SessionRecord {
        self.store
            .find_by_id(session.id())
            .await
            .expect("record lookup should succeed")
            .expect("record should exist")
    }

    pub(super) async fn native_session_id(&self, session: &Session) -> NativeSessionId {
        self.record(session)
            .await
            .native_session_id()
            .expect("installer session should exist")
    }
}
