//! Scriptable in-memory installer and uninstaller.

use crate::session::{
    domain::{CommitConstraints, NativeSessionId, PreapprovalDetails, SessionId},
    ports::{InstallerError, InstallerResult, InstallerService, UninstallerService},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Native progress after packages are written.
pub const STAGED_NATIVE_PROGRESS: f32 = 0.8;
/// Native progress once a commit was accepted.
pub const COMMITTED_NATIVE_PROGRESS: f32 = 0.9;

/// Installer operation, used to script failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallerOperation {
    /// [`InstallerService::create_session`].
    CreateSession,
    /// [`InstallerService::write_packages`].
    WritePackages,
    /// [`InstallerService::request_preapproval`].
    RequestPreapproval,
    /// [`InstallerService::commit`].
    Commit,
    /// [`InstallerService::abandon`].
    Abandon,
    /// [`InstallerService::session_progress`].
    SessionProgress,
}

/// Call recorded by [`InMemoryInstallerService`].
#[derive(Debug, Clone, PartialEq)]
pub enum InstallerCall {
    /// A native session was created.
    CreateSession {
        /// Owning package session.
        session_id: SessionId,
        /// Whether the installer must ask the user before installing.
        require_user_action: bool,
    },
    /// Packages were written.
    WritePackages {
        /// Target native session.
        native_session_id: NativeSessionId,
        /// Written packages.
        packages: Vec<String>,
    },
    /// Pre-approval was requested.
    RequestPreapproval(NativeSessionId),
    /// A commit was issued.
    Commit {
        /// Target native session.
        native_session_id: NativeSessionId,
        /// Constraints passed with the commit.
        constraints: Option<CommitConstraints>,
    },
    /// A native session was abandoned.
    Abandon(NativeSessionId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct NativeSession {
    progress: f32,
    preapproval_requested: bool,
    abandoned: bool,
}

#[derive(Debug, Default)]
struct InstallerState {
    last_native_session_id: i32,
    sessions: HashMap<NativeSessionId, NativeSession>,
    calls: Vec<InstallerCall>,
    failures: HashMap<InstallerOperation, InstallerError>,
    rejects_constraints: bool,
}

/// Thread-safe in-memory installer.
///
/// Native handles are allocated sequentially from 1. A second pre-approval
/// request for the same native session is answered with
/// [`InstallerError::AlreadyRequested`], as the platform does.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInstallerService {
    state: Arc<RwLock<InstallerState>>,
}

impl InMemoryInstallerService {
    /// Creates an installer with no sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `operation` fail with `error`.
    pub fn fail_on(&self, operation: InstallerOperation, error: InstallerError) {
        if let Ok(mut state) = self.state.write() {
            state.failures.insert(operation, error);
        }
    }

    /// Removes a scripted failure.
    pub fn clear_failure(&self, operation: InstallerOperation) {
        if let Ok(mut state) = self.state.write() {
            state.failures.remove(&operation);
        }
    }

    /// Makes constrained commits fail with
    /// [`InstallerError::ConstraintsRejected`].
    pub fn reject_constraints(&self, rejects: bool) {
        if let Ok(mut state) = self.state.write() {
            state.rejects_constraints = rejects;
        }
    }

    /// Overrides the native progress fraction of a session.
    pub fn set_native_progress(&self, native_session_id: NativeSessionId, progress: f32) {
        if let Ok(mut state) = self.state.write() {
            if let Some(session) = state.sessions.get_mut(&native_session_id) {
                session.progress = progress;
            }
        }
    }

    /// Registers a native session that already holds a pre-approval
    /// request, as after a process restart.
    pub fn adopt_session(&self, native_session_id: NativeSessionId, preapproval_requested: bool) {
        if let Ok(mut state) = self.state.write() {
            state.last_native_session_id = state
                .last_native_session_id
                .max(native_session_id.value());
            state.sessions.insert(
                native_session_id,
                NativeSession {
                    progress: 0.0,
                    preapproval_requested,
                    abandoned: false,
                },
            );
        }
    }

    /// Returns every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<InstallerCall> {
        self.state
            .read()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    /// Returns how many recorded calls match `predicate`.
    #[must_use]
    pub fn count_calls(&self, predicate: impl Fn(&InstallerCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    /// Returns whether a native session was abandoned.
    #[must_use]
    pub fn is_abandoned(&self, native_session_id: NativeSessionId) -> bool {
        self.state.read().is_ok_and(|state| {
            state
                .sessions
                .get(&native_session_id)
                .is_some_and(|session| session.abandoned)
        })
    }

    fn read(&self) -> InstallerResult<RwLockReadGuard<'_, InstallerState>> {
        self.state
            .read()
            .map_err(|err| InstallerError::runtime(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> InstallerResult<RwLockWriteGuard<'_, InstallerState>> {
        self.state
            .write()
            .map_err(|err| InstallerError::runtime(std::io::Error::other(err.to_string())))
    }
}

impl InstallerState {
    fn check(&self, operation: InstallerOperation) -> InstallerResult<()> {
        self.failures.get(&operation).cloned().map_or(Ok(()), Err)
    }

    fn session_mut(
        &mut self,
        native_session_id: NativeSessionId,
    ) -> InstallerResult<&mut NativeSession> {
        self.sessions
            .get_mut(&native_session_id)
            .filter(|session| !session.abandoned)
            .ok_or(InstallerError::SessionNotFound(native_session_id))
    }
}

#[async_trait]
impl InstallerService for InMemoryInstallerService {
    async fn create_session(
        &self,
        session_id: SessionId,
        require_user_action: bool,
    ) -> InstallerResult<NativeSessionId> {
        let mut state = self.write()?;
        state.check(InstallerOperation::CreateSession)?;
        state.last_native_session_id = state.last_native_session_id.saturating_add(1);
        let native_session_id = NativeSessionId::new(state.last_native_session_id);
        state.sessions.insert(
            native_session_id,
            NativeSession {
                progress: 0.0,
                preapproval_requested: false,
                abandoned: false,
            },
        );
        state.calls.push(InstallerCall::CreateSession {
            session_id,
            require_user_action,
        });
        Ok(native_session_id)
    }

    async fn write_packages(
        &self,
        native_session_id: NativeSessionId,
        packages: &[String],
    ) -> InstallerResult<()> {
        let mut state = self.write()?;
        state.check(InstallerOperation::WritePackages)?;
        state.session_mut(native_session_id)?.progress = STAGED_NATIVE_PROGRESS;
        state.calls.push(InstallerCall::WritePackages {
            native_session_id,
            packages: packages.to_vec(),
        });
        Ok(())
    }

    async fn request_preapproval(
        &self,
        native_session_id: NativeSessionId,
        _details: &PreapprovalDetails,
    ) -> InstallerResult<()> {
        let mut state = self.write()?;
        state.calls.push(InstallerCall::RequestPreapproval(native_session_id));
        state.check(InstallerOperation::RequestPreapproval)?;
        let session = state.session_mut(native_session_id)?;
        if session.preapproval_requested {
            return Err(InstallerError::AlreadyRequested(native_session_id));
        }
        session.preapproval_requested = true;
        Ok(())
    }

    async fn commit(
        &self,
        native_session_id: NativeSessionId,
        constraints: Option<&CommitConstraints>,
    ) -> InstallerResult<()> {
        let mut state = self.write()?;
        state.calls.push(InstallerCall::Commit {
            native_session_id,
            constraints: constraints.cloned(),
        });
        state.check(InstallerOperation::Commit)?;
        if constraints.is_some() && state.rejects_constraints {
            return Err(InstallerError::ConstraintsRejected(
                "constrained commits are not permitted".to_owned(),
            ));
        }
        state.session_mut(native_session_id)?.progress = COMMITTED_NATIVE_PROGRESS;
        Ok(())
    }

    async fn abandon(&self, native_session_id: NativeSessionId) -> InstallerResult<()> {
        let mut state = self.write()?;
        state.calls.push(InstallerCall::Abandon(native_session_id));
        state.check(InstallerOperation::Abandon)?;
        state.session_mut(native_session_id)?.abandoned = true;
        Ok(())
    }

    async fn session_progress(
        &self,
        native_session_id: NativeSessionId,
    ) -> InstallerResult<Option<f32>> {
        let state = self.read()?;
        state.check(InstallerOperation::SessionProgress)?;
        Ok(state
            .sessions
            .get(&native_session_id)
            .filter(|session| !session.abandoned)
            .map(|session| session.progress))
    }
}

/// Thread-safe in-memory uninstaller recording requested removals.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUninstallerService {
    state: Arc<RwLock<UninstallerState>>,
}

#[derive(Debug, Default)]
struct UninstallerState {
    requests: Vec<(SessionId, String)>,
    failure: Option<InstallerError>,
}

impl InMemoryUninstallerService {
    /// Creates an uninstaller with no recorded requests.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes later requests fail with `error`, or succeed when `None`.
    pub fn fail_with(&self, error: Option<InstallerError>) {
        if let Ok(mut state) = self.state.write() {
            state.failure = error;
        }
    }

    /// Returns the recorded `(session, package)` requests.
    #[must_use]
    pub fn requests(&self) -> Vec<(SessionId, String)> {
        self.state
            .read()
            .map(|state| state.requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl UninstallerService for InMemoryUninstallerService {
    async fn uninstall(&self, session_id: SessionId, package_name: &str) -> InstallerResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| InstallerError::runtime(std::io::Error::other(err.to_string())))?;
        if let Some(err) = state.failure.clone() {
            return Err(err);
        }
        state.requests.push((session_id, package_name.to_owned()));
        Ok(())
    }
}
