//! Routines of install sessions.

use crate::session::concurrency::BinarySemaphore;
use crate::session::domain::{
    Completion, Failure, InstallParameters, LivenessCheck, NativeSessionId, SessionId,
    SessionRecord, SessionState,
};
use crate::session::machine::Session;
use crate::session::ports::{
    InstallerError, InstallerService, PreapprovalOutcome, PreapprovalStore, RoutineError,
    RoutineResult, SessionRoutines, SessionStore,
};
use crate::session::preapproval::PreapprovalLifecycle;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Collaborators of install routines.
#[derive(Clone)]
pub struct InstallCollaborators {
    /// Platform installer.
    pub installer: Arc<dyn InstallerService>,
    /// Session persistence, used to record the native session handle.
    pub store: Arc<dyn SessionStore>,
    /// Pre-approval marker persistence.
    pub preapproval_store: Arc<dyn PreapprovalStore>,
    /// Guard shared with every durable read-modify-write.
    pub write_guard: BinarySemaphore,
    /// Liveness heuristic applied after a dismissed confirmation.
    pub liveness: LivenessCheck,
}

/// Install behaviour: optional pre-approval, staging, and a commit that
/// honours constraints and their timeout strategy.
pub struct InstallRoutines {
    session_id: SessionId,
    parameters: InstallParameters,
    native_session: OnceCell<NativeSessionId>,
    preapproval: PreapprovalLifecycle,
    installer: Arc<dyn InstallerService>,
    store: Arc<dyn SessionStore>,
    liveness: LivenessCheck,
}

impl InstallRoutines {
    /// Creates routines for an install session record.
    #[must_use]
    pub fn new(
        record: &SessionRecord,
        parameters: InstallParameters,
        collaborators: InstallCollaborators,
    ) -> Self {
        let preapproval = PreapprovalLifecycle::new(
            record.id(),
            record.preapproval().state(),
            collaborators.preapproval_store,
            collaborators.write_guard,
        );
        Self {
            session_id: record.id(),
            parameters,
            native_session: OnceCell::new_with(record.native_session_id()),
            preapproval,
            installer: collaborators.installer,
            store: collaborators.store,
            liveness: collaborators.liveness,
        }
    }

    /// Returns the pre-approval lifecycle of the session.
    #[must_use]
    pub const fn preapproval(&self) -> &PreapprovalLifecycle {
        &self.preapproval
    }

    /// Returns the installer-side session handle, if created.
    #[must_use]
    pub fn native_session_id(&self) -> Option<NativeSessionId> {
        self.native_session.get().copied()
    }

    async fn native_session(&self) -> RoutineResult<NativeSessionId> {
        self.native_session
            .get_or_try_init(|| async {
                let native_session_id = self
                    .installer
                    .create_session(self.session_id, self.parameters.require_user_action)
                    .await?;
                self.store
                    .set_native_session_id(self.session_id, native_session_id)
                    .await?;
                info!(
                    session_id = %self.session_id,
                    native_session_id = %native_session_id,
                    "created installer session"
                );
                Ok::<_, RoutineError>(native_session_id)
            })
            .await
            .copied()
    }

    async fn stage(&self, session: &Session, native_session_id: NativeSessionId) -> RoutineResult<()> {
        if session.is_cancellation_requested() {
            return Err(RoutineError::Cancelled);
        }
        self.installer
            .write_packages(native_session_id, self.parameters.packages())
            .await?;
        session.notify_awaiting();
        Ok(())
    }

    async fn commit(&self, native_session_id: NativeSessionId, attempt: u32) -> RoutineResult<()> {
        let constraints = self
            .parameters
            .constraints
            .as_ref()
            .filter(|constraints| !constraints.timeout_strategy.commits_eagerly_on(attempt));
        let Some(constraints) = constraints else {
            self.installer.commit(native_session_id, None).await?;
            return Ok(());
        };
        match self
            .installer
            .commit(native_session_id, Some(constraints))
            .await
        {
            Err(InstallerError::ConstraintsRejected(reason)) => {
                warn!(
                    session_id = %self.session_id,
                    %reason,
                    "installer rejected commit constraints, committing without them"
                );
                self.installer.commit(native_session_id, None).await?;
                Ok(())
            }
            result => Ok(result?),
        }
    }
}

#[async_trait]
impl SessionRoutines for InstallRoutines {
    async fn prepare(&self, session: &Session) -> RoutineResult<()> {
        if session.is_cancellation_requested() {
            return Err(RoutineError::Cancelled);
        }
        let native_session_id = self.native_session().await?;
        let Some(details) = self.parameters.preapproval.as_ref() else {
            return self.stage(session, native_session_id).await;
        };
        if self.preapproval.is_preapproved() {
            return self.stage(session, native_session_id).await;
        }
        self.preapproval
            .run_request(|| self.installer.request_preapproval(native_session_id, details))
            .await?;
        debug!(session_id = %self.session_id, "awaiting pre-approval outcome");
        Ok(())
    }

    async fn launch_confirmation(&self, session: &Session) -> RoutineResult<()> {
        let native_session_id = self
            .native_session_id()
            .ok_or(RoutineError::NativeSessionMissing(self.session_id))?;
        self.commit(native_session_id, session.commit_attempts()).await
    }

    async fn on_preapproval_outcome(
        &self,
        session: &Session,
        outcome: PreapprovalOutcome,
    ) -> RoutineResult<()> {
        match outcome {
            PreapprovalOutcome::Approved => {
                if !self.preapproval.consume_active(true).await? {
                    debug!(session_id = %self.session_id, "ignoring stale pre-approval");
                    return Ok(());
                }
                let native_session_id = self.native_session().await?;
                self.stage(session, native_session_id).await
            }
            PreapprovalOutcome::Rejected(failure) => {
                if self.preapproval.consume_active(false).await? {
                    session.complete(Completion::Failed(failure));
                }
                Ok(())
            }
        }
    }

    async fn on_confirmation_dismissed(&self, session: &Session) -> RoutineResult<()> {
        let native_progress = match self.native_session_id() {
            Some(native_session_id) => self.installer.session_progress(native_session_id).await?,
            None => None,
        };
        if self.liveness.is_alive(native_progress) {
            return Ok(());
        }
        info!(session_id = %self.session_id, "installer session is gone after dismissal");
        session.complete(Completion::Failed(Failure::generic(format!(
            "Session {} is dead",
            self.session_id
        ))));
        Ok(())
    }

    async fn cleanup(&self, session: &Session) {
        let Some(native_session_id) = self.native_session_id() else {
            return;
        };
        if session.state() == SessionState::Succeeded {
            return;
        }
        if let Err(err) = self.installer.abandon(native_session_id).await {
            warn!(
                session_id = %self.session_id,
                native_session_id = %native_session_id,
                error = %err,
                "failed to abandon installer session"
            );
        }
    }
}
