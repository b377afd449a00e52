//! Per-kind behaviour plugged into the session state machine.

use super::{InstallerError, NotifierError, PreapprovalOutcome, SessionStoreError};
use crate::session::domain::SessionId;
use crate::session::machine::Session;
use crate::session::preapproval::PreapprovalError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for session routines.
pub type RoutineResult<T> = Result<T, RoutineError>;

/// Preparation and confirmation behaviour of a session kind.
///
/// Every method runs inside a job on the session lane. Implementations
/// drive the session forward by calling its non-blocking operations
/// (`notify_awaiting`, `complete`, `set_progress`); they must never await
/// the session lane themselves.
#[async_trait]
pub trait SessionRoutines: Send + Sync {
    /// Stages the operation. Runs on every launch and is expected to
    /// eventually call [`Session::notify_awaiting`].
    async fn prepare(&self, session: &Session) -> RoutineResult<()>;

    /// Starts the confirmation. Runs once per commit and is expected to
    /// eventually lead to completion or a retry.
    async fn launch_confirmation(&self, session: &Session) -> RoutineResult<()>;

    /// Runs after the session entered `Committed` and the attempt counter
    /// was persisted.
    async fn on_committed(&self, _session: &Session) -> RoutineResult<()> {
        Ok(())
    }

    /// Handles the outcome of a pre-approval request.
    async fn on_preapproval_outcome(
        &self,
        _session: &Session,
        _outcome: PreapprovalOutcome,
    ) -> RoutineResult<()> {
        Ok(())
    }

    /// Handles a confirmation the user left without deciding.
    async fn on_confirmation_dismissed(&self, _session: &Session) -> RoutineResult<()> {
        Ok(())
    }

    /// Releases resources once the session reached a terminal state.
    async fn cleanup(&self, _session: &Session) {}
}

/// Errors raised by session routines.
///
/// Apart from [`RoutineError::Cancelled`], which cancels the session, every
/// error completes the session with an exceptional failure.
#[derive(Debug, Clone, Error)]
pub enum RoutineError {
    /// The operation was cancelled.
    #[error("session operation cancelled")]
    Cancelled,

    /// Installer failure.
    #[error(transparent)]
    Installer(#[from] InstallerError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] SessionStoreError),

    /// The deferred confirmation notification could not be posted.
    #[error(transparent)]
    Notifier(#[from] NotifierError),

    /// Pre-approval request failure.
    #[error(transparent)]
    Preapproval(#[from] PreapprovalError),

    /// The installer-side session was expected but never created.
    #[error("session {0} has no native installer session")]
    NativeSessionMissing(SessionId),

    /// Any other failure.
    #[error("routine error: {0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl RoutineError {
    /// Wraps an arbitrary error.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Arc::new(err))
    }

    /// Returns whether the error represents cancellation.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Installer(InstallerError::Cancelled)
                | Self::Preapproval(PreapprovalError::Request(InstallerError::Cancelled))
        )
    }
}
