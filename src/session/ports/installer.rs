//! Installer service ports and the inbound event vocabulary.

use crate::session::domain::{
    CommitConstraints, Completion, Failure, NativeSessionId, PreapprovalDetails, SessionId,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for installer service operations.
pub type InstallerResult<T> = Result<T, InstallerError>;

/// Platform installer used by install sessions.
///
/// Outcomes of `request_preapproval` and `commit` are not returned; they
/// arrive later as [`InstallerEvent`] messages keyed by the native session.
#[async_trait]
pub trait InstallerService: Send + Sync {
    /// Creates an installer-side session for the given package session.
    ///
    /// With `require_user_action` unset the installer may skip its own
    /// confirmation when the platform allows it.
    async fn create_session(
        &self,
        session_id: SessionId,
        require_user_action: bool,
    ) -> InstallerResult<NativeSessionId>;

    /// Streams package archives into the installer-side session.
    async fn write_packages(
        &self,
        native_session_id: NativeSessionId,
        packages: &[String],
    ) -> InstallerResult<()>;

    /// Issues a pre-approval request.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::AlreadyRequested`] when the installer
    /// already holds a request for this native session.
    async fn request_preapproval(
        &self,
        native_session_id: NativeSessionId,
        details: &PreapprovalDetails,
    ) -> InstallerResult<()>;

    /// Commits the installer-side session, optionally waiting for
    /// constraints.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ConstraintsRejected`] when the installer
    /// refuses a constrained commit.
    async fn commit(
        &self,
        native_session_id: NativeSessionId,
        constraints: Option<&CommitConstraints>,
    ) -> InstallerResult<()>;

    /// Abandons the installer-side session and releases its resources.
    async fn abandon(&self, native_session_id: NativeSessionId) -> InstallerResult<()>;

    /// Returns the native progress fraction of the installer-side session,
    /// or `None` when the installer no longer knows it.
    async fn session_progress(
        &self,
        native_session_id: NativeSessionId,
    ) -> InstallerResult<Option<f32>>;
}

/// Platform uninstaller used by uninstall sessions.
#[async_trait]
pub trait UninstallerService: Send + Sync {
    /// Starts uninstalling a package. The outcome arrives as
    /// [`InstallerEvent::CommitFinished`] addressed to `session_id`.
    async fn uninstall(&self, session_id: SessionId, package_name: &str) -> InstallerResult<()>;
}

/// Outcome of a pre-approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreapprovalOutcome {
    /// The user approved the install.
    Approved,
    /// The request was rejected or failed.
    Rejected(Failure),
}

/// Callback from the installer, routed to the owning session's lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallerEvent {
    /// Staging progress changed.
    Progress {
        /// New progress value, in units of the session's maximum.
        current: u32,
    },
    /// A pre-approval request finished.
    PreapprovalFinished(PreapprovalOutcome),
    /// The installer needs the user to confirm.
    ConfirmationRequired,
    /// The user left the confirmation without deciding.
    ConfirmationDismissed,
    /// The committed operation finished.
    CommitFinished(Completion),
}

/// Errors returned by installer service adapters.
#[derive(Debug, Clone, Error)]
pub enum InstallerError {
    /// A pre-approval request is already outstanding.
    #[error("pre-approval already requested for native session {0}")]
    AlreadyRequested(NativeSessionId),

    /// The installer does not know the native session.
    #[error("native session {0} not found")]
    SessionNotFound(NativeSessionId),

    /// The installer refused to apply commit constraints.
    #[error("commit constraints rejected: {0}")]
    ConstraintsRejected(String),

    /// The operation was cancelled.
    #[error("installer operation cancelled")]
    Cancelled,

    /// Generic runtime failure.
    #[error("installer runtime error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl InstallerError {
    /// Wraps a runtime error from the installer adapter.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }

    /// Returns whether the installer reported an outstanding request.
    #[must_use]
    pub const fn is_already_requested(&self) -> bool {
        matches!(self, Self::AlreadyRequested(_))
    }
}
