//! Persistence gateway for session records and pre-approval markers.

use crate::session::domain::{
    NativeSessionId, Progress, SessionId, SessionRecord, SessionState,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for session store operations.
pub type SessionStoreResult<T> = Result<T, SessionStoreError>;

/// Session persistence contract.
///
/// Every update is partial: it touches only the columns it names, so state
/// writes never clobber progress and vice versa. Implementations must be
/// safe to call from any session lane.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores a new session record.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::Duplicate`] when the identifier already
    /// exists.
    async fn insert(&self, record: &SessionRecord) -> SessionStoreResult<()>;

    /// Finds a session record by identifier.
    ///
    /// Returns `None` when the session does not exist.
    async fn find_by_id(&self, id: SessionId) -> SessionStoreResult<Option<SessionRecord>>;

    /// Finds the session record backed by an installer-side session.
    ///
    /// Returns `None` when no session owns the handle.
    async fn find_by_native_session_id(
        &self,
        native_session_id: NativeSessionId,
    ) -> SessionStoreResult<Option<SessionRecord>>;

    /// Returns every record whose state is not terminal.
    async fn list_unfinished(&self) -> SessionStoreResult<Vec<SessionRecord>>;

    /// Deletes a session record. Returns whether a row was removed.
    async fn delete(&self, id: SessionId) -> SessionStoreResult<bool>;

    /// Persists the state and, for `Failed`, its failure payload.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::NotFound`] when the session does not
    /// exist.
    async fn update_state(&self, id: SessionId, state: &SessionState) -> SessionStoreResult<()>;

    /// Persists the progress.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::NotFound`] when the session does not
    /// exist.
    async fn update_progress(&self, id: SessionId, progress: Progress) -> SessionStoreResult<()>;

    /// Records the latest launch timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::NotFound`] when the session does not
    /// exist.
    async fn update_last_launch(
        &self,
        id: SessionId,
        launched_at: DateTime<Utc>,
    ) -> SessionStoreResult<()>;

    /// Persists the commit attempt counter.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::NotFound`] when the session does not
    /// exist.
    async fn set_commit_attempts(&self, id: SessionId, attempts: u32) -> SessionStoreResult<()>;

    /// Persists the confirmation-launched flag.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::NotFound`] when the session does not
    /// exist.
    async fn set_confirmation_launched(
        &self,
        id: SessionId,
        launched: bool,
    ) -> SessionStoreResult<()>;

    /// Associates the installer-side session handle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::NotFound`] when the session does not
    /// exist.
    async fn set_native_session_id(
        &self,
        id: SessionId,
        native_session_id: NativeSessionId,
    ) -> SessionStoreResult<()>;
}

/// Pre-approval marker persistence.
///
/// Every operation is a conditional update returning whether a row changed,
/// so a stale in-memory lifecycle cannot resurrect a finalised request.
#[async_trait]
pub trait PreapprovalStore: Send + Sync {
    /// Claims a request: sets `activating` unless already preapproved.
    async fn set_activating(&self, id: SessionId) -> SessionStoreResult<bool>;

    /// Confirms a claimed request: clears `activating` and sets `active`,
    /// only while `activating` is set and the session is not preapproved.
    async fn set_active(&self, id: SessionId) -> SessionStoreResult<bool>;

    /// Finalises an outstanding request: clears `activating` and `active`
    /// and, when `preapproved` is true, sets `preapproved`. Applies only
    /// while `active` or `activating` is set.
    async fn consume_active(&self, id: SessionId, preapproved: bool) -> SessionStoreResult<bool>;

    /// Clears every marker unconditionally.
    async fn reset(&self, id: SessionId) -> SessionStoreResult<bool>;
}

/// Errors returned by session store implementations.
#[derive(Debug, Clone, Error)]
pub enum SessionStoreError {
    /// A session with the same identifier already exists.
    #[error("duplicate session identifier: {0}")]
    Duplicate(SessionId),

    /// The session was not found.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl SessionStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
