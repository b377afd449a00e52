//! Durable projection of a session.

use super::{
    NativeSessionId, NotificationId, PreapprovalFlags, Progress, SessionId, SessionParameters,
    SessionState,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Session aggregate as persisted by the session store.
///
/// The in-memory [`crate::session::machine::Session`] owns the live state;
/// a record is the snapshot it is created from and restored from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    id: SessionId,
    parameters: SessionParameters,
    state: SessionState,
    progress: Progress,
    commit_attempts: u32,
    notification_id: NotificationId,
    confirmation_launched: bool,
    native_session_id: Option<NativeSessionId>,
    preapproval: PreapprovalFlags,
    last_launched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted session record.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSessionData {
    /// Persisted session identifier.
    pub id: SessionId,
    /// Persisted install or uninstall parameters.
    pub parameters: SessionParameters,
    /// Persisted lifecycle state, including any failure.
    pub state: SessionState,
    /// Persisted progress.
    pub progress: Progress,
    /// Persisted number of commits performed.
    pub commit_attempts: u32,
    /// Persisted notification identifier.
    pub notification_id: NotificationId,
    /// Whether a confirmation was ever launched.
    pub confirmation_launched: bool,
    /// Installer-side session handle, if created.
    pub native_session_id: Option<NativeSessionId>,
    /// Persisted pre-approval markers.
    pub preapproval: PreapprovalFlags,
    /// Latest launch timestamp, if launched.
    pub last_launched_at: Option<DateTime<Utc>>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Creates a pending session record.
    #[must_use]
    pub fn new(parameters: SessionParameters, progress_max: u32, clock: &impl Clock) -> Self {
        let id = SessionId::new();
        Self {
            id,
            parameters,
            state: SessionState::Pending,
            progress: Progress::zero(progress_max),
            commit_attempts: 0,
            notification_id: notification_id_for(id),
            confirmation_launched: false,
            native_session_id: None,
            preapproval: PreapprovalFlags::default(),
            last_launched_at: None,
            created_at: clock.utc(),
        }
    }

    /// Reconstructs a record from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedSessionData) -> Self {
        Self {
            id: data.id,
            parameters: data.parameters,
            state: data.state,
            progress: data.progress,
            commit_attempts: data.commit_attempts,
            notification_id: data.notification_id,
            confirmation_launched: data.confirmation_launched,
            native_session_id: data.native_session_id,
            preapproval: data.preapproval,
            last_launched_at: data.last_launched_at,
            created_at: data.created_at,
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the session parameters.
    #[must_use]
    pub const fn parameters(&self) -> &SessionParameters {
        &self.parameters
    }

    /// Returns the persisted state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns the persisted progress.
    #[must_use]
    pub const fn progress(&self) -> Progress {
        self.progress
    }

    /// Returns the number of commits performed.
    #[must_use]
    pub const fn commit_attempts(&self) -> u32 {
        self.commit_attempts
    }

    /// Returns the notification identifier.
    #[must_use]
    pub const fn notification_id(&self) -> NotificationId {
        self.notification_id
    }

    /// Returns whether a confirmation was ever launched.
    #[must_use]
    pub const fn confirmation_launched(&self) -> bool {
        self.confirmation_launched
    }

    /// Returns the installer-side session handle, if created.
    #[must_use]
    pub const fn native_session_id(&self) -> Option<NativeSessionId> {
        self.native_session_id
    }

    /// Returns the pre-approval markers.
    #[must_use]
    pub const fn preapproval(&self) -> PreapprovalFlags {
        self.preapproval
    }

    /// Returns the latest launch timestamp, if launched.
    #[must_use]
    pub const fn last_launched_at(&self) -> Option<DateTime<Utc>> {
        self.last_launched_at
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub(crate) const fn set_progress(&mut self, progress: Progress) {
        self.progress = progress;
    }

    pub(crate) const fn set_commit_attempts(&mut self, attempts: u32) {
        self.commit_attempts = attempts;
    }

    pub(crate) const fn set_confirmation_launched(&mut self, launched: bool) {
        self.confirmation_launched = launched;
    }

    pub(crate) const fn set_native_session_id(&mut self, native_session_id: NativeSessionId) {
        self.native_session_id = Some(native_session_id);
    }

    pub(crate) const fn set_last_launched_at(&mut self, launched_at: DateTime<Utc>) {
        self.last_launched_at = Some(launched_at);
    }

    pub(crate) const fn preapproval_mut(&mut self) -> &mut PreapprovalFlags {
        &mut self.preapproval
    }
}

/// Derives a positive notification identifier from the session identifier.
fn notification_id_for(id: SessionId) -> NotificationId {
    let (high, _, _, _) = id.as_ref().as_fields();
    NotificationId::new(i32::try_from(high & 0x7FFF_FFFF).unwrap_or_default())
}
