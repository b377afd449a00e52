//! Diesel row models for package session persistence.

use super::schema::package_sessions;
use crate::session::{
    domain::{
        Failure, NativeSessionId, NotificationId, PersistedSessionData, PreapprovalFlags, Progress,
        SessionId, SessionKind, SessionParameters, SessionRecord, SessionState, SessionStateKind,
    },
    ports::{SessionStoreError, SessionStoreResult},
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for session records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = package_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SessionRow {
    /// Session identifier.
    pub id: uuid::Uuid,
    /// Session kind discriminant.
    pub kind: String,
    /// Parameters JSON payload.
    pub parameters: Value,
    /// Lifecycle state discriminant.
    pub state: String,
    /// Failure JSON payload.
    pub failure: Option<Value>,
    /// Current progress.
    pub progress_current: i32,
    /// Maximum progress.
    pub progress_max: i32,
    /// Number of commits performed.
    pub commit_attempts: i32,
    /// Notification identifier.
    pub notification_id: i32,
    /// Whether a confirmation was ever launched.
    pub confirmation_launched: bool,
    /// Installer-side session handle.
    pub native_session_id: Option<i32>,
    /// Pre-approval claimed but not confirmed.
    pub preapproval_activating: bool,
    /// Pre-approval outstanding.
    pub preapproval_active: bool,
    /// Pre-approval granted.
    pub preapproved: bool,
    /// Latest launch timestamp.
    pub last_launched_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Insert model for session records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = package_sessions)]
pub struct NewSessionRow {
    /// Session identifier.
    pub id: uuid::Uuid,
    /// Session kind discriminant.
    pub kind: String,
    /// Parameters JSON payload.
    pub parameters: Value,
    /// Lifecycle state discriminant.
    pub state: String,
    /// Failure JSON payload.
    pub failure: Option<Value>,
    /// Current progress.
    pub progress_current: i32,
    /// Maximum progress.
    pub progress_max: i32,
    /// Number of commits performed.
    pub commit_attempts: i32,
    /// Notification identifier.
    pub notification_id: i32,
    /// Whether a confirmation was ever launched.
    pub confirmation_launched: bool,
    /// Installer-side session handle.
    pub native_session_id: Option<i32>,
    /// Pre-approval claimed but not confirmed.
    pub preapproval_activating: bool,
    /// Pre-approval outstanding.
    pub preapproval_active: bool,
    /// Pre-approval granted.
    pub preapproved: bool,
    /// Latest launch timestamp.
    pub last_launched_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Column values written by a state update.
pub struct StateColumns {
    /// Lifecycle state discriminant.
    pub state: String,
    /// Failure JSON payload.
    pub failure: Option<Value>,
}

impl StateColumns {
    /// Splits a state into its discriminant and failure payload.
    pub fn from_state(state: &SessionState) -> SessionStoreResult<Self> {
        let failure = state
            .failure()
            .map(serde_json::to_value)
            .transpose()
            .map_err(SessionStoreError::persistence)?;
        Ok(Self {
            state: state.kind().as_str().to_owned(),
            failure,
        })
    }
}

/// Converts a record into an insert row.
pub fn to_new_row(record: &SessionRecord) -> SessionStoreResult<NewSessionRow> {
    let parameters =
        serde_json::to_value(record.parameters()).map_err(SessionStoreError::persistence)?;
    let StateColumns { state, failure } = StateColumns::from_state(record.state())?;
    let progress = record.progress();
    let flags = record.preapproval();
    Ok(NewSessionRow {
        id: record.id().into_inner(),
        kind: record.parameters().kind().as_str().to_owned(),
        parameters,
        state,
        failure,
        progress_current: to_column(progress.current())?,
        progress_max: to_column(progress.max())?,
        commit_attempts: to_column(record.commit_attempts())?,
        notification_id: record.notification_id().value(),
        confirmation_launched: record.confirmation_launched(),
        native_session_id: record.native_session_id().map(NativeSessionId::value),
        preapproval_activating: flags.activating,
        preapproval_active: flags.active,
        preapproved: flags.preapproved,
        last_launched_at: record.last_launched_at(),
        created_at: record.created_at(),
    })
}

/// Reconstructs a record from a query row.
pub fn row_to_record(row: SessionRow) -> SessionStoreResult<SessionRecord> {
    let SessionRow {
        id,
        kind: persisted_kind,
        parameters: persisted_parameters,
        state: persisted_state,
        failure: persisted_failure,
        progress_current,
        progress_max,
        commit_attempts,
        notification_id,
        confirmation_launched,
        native_session_id,
        preapproval_activating,
        preapproval_active,
        preapproved,
        last_launched_at,
        created_at,
    } = row;

    let parameters = serde_json::from_value::<SessionParameters>(persisted_parameters)
        .map_err(SessionStoreError::persistence)?;
    let kind = SessionKind::try_from(persisted_kind.as_str())
        .map_err(SessionStoreError::persistence)?;
    if kind != parameters.kind() {
        return Err(SessionStoreError::persistence(std::io::Error::other(format!(
            "session {id} is stored as {} but carries {} parameters",
            kind.as_str(),
            parameters.kind().as_str()
        ))));
    }
    let failure = persisted_failure
        .map(serde_json::from_value::<Failure>)
        .transpose()
        .map_err(SessionStoreError::persistence)?;
    let state_kind = SessionStateKind::try_from(persisted_state.as_str())
        .map_err(SessionStoreError::persistence)?;
    let progress = Progress::new(from_column(progress_current)?, from_column(progress_max)?)
        .map_err(SessionStoreError::persistence)?;

    let data = PersistedSessionData {
        id: SessionId::from_uuid(id),
        parameters,
        state: state_from_columns(state_kind, failure),
        progress,
        commit_attempts: from_column(commit_attempts)?,
        notification_id: NotificationId::new(notification_id),
        confirmation_launched,
        native_session_id: native_session_id.map(NativeSessionId::new),
        preapproval: PreapprovalFlags {
            activating: preapproval_activating,
            active: preapproval_active,
            preapproved,
        },
        last_launched_at,
        created_at,
    };
    Ok(SessionRecord::from_persisted(data))
}

/// Rebuilds a state from its discriminant. A failed row without payload
/// restores as a generic failure.
fn state_from_columns(kind: SessionStateKind, failure: Option<Failure>) -> SessionState {
    match kind {
        SessionStateKind::Pending => SessionState::Pending,
        SessionStateKind::Active => SessionState::Active,
        SessionStateKind::Awaiting => SessionState::Awaiting,
        SessionStateKind::Committed => SessionState::Committed,
        SessionStateKind::Cancelled => SessionState::Cancelled,
        SessionStateKind::Succeeded => SessionState::Succeeded,
        SessionStateKind::Failed => {
            SessionState::Failed(failure.unwrap_or(Failure::Generic { message: None }))
        }
    }
}

pub(super) fn to_column(value: u32) -> SessionStoreResult<i32> {
    i32::try_from(value).map_err(SessionStoreError::persistence)
}

fn from_column(value: i32) -> SessionStoreResult<u32> {
    u32::try_from(value).map_err(SessionStoreError::persistence)
}
