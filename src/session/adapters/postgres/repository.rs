//! `PostgreSQL` store implementation for package sessions.

use super::{
    models::{SessionRow, StateColumns, row_to_record, to_column, to_new_row},
    schema::package_sessions,
};
use crate::session::{
    domain::{NativeSessionId, Progress, SessionId, SessionRecord, SessionState, SessionStateKind},
    ports::{PreapprovalStore, SessionStore, SessionStoreError, SessionStoreResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by session adapters.
pub type SessionPgPool = Pool<ConnectionManager<PgConnection>>;

const TERMINAL_STATES: [&str; 3] = [
    SessionStateKind::Cancelled.as_str(),
    SessionStateKind::Succeeded.as_str(),
    SessionStateKind::Failed.as_str(),
];

/// `PostgreSQL`-backed session store.
///
/// Implements [`SessionStore`] and [`PreapprovalStore`] over the
/// `package_sessions` table. Pre-approval updates are single conditional
/// `UPDATE` statements, so concurrent writers cannot interleave a
/// read-modify-write.
#[derive(Debug, Clone)]
pub struct PostgresSessionStore {
    pool: SessionPgPool,
}

impl PostgresSessionStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: SessionPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> SessionStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> SessionStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(SessionStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(SessionStoreError::persistence)?
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn insert(&self, record: &SessionRecord) -> SessionStoreResult<()> {
        let session_id = record.id();
        let new_row = to_new_row(record)?;

        self.run_blocking(move |connection| {
            diesel::insert_into(package_sessions::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        SessionStoreError::Duplicate(session_id)
                    }
                    _ => SessionStoreError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: SessionId) -> SessionStoreResult<Option<SessionRecord>> {
        self.run_blocking(move |connection| {
            let row = package_sessions::table
                .filter(package_sessions::id.eq(id.into_inner()))
                .select(SessionRow::as_select())
                .first::<SessionRow>(connection)
                .optional()
                .map_err(SessionStoreError::persistence)?;
            row.map(row_to_record).transpose()
        })
        .await
    }

    async fn find_by_native_session_id(
        &self,
        native_session_id: NativeSessionId,
    ) -> SessionStoreResult<Option<SessionRecord>> {
        self.run_blocking(move |connection| {
            let row = package_sessions::table
                .filter(package_sessions::native_session_id.eq(native_session_id.value()))
                .select(SessionRow::as_select())
                .first::<SessionRow>(connection)
                .optional()
                .map_err(SessionStoreError::persistence)?;
            row.map(row_to_record).transpose()
        })
        .await
    }

    async fn list_unfinished(&self) -> SessionStoreResult<Vec<SessionRecord>> {
        self.run_blocking(move |connection| {
            let rows = package_sessions::table
                .filter(package_sessions::state.ne_all(TERMINAL_STATES.to_vec()))
                .order(package_sessions::created_at.asc())
                .select(SessionRow::as_select())
                .load::<SessionRow>(connection)
                .map_err(SessionStoreError::persistence)?;
            rows.into_iter().map(row_to_record).collect()
        })
        .await
    }

    async fn delete(&self, id: SessionId) -> SessionStoreResult<bool> {
        self.run_blocking(move |connection| {
            let deleted = diesel::delete(
                package_sessions::table.filter(package_sessions::id.eq(id.into_inner())),
            )
            .execute(connection)
            .map_err(SessionStoreError::persistence)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn update_state(&self, id: SessionId, state: &SessionState) -> SessionStoreResult<()> {
        let StateColumns {
            state: state_column,
            failure,
        } = StateColumns::from_state(state)?;
        self.run_blocking(move |connection| {
            let updated = diesel::update(by_id(id))
                .set((
                    package_sessions::state.eq(state_column),
                    package_sessions::failure.eq(failure),
                ))
                .execute(connection)
                .map_err(SessionStoreError::persistence)?;
            expect_row(id, updated)
        })
        .await
    }

    async fn update_progress(&self, id: SessionId, progress: Progress) -> SessionStoreResult<()> {
        let current = to_column(progress.current())?;
        let max = to_column(progress.max())?;
        self.run_blocking(move |connection| {
            let updated = diesel::update(by_id(id))
                .set((
                    package_sessions::progress_current.eq(current),
                    package_sessions::progress_max.eq(max),
                ))
                .execute(connection)
                .map_err(SessionStoreError::persistence)?;
            expect_row(id, updated)
        })
        .await
    }

    async fn update_last_launch(
        &self,
        id: SessionId,
        launched_at: DateTime<Utc>,
    ) -> SessionStoreResult<()> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(by_id(id))
                .set(package_sessions::last_launched_at.eq(Some(launched_at)))
                .execute(connection)
                .map_err(SessionStoreError::persistence)?;
            expect_row(id, updated)
        })
        .await
    }

    async fn set_commit_attempts(&self, id: SessionId, attempts: u32) -> SessionStoreResult<()> {
        let attempts_column = to_column(attempts)?;
        self.run_blocking(move |connection| {
            let updated = diesel::update(by_id(id))
                .set(package_sessions::commit_attempts.eq(attempts_column))
                .execute(connection)
                .map_err(SessionStoreError::persistence)?;
            expect_row(id, updated)
        })
        .await
    }

    async fn set_confirmation_launched(
        &self,
        id: SessionId,
        launched: bool,
    ) -> SessionStoreResult<()> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(by_id(id))
                .set(package_sessions::confirmation_launched.eq(launched))
                .execute(connection)
                .map_err(SessionStoreError::persistence)?;
            expect_row(id, updated)
        })
        .await
    }

    async fn set_native_session_id(
        &self,
        id: SessionId,
        native_session_id: NativeSessionId,
    ) -> SessionStoreResult<()> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(by_id(id))
                .set(package_sessions::native_session_id.eq(Some(native_session_id.value())))
                .execute(connection)
                .map_err(SessionStoreError::persistence)?;
            expect_row(id, updated)
        })
        .await
    }
}

#[async_trait]
impl PreapprovalStore for PostgresSessionStore {
    async fn set_activating(&self, id: SessionId) -> SessionStoreResult<bool> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(by_id(id).filter(package_sessions::preapproved.eq(false)))
                .set(package_sessions::preapproval_activating.eq(true))
                .execute(connection)
                .map_err(SessionStoreError::persistence)?;
            Ok(updated > 0)
        })
        .await
    }

    async fn set_active(&self, id: SessionId) -> SessionStoreResult<bool> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                by_id(id)
                    .filter(package_sessions::preapproval_activating.eq(true))
                    .filter(package_sessions::preapproved.eq(false)),
            )
            .set((
                package_sessions::preapproval_activating.eq(false),
                package_sessions::preapproval_active.eq(true),
            ))
            .execute(connection)
            .map_err(SessionStoreError::persistence)?;
            Ok(updated > 0)
        })
        .await
    }

    async fn consume_active(&self, id: SessionId, preapproved: bool) -> SessionStoreResult<bool> {
        self.run_blocking(move |connection| {
            let outstanding = by_id(id).filter(
                package_sessions::preapproval_active
                    .eq(true)
                    .or(package_sessions::preapproval_activating.eq(true)),
            );
            let clear = (
                package_sessions::preapproval_activating.eq(false),
                package_sessions::preapproval_active.eq(false),
            );
            let result = if preapproved {
                diesel::update(outstanding)
                    .set((clear, package_sessions::preapproved.eq(true)))
                    .execute(connection)
            } else {
                diesel::update(outstanding).set(clear).execute(connection)
            };
            let updated = result.map_err(SessionStoreError::persistence)?;
            Ok(updated > 0)
        })
        .await
    }

    async fn reset(&self, id: SessionId) -> SessionStoreResult<bool> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(by_id(id))
                .set((
                    package_sessions::preapproval_activating.eq(false),
                    package_sessions::preapproval_active.eq(false),
                    package_sessions::preapproved.eq(false),
                ))
                .execute(connection)
                .map_err(SessionStoreError::persistence)?;
            Ok(updated > 0)
        })
        .await
    }
}

fn by_id(
    id: SessionId,
) -> diesel::dsl::Filter<package_sessions::table, diesel::dsl::Eq<package_sessions::id, uuid::Uuid>>
{
    package_sessions::table.filter(package_sessions::id.eq(id.into_inner()))
}

const fn expect_row(id: SessionId, updated: usize) -> SessionStoreResult<()> {
    if updated == 0 {
        return Err(SessionStoreError::NotFound(id));
    }
    Ok(())
}
