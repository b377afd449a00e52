//! Registry owning the live sessions of a process.

use super::install::{InstallCollaborators, InstallRoutines};
use super::uninstall::UninstallRoutines;
use crate::session::concurrency::{BinarySemaphore, SerialLane};
use crate::session::domain::{
    InstallParameters, NativeSessionId, SessionConfig, SessionId, SessionParameters,
    SessionRecord, UninstallParameters,
};
use crate::session::machine::{Session, SessionDeps};
use crate::session::ports::{
    InstallerEvent, InstallerService, Notifier, PreapprovalStore, SessionRoutines, SessionStore,
    SessionStoreError, UninstallerService,
};
use mockable::Clock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Service-level errors for session registry operations.
#[derive(Debug, Error)]
pub enum SessionRegistryError {
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] SessionStoreError),
}

/// Result type for session registry operations.
pub type SessionRegistryResult<T> = Result<T, SessionRegistryError>;

/// Infrastructure a registry wires into every session it creates.
pub struct SessionEnvironment<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Session persistence.
    pub store: Arc<dyn SessionStore>,
    /// Pre-approval marker persistence.
    pub preapproval_store: Arc<dyn PreapprovalStore>,
    /// Platform installer.
    pub installer: Arc<dyn InstallerService>,
    /// Platform uninstaller.
    pub uninstaller: Arc<dyn UninstallerService>,
    /// Notification port.
    pub notifier: Arc<dyn Notifier>,
    /// Clock for session timestamps.
    pub clock: Arc<C>,
    /// Runtime driving the session lanes.
    pub runtime: Handle,
    /// Session tunables.
    pub config: SessionConfig,
}

impl<C> Clone for SessionEnvironment<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            preapproval_store: Arc::clone(&self.preapproval_store),
            installer: Arc::clone(&self.installer),
            uninstaller: Arc::clone(&self.uninstaller),
            notifier: Arc::clone(&self.notifier),
            clock: Arc::clone(&self.clock),
            runtime: self.runtime.clone(),
            config: self.config,
        }
    }
}

/// Owns live sessions, creates new ones and restores persisted ones.
///
/// Every session gets its own serial lane on the shared runtime; all
/// sessions of a registry share one write guard for durable
/// read-modify-write sequences.
pub struct SessionRegistry<C>
where
    C: Clock + Send + Sync + 'static,
{
    env: SessionEnvironment<C>,
    write_guard: BinarySemaphore,
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl<C> SessionRegistry<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new(env: SessionEnvironment<C>) -> Self {
        Self {
            env,
            write_guard: BinarySemaphore::new(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.env.config
    }

    /// Creates and persists a pending install session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionRegistryError::Store`] when the record cannot be
    /// inserted.
    pub async fn create_install(
        &self,
        parameters: InstallParameters,
    ) -> SessionRegistryResult<Session> {
        self.create(parameters.into()).await
    }

    /// Creates and persists a pending uninstall session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionRegistryError::Store`] when the record cannot be
    /// inserted.
    pub async fn create_uninstall(
        &self,
        parameters: UninstallParameters,
    ) -> SessionRegistryResult<Session> {
        self.create(parameters.into()).await
    }

    /// Returns a live session, restoring it from the store when it is not
    /// in memory.
    ///
    /// # Errors
    ///
    /// Returns [`SessionRegistryError::Store`] when the lookup fails.
    pub async fn get(&self, id: SessionId) -> SessionRegistryResult<Option<Session>> {
        if let Some(session) = self.read().get(&id) {
            return Ok(Some(session.clone()));
        }
        let Some(record) = self.env.store.find_by_id(id).await? else {
            return Ok(None);
        };
        Ok(Some(self.adopt(&record)))
    }

    /// Returns the in-memory sessions.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        self.read().values().cloned().collect()
    }

    /// Returns the number of in-memory sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns whether no session is in memory.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drops a session from memory. Its durable record is kept.
    pub fn remove(&self, id: SessionId) -> Option<Session> {
        self.write().remove(&id)
    }

    /// Restores every unfinished persisted session that is not already in
    /// memory and returns the restored sessions.
    ///
    /// Restored sessions are not driven; attach a driver or call `launch`
    /// or `commit` to resume them.
    ///
    /// # Errors
    ///
    /// Returns [`SessionRegistryError::Store`] when listing fails.
    pub async fn restore_unfinished(&self) -> SessionRegistryResult<Vec<Session>> {
        let records = self.env.store.list_unfinished().await?;
        let mut restored = Vec::with_capacity(records.len());
        for record in records {
            if self.read().contains_key(&record.id()) {
                continue;
            }
            debug!(session_id = %record.id(), state = %record.state(), "restoring session");
            restored.push(self.adopt(&record));
        }
        info!(count = restored.len(), "restored unfinished sessions");
        Ok(restored)
    }

    /// Routes an installer event to a session. Returns whether the session
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`SessionRegistryError::Store`] when the session has to be
    /// restored and the lookup fails.
    pub async fn dispatch(
        &self,
        id: SessionId,
        event: InstallerEvent,
    ) -> SessionRegistryResult<bool> {
        let Some(session) = self.get(id).await? else {
            debug!(session_id = %id, ?event, "dropping event for unknown session");
            return Ok(false);
        };
        session.handle_event(event);
        Ok(true)
    }

    /// Routes an installer event addressed by native session handle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionRegistryError::Store`] when the lookup fails.
    pub async fn dispatch_native(
        &self,
        native_session_id: NativeSessionId,
        event: InstallerEvent,
    ) -> SessionRegistryResult<bool> {
        let Some(record) = self
            .env
            .store
            .find_by_native_session_id(native_session_id)
            .await?
        else {
            debug!(
                native_session_id = %native_session_id,
                ?event,
                "dropping event for unknown installer session"
            );
            return Ok(false);
        };
        self.dispatch(record.id(), event).await
    }

    async fn create(&self, parameters: SessionParameters) -> SessionRegistryResult<Session> {
        let record =
            SessionRecord::new(parameters, self.env.config.progress_max, &*self.env.clock);
        self.env.store.insert(&record).await?;
        info!(session_id = %record.id(), kind = record.parameters().kind().as_str(), "created session");
        Ok(self.adopt(&record))
    }

    /// Inserts the live session for `record` unless another caller already
    /// did, and returns the registered one.
    fn adopt(&self, record: &SessionRecord) -> Session {
        self.write()
            .entry(record.id())
            .or_insert_with(|| self.activate(record))
            .clone()
    }

    fn activate(&self, record: &SessionRecord) -> Session {
        let routines: Arc<dyn SessionRoutines> = match record.parameters() {
            SessionParameters::Install(parameters) => Arc::new(InstallRoutines::new(
                record,
                parameters.clone(),
                InstallCollaborators {
                    installer: Arc::clone(&self.env.installer),
                    store: Arc::clone(&self.env.store),
                    preapproval_store: Arc::clone(&self.env.preapproval_store),
                    write_guard: self.write_guard.clone(),
                    liveness: self.env.config.liveness,
                },
            )),
            SessionParameters::Uninstall(parameters) => Arc::new(UninstallRoutines::new(
                parameters.clone(),
                Arc::clone(&self.env.uninstaller),
            )),
        };
        let clock: Arc<dyn Clock + Send + Sync> = self.env.clock.clone();
        Session::new(
            record,
            routines,
            SessionDeps {
                store: Arc::clone(&self.env.store),
                notifier: Arc::clone(&self.env.notifier),
                clock,
                write_guard: self.write_guard.clone(),
                lane: SerialLane::new(self.env.runtime.clone()),
            },
        )
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> fmt::Debug for SessionRegistry<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.env.config)
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}
