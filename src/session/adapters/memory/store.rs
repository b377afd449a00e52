//! In-memory session store for tests and embedding.

use crate::session::{
    domain::{
        NativeSessionId, PreapprovalFlags, Progress, SessionId, SessionRecord, SessionState,
    },
    ports::{PreapprovalStore, SessionStore, SessionStoreError, SessionStoreResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe in-memory session store.
///
/// Implements both [`SessionStore`] and [`PreapprovalStore`] over the same
/// records, with the conditional semantics of the SQL adapter.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    state: Arc<RwLock<InMemorySessionState>>,
}

#[derive(Debug, Default)]
struct InMemorySessionState {
    records: HashMap<SessionId, SessionRecord>,
    native_index: HashMap<NativeSessionId, SessionId>,
}

impl InMemorySessionStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().map_or(0, |state| state.records.len())
    }

    /// Returns whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> SessionStoreResult<RwLockReadGuard<'_, InMemorySessionState>> {
        self.state
            .read()
            .map_err(|err| SessionStoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> SessionStoreResult<RwLockWriteGuard<'_, InMemorySessionState>> {
        self.state
            .write()
            .map_err(|err| SessionStoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn modify(
        &self,
        id: SessionId,
        apply: impl FnOnce(&mut SessionRecord),
    ) -> SessionStoreResult<()> {
        let mut state = self.write()?;
        let record = state
            .records
            .get_mut(&id)
            .ok_or(SessionStoreError::NotFound(id))?;
        apply(record);
        Ok(())
    }

    fn modify_flags(
        &self,
        id: SessionId,
        apply: impl FnOnce(&mut PreapprovalFlags) -> bool,
    ) -> SessionStoreResult<bool> {
        let mut state = self.write()?;
        Ok(state
            .records
            .get_mut(&id)
            .is_some_and(|record| apply(record.preapproval_mut())))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, record: &SessionRecord) -> SessionStoreResult<()> {
        let mut state = self.write()?;
        if state.records.contains_key(&record.id()) {
            return Err(SessionStoreError::Duplicate(record.id()));
        }
        if let Some(native_session_id) = record.native_session_id() {
            state.native_index.insert(native_session_id, record.id());
        }
        state.records.insert(record.id(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: SessionId) -> SessionStoreResult<Option<SessionRecord>> {
        let state = self.read()?;
        Ok(state.records.get(&id).cloned())
    }

    async fn find_by_native_session_id(
        &self,
        native_session_id: NativeSessionId,
    ) -> SessionStoreResult<Option<SessionRecord>> {
        let state = self.read()?;
        Ok(state
            .native_index
            .get(&native_session_id)
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn list_unfinished(&self) -> SessionStoreResult<Vec<SessionRecord>> {
        let state = self.read()?;
        let mut records: Vec<SessionRecord> = state
            .records
            .values()
            .filter(|record| !record.state().is_terminal())
            .cloned()
            .collect();
        records.sort_by_key(SessionRecord::created_at);
        Ok(records)
    }

    async fn delete(&self, id: SessionId) -> SessionStoreResult<bool> {
        let mut state = self.write()?;
        let Some(record) = state.records.remove(&id) else {
            return Ok(false);
        };
        if let Some(native_session_id) = record.native_session_id() {
            state.native_index.remove(&native_session_id);
        }
        Ok(true)
    }

    async fn update_state(&self, id: SessionId, next: &SessionState) -> SessionStoreResult<()> {
        self.modify(id, |record| record.set_state(next.clone()))
    }

    async fn update_progress(&self, id: SessionId, progress: Progress) -> SessionStoreResult<()> {
        self.modify(id, |record| record.set_progress(progress))
    }

    async fn update_last_launch(
        &self,
        id: SessionId,
        launched_at: DateTime<Utc>,
    ) -> SessionStoreResult<()> {
        self.modify(id, |record| record.set_last_launched_at(launched_at))
    }

    async fn set_commit_attempts(&self, id: SessionId, attempts: u32) -> SessionStoreResult<()> {
        self.modify(id, |record| record.set_commit_attempts(attempts))
    }

    async fn set_confirmation_launched(
        &self,
        id: SessionId,
        launched: bool,
    ) -> SessionStoreResult<()> {
        self.modify(id, |record| record.set_confirmation_launched(launched))
    }

    async fn set_native_session_id(
        &self,
        id: SessionId,
        native_session_id: NativeSessionId,
    ) -> SessionStoreResult<()> {
        let mut state = self.write()?;
        let record = state
            .records
            .get_mut(&id)
            .ok_or(SessionStoreError::NotFound(id))?;
        let previous = record.native_session_id();
        record.set_native_session_id(native_session_id);
        if let Some(stale) = previous {
            state.native_index.remove(&stale);
        }
        state.native_index.insert(native_session_id, id);
        Ok(())
    }
}

#[async_trait]
impl PreapprovalStore for InMemorySessionStore {
    async fn set_activating(&self, id: SessionId) -> SessionStoreResult<bool> {
        self.modify_flags(id, |flags| {
            if flags.preapproved {
                return false;
            }
            flags.activating = true;
            true
        })
    }

    async fn set_active(&self, id: SessionId) -> SessionStoreResult<bool> {
        self.modify_flags(id, |flags| {
            if !flags.activating || flags.preapproved {
                return false;
            }
            flags.activating = false;
            flags.active = true;
            true
        })
    }

    async fn consume_active(&self, id: SessionId, preapproved: bool) -> SessionStoreResult<bool> {
        self.modify_flags(id, |flags| {
            if !flags.active && !flags.activating {
                return false;
            }
            flags.activating = false;
            flags.active = false;
            if preapproved {
                flags.preapproved = true;
            }
            true
        })
    }

    async fn reset(&self, id: SessionId) -> SessionStoreResult<bool> {
        self.modify_flags(id, |flags| {
            *flags = PreapprovalFlags::default();
            true
        })
    }
}
