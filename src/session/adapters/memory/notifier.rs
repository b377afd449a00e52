//! In-memory notifier recording posted and cleared notifications.

use crate::session::{
    domain::{NotificationData, NotificationId, SessionId},
    ports::{Notifier, NotifierError, NotifierResult},
};
use async_trait::async_trait;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

/// Thread-safe notifier that records every notification it posts or
/// clears.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<NotifierState>>,
}

#[derive(Debug, Default)]
struct NotifierState {
    posted: Vec<(SessionId, NotificationId, NotificationData)>,
    cancelled: Vec<(SessionId, NotificationId)>,
    failing: bool,
}

impl InMemoryNotifier {
    /// Creates a notifier with nothing recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes later posts and cancellations fail.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut state) = self.state.write() {
            state.failing = failing;
        }
    }

    /// Returns the posted notifications in order.
    #[must_use]
    pub fn posted(&self) -> Vec<(SessionId, NotificationId, NotificationData)> {
        self.state
            .read()
            .map(|state| state.posted.clone())
            .unwrap_or_default()
    }

    /// Returns the recorded cancellations in order.
    #[must_use]
    pub fn cancelled(&self) -> Vec<(SessionId, NotificationId)> {
        self.state
            .read()
            .map(|state| state.cancelled.clone())
            .unwrap_or_default()
    }

    fn available(&self) -> NotifierResult<RwLockWriteGuard<'_, NotifierState>> {
        let state = self
            .state
            .write()
            .map_err(|err| NotifierError::runtime(std::io::Error::other(err.to_string())))?;
        if state.failing {
            return Err(NotifierError::runtime(std::io::Error::other(
                "notification service unavailable",
            )));
        }
        Ok(state)
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(
        &self,
        session_id: SessionId,
        notification_id: NotificationId,
        data: &NotificationData,
    ) -> NotifierResult<()> {
        self.available()?
            .posted
            .push((session_id, notification_id, data.clone()));
        Ok(())
    }

    async fn cancel(
        &self,
        session_id: SessionId,
        notification_id: NotificationId,
    ) -> NotifierResult<()> {
        self.available()?
            .cancelled
            .push((session_id, notification_id));
        Ok(())
    }
}
