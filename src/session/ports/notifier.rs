//! User-facing notification port.

use crate::session::domain::{NotificationData, NotificationId, SessionId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for notifier operations.
pub type NotifierResult<T> = Result<T, NotifierError>;

/// Posts and clears notifications owned by sessions.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Shows the notification through which the user reaches a deferred
    /// confirmation. Posting again under the same identifier replaces it.
    async fn notify(
        &self,
        session_id: SessionId,
        notification_id: NotificationId,
        data: &NotificationData,
    ) -> NotifierResult<()>;

    /// Removes the notification shown for a session, if any.
    async fn cancel(
        &self,
        session_id: SessionId,
        notification_id: NotificationId,
    ) -> NotifierResult<()>;
}

/// Errors returned by notifier adapters.
#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    /// Generic notifier failure.
    #[error("notifier error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl NotifierError {
    /// Wraps a runtime error from the notifier adapter.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }
}
