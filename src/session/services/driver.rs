//! Listener that drives a session to a terminal state.

use crate::session::domain::{Failure, SessionId, SessionState};
use crate::session::listeners::Subscription;
use crate::session::machine::{Session, WeakSession};
use crate::session::ports::StateListener;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

type OutcomeCallback = Box<dyn Fn(SessionId) + Send + Sync>;
type FailureCallback = Box<dyn Fn(SessionId, &Failure) + Send + Sync>;

/// Callbacks fired once when a driven session terminates.
#[derive(Default)]
pub struct TerminalCallbacks {
    on_success: Option<OutcomeCallback>,
    on_failure: Option<FailureCallback>,
    on_cancelled: Option<OutcomeCallback>,
}

impl TerminalCallbacks {
    /// Creates an empty callback set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the callback for `Succeeded`.
    #[must_use]
    pub fn on_success(mut self, callback: impl Fn(SessionId) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Sets the callback for `Failed`.
    #[must_use]
    pub fn on_failure(
        mut self,
        callback: impl Fn(SessionId, &Failure) + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Box::new(callback));
        self
    }

    /// Sets the callback for `Cancelled`.
    #[must_use]
    pub fn on_cancelled(mut self, callback: impl Fn(SessionId) + Send + Sync + 'static) -> Self {
        self.on_cancelled = Some(Box::new(callback));
        self
    }

    /// Attaches a driver with these callbacks to `session`.
    ///
    /// The driver launches pending or active sessions and commits awaiting
    /// or committed ones. On the first terminal state it detaches itself
    /// and fires the matching callback. Disposing the returned subscription
    /// stops driving without firing anything.
    pub fn bind(self, session: &Session) -> Subscription {
        let driver = Arc::new(TerminalStateDriver {
            session: session.downgrade(),
            callbacks: self,
            finished: AtomicBool::new(false),
        });
        let listener: Arc<dyn StateListener> = Arc::clone(&driver) as Arc<dyn StateListener>;
        let subscription = session.add_state_listener(listener);
        if driver.finished.load(Ordering::Acquire) {
            return Subscription::disposed();
        }
        subscription
    }
}

impl fmt::Debug for TerminalCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("on_cancelled", &self.on_cancelled.is_some())
            .finish()
    }
}

/// State listener created by [`TerminalCallbacks::bind`].
pub struct TerminalStateDriver {
    session: WeakSession,
    callbacks: TerminalCallbacks,
    finished: AtomicBool,
}

impl TerminalStateDriver {
    fn terminate(&self, session_id: SessionId, state: &SessionState) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(session) = self.session.upgrade() {
            session.remove_state_listener(self);
        }
        debug!(session_id = %session_id, %state, "driven session terminated");
        match state {
            SessionState::Succeeded => {
                if let Some(callback) = &self.callbacks.on_success {
                    callback(session_id);
                }
            }
            SessionState::Failed(failure) => {
                if let Some(callback) = &self.callbacks.on_failure {
                    callback(session_id, failure);
                }
            }
            SessionState::Cancelled => {
                if let Some(callback) = &self.callbacks.on_cancelled {
                    callback(session_id);
                }
            }
            _ => {}
        }
    }
}

impl StateListener for TerminalStateDriver {
    fn on_state_changed(&self, session_id: SessionId, state: &SessionState) {
        if self.finished.load(Ordering::Acquire) {
            return;
        }
        if state.is_terminal() {
            self.terminate(session_id, state);
            return;
        }
        let Some(session) = self.session.upgrade() else {
            return;
        };
        match state {
            SessionState::Pending | SessionState::Active => {
                session.launch();
            }
            SessionState::Awaiting | SessionState::Committed => {
                session.commit();
            }
            _ => {}
        }
    }
}

impl fmt::Debug for TerminalStateDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalStateDriver")
            .field("finished", &self.finished.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
