//! Observer contracts exposed by sessions.
//!
//! Callbacks run synchronously on whichever worker drains the session lane.
//! They must return quickly and must not panic. A callback may register
//! further listeners on the same session; those receive the current value
//! immediately and every later change.

use crate::session::domain::{Progress, SessionId, SessionState};

/// Observes session state changes.
pub trait StateListener: Send + Sync {
    /// Called with the current state on registration and after every
    /// applied transition.
    fn on_state_changed(&self, session_id: SessionId, state: &SessionState);
}

/// Observes session progress changes.
pub trait ProgressListener: Send + Sync {
    /// Called with the current progress on registration and after every
    /// distinct progress update.
    fn on_progress_changed(&self, session_id: SessionId, progress: Progress);
}
