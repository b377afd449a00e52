//! Deduplicated progress reporting.

use crate::session::domain::{Progress, SessionId};
use crate::session::listeners::{ListenerRegistry, Subscription};
use crate::session::ports::ProgressListener;
use parking_lot::ReentrantMutex;
use std::sync::{Arc, PoisonError, RwLock};

/// Tracks the last reported progress of a session and its listeners.
pub(super) struct ProgressTracker {
    current: RwLock<Progress>,
    delivery: ReentrantMutex<()>,
    listeners: Arc<ListenerRegistry<dyn ProgressListener>>,
}

impl ProgressTracker {
    pub(super) fn new(initial: Progress) -> Self {
        Self {
            current: RwLock::new(initial),
            delivery: ReentrantMutex::new(()),
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    pub(super) fn get(&self) -> Progress {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn max(&self) -> u32 {
        self.get().max()
    }

    /// Stores `next` and notifies listeners unless it equals the last value.
    pub(super) fn update(&self, session_id: SessionId, next: Progress) -> bool {
        let _delivery = self.delivery.lock();
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if *current == next {
                return false;
            }
            *current = next;
        }
        for registration in self.listeners.snapshot() {
            if self.listeners.is_valid(&registration) {
                registration
                    .listener()
                    .on_progress_changed(session_id, next);
            }
        }
        true
    }

    pub(super) fn add_listener(
        &self,
        session_id: SessionId,
        listener: Arc<dyn ProgressListener>,
    ) -> Subscription {
        let _delivery = self.delivery.lock();
        let Some(registration) = self.listeners.add(Arc::clone(&listener)) else {
            return Subscription::disposed();
        };
        listener.on_progress_changed(session_id, self.get());
        self.listeners.subscription_of(&registration)
    }

    pub(super) fn remove_listener(&self, listener: &(dyn ProgressListener + 'static)) -> bool {
        self.listeners.remove(listener)
    }
}
