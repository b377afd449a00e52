//! The session state machine.

use super::progress::ProgressTracker;
use crate::session::concurrency::{BinarySemaphore, SerialLane};
use crate::session::domain::{
    Completion, Confirmation, Failure, NotificationId, Progress, SessionId, SessionKind, SessionParameters,
    SessionRecord, SessionState, TimeoutDecision, TimeoutStrategy,
};
use crate::session::listeners::{ListenerRegistry, Subscription};
use crate::session::ports::{
    InstallerEvent, Notifier, ProgressListener, RoutineError, SessionRoutines, SessionStore,
    StateListener,
};
use mockable::Clock;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Collaborators shared by the sessions of one registry.
#[derive(Clone)]
pub struct SessionDeps {
    /// Persistence gateway.
    pub store: Arc<dyn SessionStore>,
    /// Posts deferred confirmations and clears them on cleanup.
    pub notifier: Arc<dyn Notifier>,
    /// Clock for launch timestamps.
    pub clock: Arc<dyn Clock + Send + Sync>,
    /// Guard for durable read-modify-write sequences.
    pub write_guard: BinarySemaphore,
    /// Lane every job of the session runs on.
    pub lane: SerialLane,
}

/// A durable install or uninstall session.
///
/// Cloning yields another handle to the same session. `launch`, `commit`,
/// `cancel` and `complete` check their guards synchronously, enqueue the
/// work on the session lane and return immediately; their effects are
/// observed through listeners, [`Session::settled`] or
/// [`Session::wait_terminal`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionCore>,
}

/// Non-owning handle to a [`Session`].
#[derive(Clone)]
pub struct WeakSession {
    inner: Weak<SessionCore>,
}

impl WeakSession {
    /// Returns the session if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Session> {
        self.inner.upgrade().map(|inner| Session { inner })
    }
}

impl fmt::Debug for WeakSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSession").finish_non_exhaustive()
    }
}

struct SessionCore {
    id: SessionId,
    parameters: SessionParameters,
    notification_id: NotificationId,
    timeout_strategy: TimeoutStrategy,
    state: watch::Sender<SessionState>,
    delivery: ReentrantMutex<()>,
    state_listeners: Arc<ListenerRegistry<dyn StateListener>>,
    progress: ProgressTracker,
    flags: InFlight,
    commit_attempts: AtomicU32,
    confirmation_launched: AtomicBool,
    routines: Arc<dyn SessionRoutines>,
    deps: SessionDeps,
}

#[derive(Default)]
struct InFlight {
    preparing: AtomicBool,
    committing: AtomicBool,
    committed: AtomicBool,
    cancelling: AtomicBool,
}

impl Session {
    /// Creates the live session for a record.
    ///
    /// Pending records start fresh; records in any other state resume from
    /// their persisted state, progress and commit attempts.
    #[must_use]
    pub fn new(
        record: &SessionRecord,
        routines: Arc<dyn SessionRoutines>,
        deps: SessionDeps,
    ) -> Self {
        let parameters = record.parameters().clone();
        let timeout_strategy = parameters
            .constraints()
            .map_or(TimeoutStrategy::Fail, |constraints| {
                constraints.timeout_strategy
            });
        let (state, _) = watch::channel(record.state().clone());
        Self {
            inner: Arc::new(SessionCore {
                id: record.id(),
                parameters,
                notification_id: record.notification_id(),
                timeout_strategy,
                state,
                delivery: ReentrantMutex::new(()),
                state_listeners: Arc::new(ListenerRegistry::new()),
                progress: ProgressTracker::new(record.progress()),
                flags: InFlight::default(),
                commit_attempts: AtomicU32::new(record.commit_attempts()),
                confirmation_launched: AtomicBool::new(record.confirmation_launched()),
                routines,
                deps,
            }),
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Returns a handle that does not keep the session alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakSession {
        WeakSession {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns the session kind.
    #[must_use]
    pub fn kind(&self) -> SessionKind {
        self.inner.parameters.kind()
    }

    /// Returns the session parameters.
    #[must_use]
    pub fn parameters(&self) -> &SessionParameters {
        &self.inner.parameters
    }

    /// Returns the notification identifier.
    #[must_use]
    pub fn notification_id(&self) -> NotificationId {
        self.inner.notification_id
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Returns the last reported progress.
    #[must_use]
    pub fn progress(&self) -> Progress {
        self.inner.progress.get()
    }

    /// Returns the number of commits performed, including restored ones.
    #[must_use]
    pub fn commit_attempts(&self) -> u32 {
        self.inner.commit_attempts.load(Ordering::Acquire)
    }

    /// Returns whether a confirmation was ever launched.
    #[must_use]
    pub fn confirmation_launched(&self) -> bool {
        self.inner.confirmation_launched.load(Ordering::Acquire)
    }

    /// Returns whether the session was launched and has not terminated.
    #[must_use]
    pub fn is_active(&self) -> bool {
        let state = self.inner.state.borrow();
        !matches!(*state, SessionState::Pending) && !state.is_terminal()
    }

    /// Returns whether the session succeeded or failed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.state.borrow().is_completed()
    }

    /// Returns whether the session was cancelled or a cancellation is
    /// pending.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        let state = self.inner.state.borrow();
        matches!(*state, SessionState::Cancelled)
            || (self.is_cancellation_requested() && !state.is_terminal())
    }

    /// Returns whether `cancel` was called. Routines poll this to stop
    /// long-running work early.
    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.flags.cancelling.load(Ordering::Acquire)
    }

    /// Launches preparation.
    ///
    /// Accepted only from `Pending` or `Active` while no preparation or
    /// cancellation is in flight. Re-launching an `Active` session reruns
    /// preparation.
    pub fn launch(&self) -> bool {
        let flags = &self.inner.flags;
        if flags.preparing.load(Ordering::Acquire) || flags.cancelling.load(Ordering::Acquire) {
            return false;
        }
        if !matches!(self.state(), SessionState::Pending | SessionState::Active) {
            return false;
        }
        if flags.preparing.swap(true, Ordering::AcqRel) {
            return false;
        }
        let session = self.clone();
        self.inner.deps.lane.execute(async move { session.run_launch().await });
        true
    }

    /// Commits a prepared session.
    ///
    /// Accepted only from `Awaiting` or `Committed` while no commit or
    /// cancellation is in flight, and at most once per entry into
    /// `Awaiting`.
    pub fn commit(&self) -> bool {
        let flags = &self.inner.flags;
        if flags.committed.load(Ordering::Acquire)
            || flags.committing.load(Ordering::Acquire)
            || flags.cancelling.load(Ordering::Acquire)
        {
            return false;
        }
        if !matches!(self.state(), SessionState::Awaiting | SessionState::Committed) {
            return false;
        }
        if flags.committing.swap(true, Ordering::AcqRel) {
            return false;
        }
        let session = self.clone();
        self.inner.deps.lane.execute(async move { session.run_commit().await });
        true
    }

    /// Cancels the session unless it is already terminal.
    ///
    /// Once the enqueued job runs, `Cancelled` overwrites any non-terminal
    /// state.
    pub fn cancel(&self) {
        if self.inner.state.borrow().is_terminal() {
            return;
        }
        if self.inner.flags.cancelling.swap(true, Ordering::AcqRel) {
            return;
        }
        let session = self.clone();
        self.inner
            .deps
            .lane
            .execute(async move { session.handle_cancellation().await });
    }

    /// Completes the session.
    ///
    /// A timeout failure is first offered to the commit retry policy, which
    /// may send the session back to `Awaiting` instead.
    pub fn complete(&self, completion: Completion) {
        let session = self.clone();
        self.inner
            .deps
            .lane
            .execute(async move { session.settle(completion).await });
    }

    /// Completes the session with an exceptional failure wrapping `error`.
    pub fn complete_exceptionally(&self, error: &(dyn Error + 'static)) {
        self.complete(Completion::Failed(Failure::exceptional(error)));
    }

    /// Signals that preparation finished and the session awaits a commit.
    pub fn notify_awaiting(&self) {
        let session = self.clone();
        self.inner
            .deps
            .lane
            .execute(async move { session.enter_awaiting().await });
    }

    /// Reports staging progress in units of the session's maximum.
    ///
    /// Values above the maximum are clamped; a value equal to the last one
    /// is neither broadcast nor persisted. Reports reaching a terminal
    /// session are dropped.
    pub fn set_progress(&self, current: u32) {
        let session = self.clone();
        self.inner
            .deps
            .lane
            .execute(async move { session.apply_progress(current).await });
    }

    /// Records that the confirmation was shown to the user.
    pub fn mark_confirmation_launched(&self) {
        let session = self.clone();
        self.inner
            .deps
            .lane
            .execute(async move { session.record_confirmation_launched().await });
    }

    /// Enqueues an installer callback for this session.
    pub fn handle_event(&self, event: InstallerEvent) {
        let session = self.clone();
        self.inner
            .deps
            .lane
            .execute(async move { session.process_event(event).await });
    }

    /// Registers a state listener and delivers the current state to it
    /// before returning.
    ///
    /// Registering a listener that is already registered returns an inert,
    /// already disposed subscription and delivers nothing.
    pub fn add_state_listener(&self, listener: Arc<dyn StateListener>) -> Subscription {
        let _delivery = self.lock_delivery();
        let Some(registration) = self.inner.state_listeners.add(Arc::clone(&listener)) else {
            return Subscription::disposed();
        };
        listener.on_state_changed(self.inner.id, &self.state());
        self.inner.state_listeners.subscription_of(&registration)
    }

    /// Removes a state listener. Returns whether it was registered.
    pub fn remove_state_listener(&self, listener: &(dyn StateListener + 'static)) -> bool {
        self.inner.state_listeners.remove(listener)
    }

    /// Registers a progress listener and delivers the current progress to
    /// it before returning.
    pub fn add_progress_listener(&self, listener: Arc<dyn ProgressListener>) -> Subscription {
        self.inner.progress.add_listener(self.inner.id, listener)
    }

    /// Removes a progress listener. Returns whether it was registered.
    pub fn remove_progress_listener(&self, listener: &(dyn ProgressListener + 'static)) -> bool {
        self.inner.progress.remove_listener(listener)
    }

    /// Waits until every job enqueued so far, and every job they enqueued,
    /// has run.
    pub async fn settled(&self) {
        self.inner.deps.lane.idle().await;
    }

    /// Waits for the first terminal state.
    pub async fn wait_terminal(&self) -> SessionState {
        let mut receiver = self.inner.state.subscribe();
        let terminal = receiver
            .wait_for(SessionState::is_terminal)
            .await
            .map(|state| state.clone());
        terminal.unwrap_or_else(|_| self.state())
    }

    async fn run_launch(&self) {
        if self.state().is_terminal() {
            self.inner.flags.preparing.store(false, Ordering::Release);
            return;
        }
        self.transition(SessionState::Active).await;
        let launched_at = self.inner.deps.clock.utc();
        if let Err(err) = self
            .inner
            .deps
            .store
            .update_last_launch(self.inner.id, launched_at)
            .await
        {
            warn!(session_id = %self.inner.id, error = %err, "failed to persist launch timestamp");
        }
        if let Err(err) = self.inner.routines.prepare(self).await {
            self.inner.flags.preparing.store(false, Ordering::Release);
            self.handle_routine_error(err).await;
        }
    }

    async fn run_commit(&self) {
        let flags = &self.inner.flags;
        if self.state().is_terminal() {
            flags.committing.store(false, Ordering::Release);
            return;
        }
        flags.committed.store(true, Ordering::Release);
        flags.committing.store(false, Ordering::Release);
        self.transition(SessionState::Committed).await;
        let attempt = self.record_commit_attempt().await;
        debug!(session_id = %self.inner.id, attempt, "session committed");
        if let Err(err) = self.inner.routines.on_committed(self).await {
            self.handle_routine_error(err).await;
            return;
        }
        if let Err(err) = self.post_deferred_confirmation().await {
            self.handle_routine_error(err).await;
            return;
        }
        if let Err(err) = self.inner.routines.launch_confirmation(self).await {
            self.handle_routine_error(err).await;
        }
    }

    async fn post_deferred_confirmation(&self) -> Result<(), RoutineError> {
        if self.inner.parameters.confirmation() != Confirmation::Deferred {
            return Ok(());
        }
        self.inner
            .deps
            .notifier
            .notify(
                self.inner.id,
                self.inner.notification_id,
                self.inner.parameters.notification(),
            )
            .await?;
        debug!(session_id = %self.inner.id, "posted confirmation notification");
        Ok(())
    }

    async fn record_commit_attempt(&self) -> u32 {
        self.inner
            .deps
            .write_guard
            .with_permit(|| async {
                let attempt = self
                    .inner
                    .commit_attempts
                    .fetch_add(1, Ordering::AcqRel)
                    .saturating_add(1);
                if let Err(err) = self
                    .inner
                    .deps
                    .store
                    .set_commit_attempts(self.inner.id, attempt)
                    .await
                {
                    warn!(session_id = %self.inner.id, error = %err, "failed to persist commit attempts");
                }
                attempt
            })
            .await
    }

    async fn enter_awaiting(&self) {
        let flags = &self.inner.flags;
        flags.preparing.store(false, Ordering::Release);
        flags.committing.store(false, Ordering::Release);
        flags.committed.store(false, Ordering::Release);
        self.transition(SessionState::Awaiting).await;
    }

    async fn settle(&self, completion: Completion) {
        if self.state().is_terminal() {
            return;
        }
        if let Completion::Failed(failure) = &completion {
            if failure.is_timeout() && self.should_retry_commit() {
                self.enter_awaiting().await;
                return;
            }
        }
        self.finish(completion.into()).await;
    }

    fn should_retry_commit(&self) -> bool {
        let attempts = self.commit_attempts();
        let decision = self.inner.timeout_strategy.decide(attempts);
        if decision == TimeoutDecision::RetryCommit {
            info!(session_id = %self.inner.id, attempts, "retrying commit after timeout");
        }
        decision == TimeoutDecision::RetryCommit
    }

    async fn finish(&self, terminal: SessionState) {
        if self.transition(terminal).await {
            self.cleanup().await;
        }
    }

    async fn handle_cancellation(&self) {
        if self.transition(SessionState::Cancelled).await {
            self.cleanup().await;
        }
    }

    async fn handle_routine_error(&self, err: RoutineError) {
        if err.is_cancellation() {
            self.handle_cancellation().await;
            return;
        }
        warn!(session_id = %self.inner.id, error = %err, "session routine failed");
        self.finish(SessionState::Failed(Failure::exceptional(&err)))
            .await;
    }

    async fn cleanup(&self) {
        self.inner.routines.cleanup(self).await;
        if let Err(err) = self
            .inner
            .deps
            .notifier
            .cancel(self.inner.id, self.inner.notification_id)
            .await
        {
            warn!(session_id = %self.inner.id, error = %err, "failed to clear session notification");
        }
    }

    async fn apply_progress(&self, current: u32) {
        if self.state().is_terminal() {
            return;
        }
        let progress = Progress::clamped(current, self.inner.progress.max());
        if !self.inner.progress.update(self.inner.id, progress) {
            return;
        }
        if let Err(err) = self
            .inner
            .deps
            .store
            .update_progress(self.inner.id, progress)
            .await
        {
            warn!(session_id = %self.inner.id, error = %err, "failed to persist progress");
        }
    }

    async fn record_confirmation_launched(&self) {
        if self.inner.confirmation_launched.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self
            .inner
            .deps
            .store
            .set_confirmation_launched(self.inner.id, true)
            .await
        {
            warn!(session_id = %self.inner.id, error = %err, "failed to persist confirmation flag");
        }
    }

    async fn process_event(&self, event: InstallerEvent) {
        if self.state().is_terminal() {
            debug!(session_id = %self.inner.id, ?event, "ignoring event for terminal session");
            return;
        }
        let outcome = match event {
            InstallerEvent::Progress { current } => {
                self.apply_progress(current).await;
                Ok(())
            }
            InstallerEvent::PreapprovalFinished(outcome) => {
                self.inner
                    .routines
                    .on_preapproval_outcome(self, outcome)
                    .await
            }
            InstallerEvent::ConfirmationRequired => {
                self.record_confirmation_launched().await;
                Ok(())
            }
            InstallerEvent::ConfirmationDismissed => {
                self.inner.routines.on_confirmation_dismissed(self).await
            }
            InstallerEvent::CommitFinished(completion) => {
                self.settle(completion).await;
                Ok(())
            }
        };
        if let Err(err) = outcome {
            self.handle_routine_error(err).await;
        }
    }

    /// Applies `next`, notifies listeners, then persists it. Returns
    /// whether the state changed.
    async fn transition(&self, next: SessionState) -> bool {
        if !self.apply(&next) {
            return false;
        }
        if let Err(err) = self
            .inner
            .deps
            .store
            .update_state(self.inner.id, &next)
            .await
        {
            warn!(session_id = %self.inner.id, error = %err, "failed to persist session state");
        }
        true
    }

    fn apply(&self, next: &SessionState) -> bool {
        let _delivery = self.lock_delivery();
        let changed = self.inner.state.send_if_modified(|current| {
            if current == next || current.is_terminal() {
                return false;
            }
            *current = next.clone();
            true
        });
        if !changed {
            return false;
        }
        debug!(session_id = %self.inner.id, state = %next, "session state changed");
        let listeners = &self.inner.state_listeners;
        for registration in listeners.snapshot() {
            if listeners.is_valid(&registration) {
                registration
                    .listener()
                    .on_state_changed(self.inner.id, next);
            }
        }
        true
    }

    /// Serialises deliveries across threads. Re-entrant so that a
    /// callback may register further listeners on this session.
    fn lock_delivery(&self) -> ReentrantMutexGuard<'_, ()> {
        self.inner.delivery.lock()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("kind", &self.kind())
            .field("state", &self.state())
            .field("progress", &self.progress())
            .field("commit_attempts", &self.commit_attempts())
            .finish_non_exhaustive()
    }
}
