//! Crash-safe pre-approval sub-lifecycle.
//!
//! A pre-approval request is claimed in two durable phases: `activating` is
//! persisted before the installer call and `active` after it. If the
//! process dies in between, the restored lifecycle starts in a claimable
//! activating phase and the next request re-enters it exactly once instead
//! of issuing a fresh claim.
//!
//! The in-memory phase is an atomic so that the lifecycle can be consulted
//! from installer callbacks while a request is in flight; every durable
//! write goes through the session's [`BinarySemaphore`].

use crate::session::concurrency::BinarySemaphore;
use crate::session::domain::{PreapprovalState, SessionId};
use crate::session::ports::{InstallerError, PreapprovalStore, SessionStoreError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;
use tracing::{debug, info};

/// Errors returned by the pre-approval lifecycle.
#[derive(Debug, Clone, Error)]
pub enum PreapprovalError {
    /// The request action failed; the claim was rolled back.
    #[error("pre-approval request failed: {0}")]
    Request(InstallerError),

    /// Pre-approval markers could not be persisted.
    #[error(transparent)]
    Store(#[from] SessionStoreError),
}

/// Result type for pre-approval lifecycle operations.
pub type PreapprovalResult<T> = Result<T, PreapprovalError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    ActivatingClaimable,
    ActivatingOwned,
    Active,
    Consuming,
    Preapproved,
    Resetting,
}

impl Phase {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::ActivatingClaimable => 1,
            Self::ActivatingOwned => 2,
            Self::Active => 3,
            Self::Consuming => 4,
            Self::Preapproved => 5,
            Self::Resetting => 6,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ActivatingClaimable,
            2 => Self::ActivatingOwned,
            3 => Self::Active,
            4 => Self::Consuming,
            5 => Self::Preapproved,
            6 => Self::Resetting,
            _ => Self::Idle,
        }
    }

    const fn restored(state: PreapprovalState) -> Self {
        match state {
            PreapprovalState::Idle => Self::Idle,
            PreapprovalState::Activating => Self::ActivatingClaimable,
            PreapprovalState::Active => Self::Active,
            PreapprovalState::Preapproved => Self::Preapproved,
        }
    }

    const fn is_outstanding(self) -> bool {
        matches!(
            self,
            Self::Active | Self::ActivatingClaimable | Self::ActivatingOwned
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    NotAcquired,
    Fresh,
    Restored,
}

/// Pre-approval sub-lifecycle of one install session.
pub struct PreapprovalLifecycle {
    session_id: SessionId,
    phase: AtomicU8,
    store: Arc<dyn PreapprovalStore>,
    write_guard: BinarySemaphore,
}

impl PreapprovalLifecycle {
    /// Creates a lifecycle restored from persisted markers.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        initial: PreapprovalState,
        store: Arc<dyn PreapprovalStore>,
        write_guard: BinarySemaphore,
    ) -> Self {
        Self {
            session_id,
            phase: AtomicU8::new(Phase::restored(initial).as_u8()),
            store,
            write_guard,
        }
    }

    /// Returns whether the request was approved.
    #[must_use]
    pub fn is_preapproved(&self) -> bool {
        self.load() == Phase::Preapproved
    }

    /// Returns whether a request is outstanding or about to be.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.load().is_outstanding()
    }

    /// Issues a pre-approval request through `action` unless one is already
    /// outstanding.
    ///
    /// A fresh request persists the claim before running `action` and
    /// confirms it afterwards. A claim restored after process death runs
    /// `action` once; [`InstallerError::AlreadyRequested`] then counts as
    /// confirmation that the installer still holds the request.
    ///
    /// # Errors
    ///
    /// Returns [`PreapprovalError::Request`] with the action's error after
    /// rolling the claim back, and [`PreapprovalError::Store`] when the
    /// markers cannot be persisted.
    pub async fn run_request<F, Fut>(&self, action: F) -> PreapprovalResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), InstallerError>>,
    {
        let claim = self.begin_request().await?;
        if claim == Claim::NotAcquired {
            debug!(session_id = %self.session_id, "pre-approval already outstanding");
            return Ok(());
        }
        match action().await {
            Ok(()) => {}
            Err(err) if claim == Claim::Restored && err.is_already_requested() => {
                info!(
                    session_id = %self.session_id,
                    "restored pre-approval request is still held by the installer"
                );
            }
            Err(err) => {
                self.abort_request().await?;
                return Err(PreapprovalError::Request(err));
            }
        }
        self.activate_request().await
    }

    /// Finalises the outstanding request.
    ///
    /// Accepted while a request is outstanding, including the activating
    /// phases, so that an outcome observed while the request is being
    /// issued is not lost. Returns `false` when nothing was outstanding or
    /// the store had already finalised the request.
    ///
    /// # Errors
    ///
    /// Returns [`PreapprovalError::Store`] when the outcome cannot be
    /// persisted; the previous phase is restored.
    pub async fn consume_active(&self, preapproved: bool) -> PreapprovalResult<bool> {
        let previous = loop {
            let current = self.load();
            if !current.is_outstanding() {
                return Ok(false);
            }
            if self.transition(current, Phase::Consuming) {
                break current;
            }
        };
        let consumed = match self
            .write_guard
            .with_permit(|| self.store.consume_active(self.session_id, preapproved))
            .await
        {
            Ok(consumed) => consumed,
            Err(err) => {
                self.transition(Phase::Consuming, previous);
                return Err(err.into());
            }
        };
        if !consumed {
            self.transition(Phase::Consuming, Phase::Idle);
            return Ok(false);
        }
        let next = if preapproved {
            Phase::Preapproved
        } else {
            Phase::Idle
        };
        Ok(self.transition(Phase::Consuming, next))
    }

    /// Clears every marker and returns to idle.
    ///
    /// # Errors
    ///
    /// Returns [`PreapprovalError::Store`] when the markers cannot be
    /// cleared; the previous phase is restored.
    pub async fn reset(&self) -> PreapprovalResult<()> {
        loop {
            let current = self.load();
            if current == Phase::Resetting {
                return Ok(());
            }
            if !self.transition(current, Phase::Resetting) {
                continue;
            }
            if let Err(err) = self
                .write_guard
                .with_permit(|| self.store.reset(self.session_id))
                .await
            {
                self.transition(Phase::Resetting, current);
                return Err(err.into());
            }
            self.phase.store(Phase::Idle.as_u8(), Ordering::Release);
            return Ok(());
        }
    }

    async fn begin_request(&self) -> PreapprovalResult<Claim> {
        loop {
            match self.load() {
                Phase::Idle => {
                    if !self.transition(Phase::Idle, Phase::ActivatingOwned) {
                        continue;
                    }
                    let claimed = self
                        .write_guard
                        .with_permit(|| self.store.set_activating(self.session_id))
                        .await;
                    return match claimed {
                        Ok(true) => Ok(Claim::Fresh),
                        Ok(false) => {
                            self.transition(Phase::ActivatingOwned, Phase::Idle);
                            Ok(Claim::NotAcquired)
                        }
                        Err(err) => {
                            self.transition(Phase::ActivatingOwned, Phase::Idle);
                            Err(err.into())
                        }
                    };
                }
                Phase::ActivatingClaimable => {
                    if self.transition(Phase::ActivatingClaimable, Phase::ActivatingOwned) {
                        return Ok(Claim::Restored);
                    }
                }
                _ => return Ok(Claim::NotAcquired),
            }
        }
    }

    async fn activate_request(&self) -> PreapprovalResult<()> {
        let activated = self
            .write_guard
            .with_permit(|| self.store.set_active(self.session_id))
            .await?;
        let next = if activated { Phase::Active } else { Phase::Idle };
        self.transition(Phase::ActivatingOwned, next);
        Ok(())
    }

    async fn abort_request(&self) -> PreapprovalResult<()> {
        if !self.consume_active(false).await? {
            self.transition(Phase::ActivatingOwned, Phase::Idle);
        }
        Ok(())
    }

    fn load(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn transition(&self, from: Phase, to: Phase) -> bool {
        self.phase
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl fmt::Debug for PreapprovalLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreapprovalLifecycle")
            .field("session_id", &self.session_id)
            .field("phase", &self.load())
            .finish_non_exhaustive()
    }
}
