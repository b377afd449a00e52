//! Approximate liveness check for installer sessions.
//!
//! When the user dismisses a confirmation, the installer gives no direct
//! signal of whether its native session is still usable. The only available
//! hint is the native progress fraction: a session that finished staging
//! reports a value close to completion. This check compares that fraction
//! against a configurable threshold; it is a heuristic, not a guarantee.

use super::SessionDomainError;
use serde::{Deserialize, Serialize};

/// Default native progress fraction above which a session counts as alive.
pub const DEFAULT_ALIVE_THRESHOLD: f32 = 0.81;

/// Threshold-based liveness heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessCheck {
    /// Minimum native progress fraction for a live session.
    pub alive_threshold: f32,
}

impl LivenessCheck {
    /// Creates a liveness check with a validated threshold.
    ///
    /// # Errors
    ///
    /// Returns [`SessionDomainError::InvalidLivenessThreshold`] when the
    /// threshold is not a finite fraction in `0.0..=1.0`.
    pub fn new(alive_threshold: f32) -> Result<Self, SessionDomainError> {
        if !alive_threshold.is_finite() || !(0.0..=1.0).contains(&alive_threshold) {
            return Err(SessionDomainError::InvalidLivenessThreshold(
                alive_threshold.to_string(),
            ));
        }
        Ok(Self { alive_threshold })
    }

    /// Returns whether a native session reporting `native_progress` is
    /// alive. A missing native session is never alive.
    #[must_use]
    pub fn is_alive(self, native_progress: Option<f32>) -> bool {
        native_progress.is_some_and(|progress| progress >= self.alive_threshold)
    }
}

impl Default for LivenessCheck {
    fn default() -> Self {
        Self {
            alive_threshold: DEFAULT_ALIVE_THRESHOLD,
        }
    }
}
