//! Progress reported by sessions while staging packages.

use super::SessionDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default progress maximum used by sessions.
pub const DEFAULT_PROGRESS_MAX: u32 = 100;

/// Progress pair with `current <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Progress {
    current: u32,
    max: u32,
}

impl Progress {
    /// Creates a validated progress value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionDomainError::ZeroProgressMax`] when `max` is zero and
    /// [`SessionDomainError::ProgressOutOfRange`] when `current` exceeds
    /// `max`.
    pub const fn new(current: u32, max: u32) -> Result<Self, SessionDomainError> {
        if max == 0 {
            return Err(SessionDomainError::ZeroProgressMax);
        }
        if current > max {
            return Err(SessionDomainError::ProgressOutOfRange { current, max });
        }
        Ok(Self { current, max })
    }

    /// Creates a progress value, clamping `current` to `max`.
    ///
    /// A zero `max` is raised to one.
    #[must_use]
    pub const fn clamped(current: u32, max: u32) -> Self {
        let bounded_max = if max == 0 { 1 } else { max };
        let bounded_current = if current > bounded_max {
            bounded_max
        } else {
            current
        };
        Self {
            current: bounded_current,
            max: bounded_max,
        }
    }

    /// Zero progress with the given maximum.
    #[must_use]
    pub const fn zero(max: u32) -> Self {
        Self::clamped(0, max)
    }

    /// Returns the current value.
    #[must_use]
    pub const fn current(self) -> u32 {
        self.current
    }

    /// Returns the maximum value.
    #[must_use]
    pub const fn max(self) -> u32 {
        self.max
    }

    /// Returns whether the progress reached its maximum.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        self.current == self.max
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::zero(DEFAULT_PROGRESS_MAX)
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.current, self.max)
    }
}
