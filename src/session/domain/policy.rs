//! Commit constraints and the timeout retry policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Strategy applied when a constrained commit times out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeoutStrategy {
    /// Fail the session on the first timeout.
    #[default]
    Fail,
    /// Retry once, committing without constraints on the retry.
    CommitEagerly,
    /// Retry the constrained commit up to `retries` times.
    Retry {
        /// Maximum number of retried commits.
        retries: u32,
    },
}

/// Decision produced by [`TimeoutStrategy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutDecision {
    /// Return the session to `Awaiting` so it can be committed again.
    RetryCommit,
    /// Complete the session with the timeout failure.
    Fail,
}

impl TimeoutStrategy {
    /// Decides the fate of a timed-out commit.
    ///
    /// `commit_attempts` is the persisted number of commits performed so
    /// far, including the one that timed out.
    #[must_use]
    pub const fn decide(self, commit_attempts: u32) -> TimeoutDecision {
        let retries = match self {
            Self::Fail => return TimeoutDecision::Fail,
            Self::CommitEagerly => 1,
            Self::Retry { retries } => retries,
        };
        if commit_attempts <= retries {
            TimeoutDecision::RetryCommit
        } else {
            TimeoutDecision::Fail
        }
    }

    /// Returns whether the commit numbered `attempt` (1-based) should skip
    /// constraints entirely.
    #[must_use]
    pub const fn commits_eagerly_on(self, attempt: u32) -> bool {
        matches!(self, Self::CommitEagerly) && attempt > 1
    }
}

/// Conditions the installer must satisfy before committing a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitConstraints {
    /// Wait until the installing app is not in the foreground.
    pub app_not_foreground_required: bool,
    /// Wait until the user is not interacting with the installing app.
    pub app_not_interacting_required: bool,
    /// Wait until the installing app is not the top visible app.
    pub app_not_top_visible_required: bool,
    /// Wait until the device is idle.
    pub device_idle_required: bool,
    /// Wait until no call is in progress.
    pub not_in_call_required: bool,
    /// Maximum time to wait for the constraints.
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Policy applied when `timeout` elapses.
    pub timeout_strategy: TimeoutStrategy,
}

impl CommitConstraints {
    /// Creates constraints with no flags set and the given timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            app_not_foreground_required: false,
            app_not_interacting_required: false,
            app_not_top_visible_required: false,
            device_idle_required: false,
            not_in_call_required: false,
            timeout,
            timeout_strategy: TimeoutStrategy::Fail,
        }
    }

    /// Requires the installing app to leave the foreground.
    #[must_use]
    pub const fn with_app_not_foreground(mut self) -> Self {
        self.app_not_foreground_required = true;
        self
    }

    /// Requires the user to stop interacting with the installing app.
    #[must_use]
    pub const fn with_app_not_interacting(mut self) -> Self {
        self.app_not_interacting_required = true;
        self
    }

    /// Requires the installing app to leave the top of the screen.
    #[must_use]
    pub const fn with_app_not_top_visible(mut self) -> Self {
        self.app_not_top_visible_required = true;
        self
    }

    /// Requires the device to be idle.
    #[must_use]
    pub const fn with_device_idle(mut self) -> Self {
        self.device_idle_required = true;
        self
    }

    /// Requires no call to be in progress.
    #[must_use]
    pub const fn with_not_in_call(mut self) -> Self {
        self.not_in_call_required = true;
        self
    }

    /// Sets the timeout strategy.
    #[must_use]
    pub const fn with_timeout_strategy(mut self, strategy: TimeoutStrategy) -> Self {
        self.timeout_strategy = strategy;
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
