//! Session lifecycle states.

use super::{Failure, ParseSessionStateError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a session.
///
/// The happy path is `Pending → Active → Awaiting → Committed → Succeeded`.
/// `Cancelled` is reachable from every non-terminal state and `Failed` from
/// every non-terminal state through completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "failure", rename_all = "snake_case")]
pub enum SessionState {
    /// Session has been created but not launched.
    Pending,
    /// Session is being prepared.
    Active,
    /// Session is prepared and awaits a commit.
    Awaiting,
    /// Session has been committed and awaits the installer outcome.
    Committed,
    /// Session was cancelled.
    Cancelled,
    /// Session completed successfully.
    Succeeded,
    /// Session completed with a failure.
    Failed(Failure),
}

impl SessionState {
    /// Returns whether no further transition can leave this state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Succeeded | Self::Failed(_))
    }

    /// Returns whether this state is a completion (success or failure).
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }

    /// Returns the storage discriminant of this state.
    #[must_use]
    pub const fn kind(&self) -> SessionStateKind {
        match self {
            Self::Pending => SessionStateKind::Pending,
            Self::Active => SessionStateKind::Active,
            Self::Awaiting => SessionStateKind::Awaiting,
            Self::Committed => SessionStateKind::Committed,
            Self::Cancelled => SessionStateKind::Cancelled,
            Self::Succeeded => SessionStateKind::Succeeded,
            Self::Failed(_) => SessionStateKind::Failed,
        }
    }

    /// Returns the failure payload when the state is `Failed`.
    #[must_use]
    pub const fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(failure) => write!(f, "failed ({failure})"),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

/// Storage discriminant of [`SessionState`], without the failure payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStateKind {
    /// See [`SessionState::Pending`].
    Pending,
    /// See [`SessionState::Active`].
    Active,
    /// See [`SessionState::Awaiting`].
    Awaiting,
    /// See [`SessionState::Committed`].
    Committed,
    /// See [`SessionState::Cancelled`].
    Cancelled,
    /// See [`SessionState::Succeeded`].
    Succeeded,
    /// See [`SessionState::Failed`].
    Failed,
}

impl SessionStateKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Awaiting => "awaiting",
            Self::Committed => "committed",
            Self::Cancelled => "cancelled",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Returns whether states of this kind are terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for SessionStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SessionStateKind {
    type Error = ParseSessionStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "awaiting" => Ok(Self::Awaiting),
            "committed" => Ok(Self::Committed),
            "cancelled" => Ok(Self::Cancelled),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseSessionStateError(value.to_owned())),
        }
    }
}

/// Outcome passed to session completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The operation succeeded.
    Succeeded,
    /// The operation failed.
    Failed(Failure),
}

impl From<Completion> for SessionState {
    fn from(completion: Completion) -> Self {
        match completion {
            Completion::Succeeded => Self::Succeeded,
            Completion::Failed(failure) => Self::Failed(failure),
        }
    }
}

impl From<Failure> for Completion {
    fn from(failure: Failure) -> Self {
        Self::Failed(failure)
    }
}
