//! Failure taxonomy attached to failed sessions.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Reason a session completed unsuccessfully.
///
/// Every variant except [`Failure::Timeout`] ends the session on first
/// occurrence; timeouts are offered to the commit retry policy first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Failure {
    /// Unspecified installer failure.
    Generic {
        /// Installer-provided description.
        message: Option<String>,
    },
    /// The operation was aborted, usually by the user.
    Aborted {
        /// Installer-provided description.
        message: Option<String>,
    },
    /// The operation was blocked, possibly by another package.
    Blocked {
        /// Installer-provided description.
        message: Option<String>,
        /// Package that blocked the operation, when known.
        other_package_name: Option<String>,
    },
    /// The package conflicts with an already installed package.
    Conflict {
        /// Installer-provided description.
        message: Option<String>,
        /// Conflicting package, when known.
        other_package_name: Option<String>,
    },
    /// The package is incompatible with the device.
    Incompatible {
        /// Installer-provided description.
        message: Option<String>,
    },
    /// The package archive is invalid.
    Invalid {
        /// Installer-provided description.
        message: Option<String>,
    },
    /// Storage was insufficient or unavailable.
    Storage {
        /// Installer-provided description.
        message: Option<String>,
        /// Affected storage path, when known.
        storage_path: Option<String>,
    },
    /// The commit did not finish before its constraint timeout.
    Timeout {
        /// Installer-provided description.
        message: Option<String>,
    },
    /// An error was raised while preparing or confirming the session.
    Exceptional {
        /// Rendered error chain of the cause.
        cause: String,
    },
}

impl Failure {
    /// Creates a generic failure with a message.
    #[must_use]
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: Some(message.into()),
        }
    }

    /// Creates an aborted failure with a message.
    #[must_use]
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted {
            message: Some(message.into()),
        }
    }

    /// Creates a timeout failure with a message.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: Some(message.into()),
        }
    }

    /// Wraps an error, rendering its full source chain.
    #[must_use]
    pub fn exceptional(error: &(dyn Error + 'static)) -> Self {
        let mut cause = error.to_string();
        let mut source = error.source();
        while let Some(inner) = source {
            cause.push_str(": ");
            cause.push_str(&inner.to_string());
            source = inner.source();
        }
        Self::Exceptional { cause }
    }

    /// Returns whether this failure is a commit timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the failure category as a stable string.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Generic { .. } => "generic",
            Self::Aborted { .. } => "aborted",
            Self::Blocked { .. } => "blocked",
            Self::Conflict { .. } => "conflict",
            Self::Incompatible { .. } => "incompatible",
            Self::Invalid { .. } => "invalid",
            Self::Storage { .. } => "storage",
            Self::Timeout { .. } => "timeout",
            Self::Exceptional { .. } => "exceptional",
        }
    }

    /// Returns the human-readable message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Generic { message }
            | Self::Aborted { message }
            | Self::Blocked { message, .. }
            | Self::Conflict { message, .. }
            | Self::Incompatible { message }
            | Self::Invalid { message }
            | Self::Storage { message, .. }
            | Self::Timeout { message } => message.as_deref(),
            Self::Exceptional { cause } => Some(cause),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {message}", self.category()),
            None => f.write_str(self.category()),
        }
    }
}
