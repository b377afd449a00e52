//! Error types for session domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing domain session values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionDomainError {
    /// Progress value exceeds its maximum.
    #[error("progress {current} exceeds maximum {max}")]
    ProgressOutOfRange {
        /// Reported progress.
        current: u32,
        /// Progress maximum.
        max: u32,
    },

    /// Progress maximum must be positive.
    #[error("progress maximum must be greater than zero")]
    ZeroProgressMax,

    /// An install session needs at least one package to stage.
    #[error("install parameters must name at least one package")]
    NoPackages,

    /// A package name is empty after trimming.
    #[error("package name must not be empty")]
    EmptyPackageName,

    /// The liveness threshold must be a fraction between zero and one.
    #[error("liveness threshold {0} is outside 0.0..=1.0")]
    InvalidLivenessThreshold(String),
}

/// Error returned while parsing session states from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown session state: {0}")]
pub struct ParseSessionStateError(pub String);

/// Error returned while parsing session kinds from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown session kind: {0}")]
pub struct ParseSessionKindError(pub String);
