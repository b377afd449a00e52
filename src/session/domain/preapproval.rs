//! Persisted pre-approval markers.

use serde::{Deserialize, Serialize};

/// Durable pre-approval markers stored with a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreapprovalFlags {
    /// A request was claimed but not yet confirmed as issued.
    pub activating: bool,
    /// A request has been issued and awaits its outcome.
    pub active: bool,
    /// The request was approved by the user.
    pub preapproved: bool,
}

impl PreapprovalFlags {
    /// Returns the lifecycle state these markers describe.
    ///
    /// `preapproved` takes precedence over `active`, which takes precedence
    /// over `activating`.
    #[must_use]
    pub const fn state(self) -> PreapprovalState {
        if self.preapproved {
            PreapprovalState::Preapproved
        } else if self.active {
            PreapprovalState::Active
        } else if self.activating {
            PreapprovalState::Activating
        } else {
            PreapprovalState::Idle
        }
    }
}

/// Durable state of the pre-approval sub-lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreapprovalState {
    /// No request is outstanding.
    #[default]
    Idle,
    /// A request was claimed; the process may have died before issuing it.
    Activating,
    /// A request is outstanding.
    Active,
    /// The request was approved.
    Preapproved,
}
