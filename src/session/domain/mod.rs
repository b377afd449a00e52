//! Domain model for package sessions.
//!
//! The session domain models lifecycle states, the failure taxonomy,
//! progress, commit constraints with their retry policy, and the durable
//! session record, while keeping all infrastructure concerns outside of the
//! domain boundary.

mod config;
mod error;
mod failure;
mod ids;
mod liveness;
mod notification;
mod parameters;
mod policy;
mod preapproval;
mod progress;
mod record;
mod state;

pub use config::SessionConfig;
pub use error::{ParseSessionKindError, ParseSessionStateError, SessionDomainError};
pub use failure::Failure;
pub use ids::{NativeSessionId, NotificationId, SessionId};
pub use liveness::{DEFAULT_ALIVE_THRESHOLD, LivenessCheck};
pub use notification::NotificationData;
pub use parameters::{
    Confirmation, InstallParameters, PreapprovalDetails, SessionKind, SessionParameters,
    UninstallParameters,
};
pub use policy::{CommitConstraints, TimeoutDecision, TimeoutStrategy};
pub use preapproval::{PreapprovalFlags, PreapprovalState};
pub use progress::{DEFAULT_PROGRESS_MAX, Progress};
pub use record::{PersistedSessionData, SessionRecord};
pub use state::{Completion, SessionState, SessionStateKind};
