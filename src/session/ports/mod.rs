//! Port contracts for package sessions.
//!
//! Ports define infrastructure-agnostic interfaces used by the session state
//! machine and its services.

pub mod installer;
pub mod listener;
pub mod notifier;
pub mod routines;
pub mod store;

pub use installer::{
    InstallerError, InstallerEvent, InstallerResult, InstallerService, PreapprovalOutcome,
    UninstallerService,
};
pub use listener::{ProgressListener, StateListener};
pub use notifier::{Notifier, NotifierError, NotifierResult};
pub use routines::{RoutineError, RoutineResult, SessionRoutines};
pub use store::{PreapprovalStore, SessionStore, SessionStoreError, SessionStoreResult};
