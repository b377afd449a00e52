//! Application services for package sessions.

mod driver;
mod install;
mod registry;
mod uninstall;

pub use driver::{TerminalCallbacks, TerminalStateDriver};
pub use install::{InstallCollaborators, InstallRoutines};
pub use registry::{
    SessionEnvironment, SessionRegistry, SessionRegistryError, SessionRegistryResult,
};
pub use uninstall::UninstallRoutines;
