//! Routines of uninstall sessions.

use crate::session::domain::{Completion, Failure, UninstallParameters};
use crate::session::machine::Session;
use crate::session::ports::{RoutineError, RoutineResult, SessionRoutines, UninstallerService};
use async_trait::async_trait;
use std::sync::Arc;

/// Uninstall behaviour: nothing to stage, the commit asks the platform to
/// remove the package.
pub struct UninstallRoutines {
    parameters: UninstallParameters,
    uninstaller: Arc<dyn UninstallerService>,
}

impl UninstallRoutines {
    /// Creates uninstall routines.
    #[must_use]
    pub fn new(parameters: UninstallParameters, uninstaller: Arc<dyn UninstallerService>) -> Self {
        Self {
            parameters,
            uninstaller,
        }
    }
}

#[async_trait]
impl SessionRoutines for UninstallRoutines {
    async fn prepare(&self, session: &Session) -> RoutineResult<()> {
        if session.is_cancellation_requested() {
            return Err(RoutineError::Cancelled);
        }
        session.notify_awaiting();
        Ok(())
    }

    async fn launch_confirmation(&self, session: &Session) -> RoutineResult<()> {
        self.uninstaller
            .uninstall(session.id(), self.parameters.package_name())
            .await?;
        Ok(())
    }

    async fn on_confirmation_dismissed(&self, session: &Session) -> RoutineResult<()> {
        session.complete(Completion::Failed(Failure::aborted(format!(
            "Uninstall of {} was dismissed",
            self.parameters.package_name()
        ))));
        Ok(())
    }
}
