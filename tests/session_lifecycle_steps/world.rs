//! Shared world state for package session BDD scenarios.

use std::sync::{Arc, Mutex};

use mockable::DefaultClock;
use package_session::session::{
    adapters::memory::{
        InMemoryInstallerService, InMemoryNotifier, InMemorySessionStore,
        InMemoryUninstallerService,
    },
    domain::{SessionConfig, SessionStateKind},
    machine::Session,
    services::{SessionEnvironment, SessionRegistry},
};
use rstest::fixture;
use tokio::runtime::Handle;

/// Registry type used by the BDD world.
pub type TestRegistry = SessionRegistry<DefaultClock>;

/// Scenario world for session lifecycle behaviour tests.
pub struct SessionWorld {
    pub store: Arc<InMemorySessionStore>,
    pub installer: Arc<InMemoryInstallerService>,
    pub uninstaller: Arc<InMemoryUninstallerService>,
    pub notifier: Arc<InMemoryNotifier>,
    pub registry: Option<TestRegistry>,
    pub session: Option<Session>,
    pub driver_outcomes: Arc<Mutex<Vec<SessionStateKind>>>,
}

impl SessionWorld {
    /// Creates a world with fresh in-memory adapters and no registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemorySessionStore::new()),
            installer: Arc::new(InMemoryInstallerService::new()),
            uninstaller: Arc::new(InMemoryUninstallerService::new()),
            notifier: Arc::new(InMemoryNotifier::new()),
            registry: None,
            session: None,
            driver_outcomes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Builds a registry over the world's adapters on the current runtime.
    #[must_use]
    pub fn build_registry(&self) -> TestRegistry {
        SessionRegistry::new(SessionEnvironment {
            store: Arc::clone(&self.store) as _,
            preapproval_store: Arc::clone(&self.store) as _,
            installer: Arc::clone(&self.installer) as _,
            uninstaller: Arc::clone(&self.uninstaller) as _,
            notifier: Arc::clone(&self.notifier) as _,
            clock: Arc::new(DefaultClock),
            runtime: Handle::current(),
            config: SessionConfig::default(),
        })
    }

    /// Returns the scenario registry.
    ///
    /// # Errors
    ///
    /// Returns an error when no registry was set up.
    pub fn registry(&self) -> Result<&TestRegistry, eyre::Report> {
        self.registry
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing session registry in scenario world"))
    }

    /// Returns the scenario session.
    ///
    /// # Errors
    ///
    /// Returns an error when no session was created.
    pub fn session(&self) -> Result<&Session, eyre::Report> {
        self.session
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing session in scenario world"))
    }
}

impl Default for SessionWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> SessionWorld {
    SessionWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| Handle::current().block_on(future))
}
