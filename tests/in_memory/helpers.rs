//! Shared test helpers for in-memory session integration tests.

use std::sync::{Arc, Mutex};

use mockable::DefaultClock;
use package_session::session::{
    adapters::memory::{
        InMemoryInstallerService, InMemoryNotifier, InMemorySessionStore,
        InMemoryUninstallerService,
    },
    domain::{
        Failure, InstallParameters, NativeSessionId, SessionConfig, SessionId, SessionRecord,
    },
    machine::Session,
    ports::SessionStore,
    services::{SessionEnvironment, SessionRegistry, TerminalCallbacks},
};
use rstest::fixture;
use tokio::runtime::Handle;

/// Registry type used by the integration tests.
pub type TestRegistry = SessionRegistry<DefaultClock>;

/// In-memory adapters shared by every registry built from one stack.
///
/// Building a second registry over the same stack simulates a process
/// restart: sessions live only in the registry, records in the store.
#[derive(Clone)]
pub struct Stack {
    pub store: Arc<InMemorySessionStore>,
    pub installer: Arc<InMemoryInstallerService>,
    pub uninstaller: Arc<InMemoryUninstallerService>,
    pub notifier: Arc<InMemoryNotifier>,
}

impl Stack {
    /// Creates a stack with empty adapters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemorySessionStore::new()),
            installer: Arc::new(InMemoryInstallerService::new()),
            uninstaller: Arc::new(InMemoryUninstallerService::new()),
            notifier: Arc::new(InMemoryNotifier::new()),
        }
    }

    /// Builds a registry on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime.
    #[must_use]
    pub fn registry(&self) -> TestRegistry {
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

    /// Loads the persisted record of a session.
    ///
    /// # Errors
    ///
    /// Returns an error when the lookup fails or the record is missing.
    pub async fn record(&self, id: SessionId) -> Result<SessionRecord, eyre::Report> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| eyre::eyre!("no record for session {id}"))
    }

    /// Returns the installer-side handle of a launched install session.
    ///
    /// # Errors
    ///
    /// Returns an error when the session has no installer-side handle yet.
    pub async fn native_session_id(&self, id: SessionId) -> Result<NativeSessionId, eyre::Report> {
        self.record(id)
            .await?
            .native_session_id()
            .ok_or_else(|| eyre::eyre!("session {id} has no installer session"))
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

/// Provides fresh in-memory adapters for each test.
#[fixture]
pub fn stack() -> Stack {
    Stack::new()
}

/// Install parameters staging two archives.
///
/// # Panics
///
/// Panics if the hard-coded package list is rejected.
#[must_use]
pub fn install_parameters() -> InstallParameters {
    InstallParameters::new(["base.apk", "split_config.en.apk"]).expect("valid package list")
}

/// Terminal outcome observed through [`TerminalCallbacks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The session succeeded.
    Succeeded,
    /// The session failed.
    Failed(Failure),
    /// The session was cancelled.
    Cancelled,
}

/// Records terminal outcomes of driven sessions.
#[derive(Debug, Clone, Default)]
pub struct Outcomes(Arc<Mutex<Vec<(SessionId, Outcome)>>>);

impl Outcomes {
    /// Drives `session` to a terminal state, recording its outcome.
    pub fn drive(&self, session: &Session) {
        let succeeded = self.clone();
        let failed = self.clone();
        let cancelled = self.clone();
        let subscription = TerminalCallbacks::new()
            .on_success(move |id| succeeded.push(id, Outcome::Succeeded))
            .on_failure(move |id, failure| failed.push(id, Outcome::Failed(failure.clone())))
            .on_cancelled(move |id| cancelled.push(id, Outcome::Cancelled))
            .bind(session);
        drop(subscription);
    }

    /// Returns the recorded outcomes in delivery order.
    ///
    /// # Panics
    ///
    /// Panics if the recorder lock is poisoned.
    #[must_use]
    pub fn recorded(&self) -> Vec<(SessionId, Outcome)> {
        self.0.lock().expect("outcomes lock").clone()
    }

    fn push(&self, id: SessionId, outcome: Outcome) {
        self.0.lock().expect("outcomes lock").push((id, outcome));
    }
}
