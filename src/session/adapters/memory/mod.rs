//! In-memory adapters for tests and embedding.

mod installer;
mod notifier;
mod store;

pub use installer::{
    COMMITTED_NATIVE_PROGRESS, InMemoryInstallerService, InMemoryUninstallerService,
    InstallerCall, InstallerOperation, STAGED_NATIVE_PROGRESS,
};
pub use notifier::InMemoryNotifier;
pub use store::InMemorySessionStore;
