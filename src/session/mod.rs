//! Session lifecycle management.
//!
//! A session tracks exactly one install or uninstall operation. Callers
//! drive it with [`machine::Session::launch`], [`machine::Session::commit`],
//! and [`machine::Session::cancel`]; every mutation is serialised on a
//! per-session lane and persisted through the [`ports::SessionStore`]
//! gateway so the lifecycle resumes after process death. The module is laid
//! out as follows:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]
//! - Lane and write semaphore in [`concurrency`]
//! - Listener bookkeeping in [`listeners`]
//! - The state machine itself in [`machine`]
//! - The nested pre-approval lifecycle in [`preapproval`]

pub mod adapters;
pub mod concurrency;
pub mod domain;
pub mod listeners;
pub mod machine;
pub mod ports;
pub mod preapproval;
pub mod services;

#[cfg(test)]
mod tests;
