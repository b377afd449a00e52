//! Package-session: durable install and uninstall sessions.
//!
//! This crate drives a long-running package install or uninstall operation
//! to completion across process restarts, user-confirmation detours, and
//! transient installer failures. The heart of the crate is a persisted,
//! resumable session state machine.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain**: States, failures, progress, and the commit retry policy
//! - **Ports**: Persistence gateway, installer services, notifier, and
//!   listener contracts
//! - **Adapters**: In-memory and `PostgreSQL` implementations of the ports
//! - **Services**: Session registry, install and uninstall routines, and the
//!   terminal-state driver
//!
//! # Modules
//!
//! - [`session`]: Session lifecycle, listeners, pre-approval, and
//!   concurrency primitives

pub mod session;
