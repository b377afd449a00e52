//! Session state machine and its progress extension.
//!
//! State diagram:
//!
//! ```text
//! Pending -> Active -> Awaiting -> Committed -> Succeeded | Failed
//!                         ^            |
//!                         +-- retry ---+
//! ```
//!
//! `Cancelled` is reachable from every non-terminal state. Once a terminal
//! state is reached nothing is applied, persisted or delivered any more.

mod progress;
mod session;

pub use session::{Session, SessionDeps, WeakSession};
