//! Session configuration.

use super::{DEFAULT_PROGRESS_MAX, LivenessCheck};
use serde::{Deserialize, Serialize};

/// Tunables shared by every session created from a registry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum value of session progress.
    pub progress_max: u32,
    /// Liveness heuristic applied after a dismissed confirmation.
    pub liveness: LivenessCheck,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            progress_max: DEFAULT_PROGRESS_MAX,
            liveness: LivenessCheck::default(),
        }
    }
}
