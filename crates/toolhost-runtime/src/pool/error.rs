//! Process pool error types.

use thiserror::Error;

/// Errors from process pool operations.
///
/// Every variant that concerns one process carries its id, so a failure can
/// always be attributed to the entry that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("Failed to spawn process '{id}': {reason}")]
    SpawnFailed { id: String, reason: String },

    #[error("Process '{id}' did not become ready within {timeout_ms} ms")]
    StartupTimeout { id: String, timeout_ms: u64 },

    #[error("Failed to terminate process '{id}': {reason}")]
    TerminateFailed { id: String, reason: String },

    #[error("Process pool is shutting down")]
    ShuttingDown,
}

impl PoolError {
    /// Id of the process the error concerns, if any.
    pub fn process_id(&self) -> Option<&str> {
        match self {
            Self::SpawnFailed { id, .. }
            | Self::StartupTimeout { id, .. }
            | Self::TerminateFailed { id, .. } => Some(id),
            Self::ShuttingDown => None,
        }
    }
}
