//! Orchestrator errors.

use thiserror::Error;

/// Errors returned by the service orchestrator.
///
/// `Clone` so every caller collapsed into one `initialize()` run receives the
/// same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    /// An accessor was used before `initialize()` completed.
    #[error("Services not initialized")]
    NotInitialized,

    #[error("Services are shutting down")]
    ShuttingDown,

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Duplicate server id: {0}")]
    DuplicateServer(String),

    #[error("Duplicate phase name: {0}")]
    DuplicatePhase(String),

    #[error("No tool protocol configured")]
    MissingProtocol,

    #[error("Phase '{phase}' failed: {message}")]
    PhaseFailed { phase: String, message: String },

    /// The initializing caller went away before finishing.
    #[error("Initialization was abandoned")]
    Abandoned,
}

impl OrchestratorError {
    /// Name of the failing phase, if this is a phase failure.
    pub fn phase(&self) -> Option<&str> {
        match self {
            Self::PhaseFailed { phase, .. } => Some(phase),
            _ => None,
        }
    }
}
