//! CLI-specific error types and exit codes.

use thiserror::Error;
use toolhost_bootstrap::OrchestratorError;

#[derive(Debug, Error)]
pub enum CliError {
    /// Startup or supervision failure.
    #[error("{0}")]
    Service(String),

    /// File could not be read.
    #[error("IO error: {0}")]
    Io(String),

    /// Invalid configuration file, settings or server descriptors.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CliError {
    /// Map error to a sysexits-style exit code.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Service(_) => 1,
            Self::Io(_) => 74,     // EX_IOERR
            Self::Config(_) => 78, // EX_CONFIG
        }
    }
}

impl From<OrchestratorError> for CliError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::InvalidSettings(_)
            | OrchestratorError::DuplicateServer(_)
            | OrchestratorError::DuplicatePhase(_) => Self::Config(err.to_string()),
            other => Self::Service(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Service("x".into()).exit_code(), 1);
        assert_eq!(CliError::Io("x".into()).exit_code(), 74);
        assert_eq!(CliError::Config("x".into()).exit_code(), 78);
    }

    #[test]
    fn test_orchestrator_error_mapping() {
        let err: CliError = OrchestratorError::DuplicateServer("fs".into()).into();
        assert!(matches!(err, CliError::Config(_)));

        let err: CliError = OrchestratorError::NotInitialized.into();
        assert!(matches!(err, CliError::Service(_)));
    }
}
