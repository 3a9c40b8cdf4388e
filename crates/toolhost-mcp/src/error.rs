//! Connection manager errors.

use thiserror::Error;
use toolhost_core::{ProtocolError, ServerConfigError};
use toolhost_runtime::PoolError;

/// Errors that can occur during connection manager operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The server is unknown, not yet connected, or its process is gone.
    #[error("Server not connected: {0}")]
    NotConnected(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ServerConfigError),

    #[error("Server '{server_id}': command '{command}' not found")]
    CommandNotFound { server_id: String, command: String },

    #[error("Process error: {0}")]
    Process(#[from] PoolError),

    #[error("Server '{server_id}': {source}")]
    Protocol {
        server_id: String,
        #[source]
        source: ProtocolError,
    },

    #[error("Server '{server_id}': {operation} timed out after {timeout_ms}ms")]
    Timeout {
        server_id: String,
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The process died before the connection could be bound to it.
    #[error("Server '{0}': process exited while connecting")]
    ProcessExited(String),

    #[error("Connection manager is shutting down")]
    ShuttingDown,
}

impl ConnectionError {
    /// Whether this is the `NotConnected` case.
    pub const fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_convert() {
        let err: ConnectionError = PoolError::ShuttingDown.into();
        assert!(matches!(err, ConnectionError::Process(PoolError::ShuttingDown)));
        assert!(!err.is_not_connected());
    }

    #[test]
    fn messages_name_the_server() {
        let err = ConnectionError::Timeout {
            server_id: "fs".to_string(),
            operation: "call_tool",
            timeout_ms: 100,
        };
        assert_eq!(err.to_string(), "Server 'fs': call_tool timed out after 100ms");
    }
}
