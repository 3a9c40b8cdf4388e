//! Server connection lifecycle events.

use super::AppEvent;

impl AppEvent {
    /// Create a server connected event.
    pub fn server_connected(server_id: impl Into<String>, tool_count: usize) -> Self {
        Self::ServerConnected {
            server_id: server_id.into(),
            tool_count,
        }
    }

    /// Create a server disconnected event.
    pub fn server_disconnected(server_id: impl Into<String>) -> Self {
        Self::ServerDisconnected {
            server_id: server_id.into(),
        }
    }

    /// Create a server error event.
    pub fn server_error(server_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ServerError {
            server_id: server_id.into(),
            error: error.into(),
        }
    }
}
