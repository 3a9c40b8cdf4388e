//! Per-server connection record.

use chrono::{DateTime, Utc};
use toolhost_core::{ConnectionInfo, ConnectionState, ServerConfig, Tool};

/// Tracked state of one server.
pub(crate) struct ServerConnection {
    pub config: ServerConfig,
    pub state: ConnectionState,
    pub tools: Vec<Tool>,
    /// Pid of the process this connection is bound to.
    pub pid: Option<u32>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ServerConnection {
    pub fn connecting(config: ServerConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Connecting,
            tools: Vec::new(),
            pid: None,
            connected_at: None,
            last_error: None,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.config.id
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn mark_connected(&mut self, pid: u32, tools: Vec<Tool>) {
        self.state = ConnectionState::Connected;
        self.pid = Some(pid);
        self.tools = tools;
        self.connected_at = Some(Utc::now());
        self.last_error = None;
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.state = ConnectionState::Error;
        self.last_error = Some(message.into());
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            server_id: self.config.id.clone(),
            name: self.config.display_name().to_string(),
            state: self.state,
            connected_at: self.connected_at,
            last_error: self.last_error.clone(),
            process_id: self.pid.map(|_| self.config.id.clone()),
            pid: self.pid,
            tools: self.tools.clone(),
        }
    }
}
