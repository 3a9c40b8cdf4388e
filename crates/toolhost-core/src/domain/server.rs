//! Server descriptor and connection domain types.
//!
//! A `ServerConfig` is the declarative description supplied by external
//! configuration. The connection manager turns it into a pooled process and
//! tracks a `ConnectionState` for it.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tool::Tool;

/// Default startup/connect timeout for a server, in milliseconds.
pub const DEFAULT_SERVER_TIMEOUT_MS: u64 = 30_000;

/// Highest accepted retry count.
pub const MAX_SERVER_RETRIES: u32 = 10;

const fn default_timeout_ms() -> u64 {
    DEFAULT_SERVER_TIMEOUT_MS
}

const fn default_enabled() -> bool {
    true
}

/// Declarative configuration of one helper server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Stable identifier, also used as the process pool key.
    pub id: String,
    /// Human-friendly name for logs and events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Executable name or path. Flags belong in `args`.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides for the child.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the child (must exist if set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Startup timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Restart budget; maps to `ProcessSpec::max_restarts`.
    #[serde(default)]
    pub retries: u32,
    /// Extra PATH entries (colon/semicolon separated) prepended for the child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_extra: Option<String>,
    /// Disabled servers are skipped by the orchestrator.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ServerConfig {
    /// Create an enabled config with default timeout and no retries.
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            timeout_ms: DEFAULT_SERVER_TIMEOUT_MS,
            retries: 0,
            path_extra: None,
            enabled: true,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the argument list.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment override.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the startup timeout in milliseconds.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the restart budget.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Name for display, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Startup timeout as a `Duration`.
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate the descriptor before any process is spawned.
    pub fn validate(&self) -> Result<(), ServerConfigError> {
        if self.id.trim().is_empty() {
            return Err(ServerConfigError::EmptyId);
        }

        let command = self.command.trim();
        if command.is_empty() {
            return Err(ServerConfigError::EmptyCommand(self.id.clone()));
        }
        if command.contains(char::is_whitespace) {
            return Err(ServerConfigError::CommandHasWhitespace {
                id: self.id.clone(),
                command: self.command.clone(),
            });
        }

        if self.timeout_ms == 0 {
            return Err(ServerConfigError::ZeroTimeout(self.id.clone()));
        }

        if self.retries > MAX_SERVER_RETRIES {
            return Err(ServerConfigError::TooManyRetries {
                id: self.id.clone(),
                retries: self.retries,
            });
        }

        if let Some(dir) = &self.working_dir {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                return Err(ServerConfigError::WorkingDirMissing {
                    id: self.id.clone(),
                    path: dir.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Validation failures for a `ServerConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerConfigError {
    #[error("Server id cannot be empty")]
    EmptyId,

    #[error("Server '{0}' has an empty command")]
    EmptyCommand(String),

    #[error(
        "Server '{id}': command must be an executable name/path only (got '{command}'). Put flags and arguments in 'args'."
    )]
    CommandHasWhitespace { id: String, command: String },

    #[error("Server '{0}' has a zero timeout")]
    ZeroTimeout(String),

    #[error("Server '{id}' requests {retries} retries, maximum is {MAX_SERVER_RETRIES}")]
    TooManyRetries { id: String, retries: u32 },

    #[error("Server '{id}': working directory {} does not exist", path.display())]
    WorkingDirMissing { id: String, path: PathBuf },
}

/// Connection state of one configured server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// A connect attempt is in flight.
    Connecting,
    /// Process is running and tools were discovered.
    Connected,
    /// Not connected; the initial and re-enterable state.
    Disconnected,
    /// The last connect attempt failed or the process was lost.
    Error,
}

impl ConnectionState {
    /// Stable lowercase name, matching the wire format.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable snapshot of a server connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Server id.
    pub server_id: String,
    /// Display name.
    pub name: String,
    /// Current state.
    pub state: ConnectionState,
    /// When the connection reached `connected`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    /// Most recent error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Pool id of the backing process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    /// OS pid of the backing process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Tools discovered on the server.
    #[serde(default)]
    pub tools: Vec<Tool>,
}
