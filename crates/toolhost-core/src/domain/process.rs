//! Process supervision domain types.
//!
//! These types describe what to run (`ProcessSpec`) and what is running
//! (`ProcessState`, `ProcessInfo`). They carry no OS handles; the runtime
//! crate owns those.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default time a helper has to produce its liveness signal.
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30_000;

/// How a helper process's standard streams are wired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdioMode {
    /// stdin/stdout are handed to a protocol collaborator, stderr is captured.
    #[default]
    Protocol,
    /// stdin is closed, stdout and stderr are both captured into the log.
    Captured,
}

/// Policy deciding whether an existing pooled process may be reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReusePolicy {
    /// Reuse whenever the OS process is alive and in `running` state.
    #[default]
    ProcessAlive,
    /// Additionally require a successful protocol-level ping.
    ProtocolPing,
}

/// Immutable description of a process to run.
///
/// Built by the caller at connect time and never mutated afterwards. The
/// `id` is the pool key: at most one live process exists per id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    /// Unique pool key.
    pub id: String,
    /// Executable to run (name resolved via PATH, or absolute path).
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Environment overrides applied on top of the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Time budget for the liveness signal, in milliseconds.
    pub startup_timeout_ms: u64,
    /// Restart the process when it exits abnormally.
    pub auto_restart: bool,
    /// Upper bound on automatic restarts for one pooled entry.
    pub max_restarts: u32,
    /// Standard stream wiring.
    #[serde(default)]
    pub stdio: StdioMode,
}

impl ProcessSpec {
    /// Create a spec with defaults: no args, no restarts, protocol stdio.
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            auto_restart: false,
            max_restarts: 0,
            stdio: StdioMode::default(),
        }
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

    /// Add one environment override.
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

    /// Set the startup timeout.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable automatic restarts, bounded by `max_restarts`.
    #[must_use]
    pub const fn with_restarts(mut self, max_restarts: u32) -> Self {
        self.auto_restart = true;
        self.max_restarts = max_restarts;
        self
    }

    /// Set the stdio wiring.
    #[must_use]
    pub const fn with_stdio(mut self, stdio: StdioMode) -> Self {
        self.stdio = stdio;
        self
    }

    /// Startup timeout as a `Duration`.
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

/// Lifecycle state of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// Spawned, waiting for the liveness signal.
    Starting,
    /// Alive and usable.
    Running,
    /// Termination has been requested.
    Stopping,
    /// Exited cleanly or was terminated.
    Stopped,
    /// Failed to start, or exited unexpectedly.
    Error,
}

impl ProcessState {
    /// Stable lowercase name, matching the wire format.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one (unix only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    /// When the exit was observed.
    pub at: DateTime<Utc>,
}

impl ExitInfo {
    /// Build from an OS exit status.
    pub fn from_status(status: &ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
            at: Utc::now(),
        }
    }

    /// Exit observed without a status (the waiter itself failed).
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
            at: Utc::now(),
        }
    }

    /// Whether the process exited with code 0.
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Serializable snapshot of a pooled process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    /// Pool key.
    pub id: String,
    /// OS process id.
    pub pid: u32,
    /// Command the process was spawned from.
    pub command: String,
    /// Current state.
    pub state: ProcessState,
    /// When this incarnation was spawned.
    pub started_at: DateTime<Utc>,
    /// Number of automatic restarts that led to this incarnation.
    pub restart_count: u32,
    /// Most recent error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Exit details once the process has ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<ExitInfo>,
}
