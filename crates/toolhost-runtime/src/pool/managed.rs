//! Runtime record of one pooled process.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, watch};
use toolhost_core::{ExitInfo, ProcessChannel, ProcessInfo, ProcessSpec, ProcessState};

/// Exit observed by a monitor task, forwarded to the pool supervisor.
#[derive(Debug, Clone)]
pub(crate) struct ExitNotice {
    pub id: String,
    pub pid: u32,
    pub exit: ExitInfo,
}

/// A spawned helper process owned by the pool.
///
/// The OS `Child` itself lives in the monitor task; this record observes it
/// through the exit watch and can ask the monitor to kill it.
pub struct ManagedProcess {
    spec: ProcessSpec,
    pid: u32,
    started_at: DateTime<Utc>,
    restart_count: u32,
    state: RwLock<ProcessState>,
    last_error: RwLock<Option<String>>,
    exit: watch::Receiver<Option<ExitInfo>>,
    kill: Arc<Notify>,
    channel: Option<Arc<ProcessChannel>>,
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("id", &self.spec.id)
            .field("pid", &self.pid)
            .field("state", &self.state())
            .field("restart_count", &self.restart_count)
            .finish_non_exhaustive()
    }
}

impl ManagedProcess {
    pub(crate) fn new(
        spec: ProcessSpec,
        pid: u32,
        restart_count: u32,
        exit: watch::Receiver<Option<ExitInfo>>,
        kill: Arc<Notify>,
        channel: Option<Arc<ProcessChannel>>,
    ) -> Self {
        Self {
            spec,
            pid,
            started_at: Utc::now(),
            restart_count,
            state: RwLock::new(ProcessState::Starting),
            last_error: RwLock::new(None),
            exit,
            kill,
            channel,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub const fn pid(&self) -> u32 {
        self.pid
    }

    pub const fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Number of automatic restarts that led to this incarnation.
    pub const fn restart_count(&self) -> u32 {
        self.restart_count
    }

    pub fn state(&self) -> ProcessState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: ProcessState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record an error and move to `error`.
    pub(crate) fn fail(&self, message: impl Into<String>) {
        *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
        self.set_state(ProcessState::Error);
    }

    /// Exit details, once the monitor has reaped the process.
    pub fn exit(&self) -> Option<ExitInfo> {
        self.exit.borrow().clone()
    }

    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Alive, not killed, and in `running` state.
    pub fn is_alive(&self) -> bool {
        self.state() == ProcessState::Running && !self.has_exited()
    }

    /// Protocol channel over the child's stdin/stdout, in protocol stdio mode.
    pub fn channel(&self) -> Option<Arc<ProcessChannel>> {
        self.channel.clone()
    }

    /// Wait until the process has exited and been reaped.
    pub async fn wait_exit(&self) -> ExitInfo {
        let mut rx = self.exit.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(exit) => exit.clone().unwrap_or_else(ExitInfo::unknown),
            // Monitor went away without publishing; nothing left to wait for.
            Err(_) => ExitInfo::unknown(),
        }
    }

    /// Ask the monitor task to kill the child immediately.
    pub(crate) fn force_kill(&self) {
        self.kill.notify_one();
    }

    /// Serializable snapshot.
    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            id: self.spec.id.clone(),
            pid: self.pid,
            command: self.spec.command.clone(),
            state: self.state(),
            started_at: self.started_at,
            restart_count: self.restart_count,
            last_error: self.last_error(),
            exit: self.exit(),
        }
    }
}
