//! Pooled process lifecycle events.

use super::AppEvent;
use crate::domain::ExitInfo;

impl AppEvent {
    /// Create a process created event.
    pub fn process_created(process_id: impl Into<String>, pid: u32, restart_count: u32) -> Self {
        Self::ProcessCreated {
            process_id: process_id.into(),
            pid,
            restart_count,
        }
    }

    /// Create a process terminated event.
    pub fn process_terminated(
        process_id: impl Into<String>,
        pid: u32,
        exit: Option<ExitInfo>,
    ) -> Self {
        Self::ProcessTerminated {
            process_id: process_id.into(),
            pid,
            exit,
        }
    }

    /// Create a process exited event.
    pub fn process_exited(process_id: impl Into<String>, pid: u32, exit: ExitInfo) -> Self {
        Self::ProcessExited {
            process_id: process_id.into(),
            pid,
            exit,
        }
    }

    /// Create a process error event.
    pub fn process_error(process_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ProcessError {
            process_id: process_id.into(),
            error: error.into(),
        }
    }

    /// Create a process restarting event.
    pub fn process_restarting(
        process_id: impl Into<String>,
        attempt: u32,
        max_restarts: u32,
    ) -> Self {
        Self::ProcessRestarting {
            process_id: process_id.into(),
            attempt,
            max_restarts,
        }
    }
}
