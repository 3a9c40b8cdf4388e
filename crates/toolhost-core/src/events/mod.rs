//! Canonical event union for supervisor, connection and orchestration events.
//!
//! # Structure
//!
//! - `process` - Pooled process lifecycle (created, exited, restarting, ...)
//! - `server` - Server connection lifecycle
//! - `service` - Orchestrator phase status and readiness
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "process_created", "processId": "fs", "pid": 4242, "restartCount": 0 }
//! ```

mod process;
mod server;
mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ExitInfo, ServiceStatus};

/// Canonical event types for all observers.
///
/// Each variant is self-describing; observers never need to query back
/// into the emitter to interpret an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    // ========== Process Events ==========
    /// A pooled process was spawned and produced its liveness signal.
    ProcessCreated {
        #[serde(rename = "processId")]
        process_id: String,
        pid: u32,
        /// Restart generation of this incarnation (0 for the first spawn).
        #[serde(rename = "restartCount")]
        restart_count: u32,
    },

    /// A pooled process was terminated on request.
    ProcessTerminated {
        #[serde(rename = "processId")]
        process_id: String,
        pid: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit: Option<ExitInfo>,
    },

    /// A pooled process exited without being asked to.
    ProcessExited {
        #[serde(rename = "processId")]
        process_id: String,
        pid: u32,
        exit: ExitInfo,
    },

    /// A pooled process failed to start or could not be restarted.
    ProcessError {
        #[serde(rename = "processId")]
        process_id: String,
        error: String,
    },

    /// An automatic restart is about to be attempted.
    ProcessRestarting {
        #[serde(rename = "processId")]
        process_id: String,
        /// 1-based restart attempt.
        attempt: u32,
        #[serde(rename = "maxRestarts")]
        max_restarts: u32,
    },

    // ========== Server Connection Events ==========
    /// A server connection reached `connected`.
    ServerConnected {
        #[serde(rename = "serverId")]
        server_id: String,
        #[serde(rename = "toolCount")]
        tool_count: usize,
    },

    /// A server connection was closed on request.
    ServerDisconnected {
        #[serde(rename = "serverId")]
        server_id: String,
    },

    /// A server connection failed or lost its process.
    ServerError {
        #[serde(rename = "serverId")]
        server_id: String,
        error: String,
    },

    // ========== Service Events ==========
    /// A phase status record changed.
    ServiceStatusChanged {
        status: ServiceStatus,
    },

    /// All phases initialized.
    ServicesReady {
        timestamp: DateTime<Utc>,
    },

    /// Orchestrator shutdown finished.
    ServicesStopped {
        timestamp: DateTime<Utc>,
    },
}

impl AppEvent {
    /// Get the event name for wire protocols.
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::ProcessCreated { .. } => "process:created",
            Self::ProcessTerminated { .. } => "process:terminated",
            Self::ProcessExited { .. } => "process:exited",
            Self::ProcessError { .. } => "process:error",
            Self::ProcessRestarting { .. } => "process:restarting",
            Self::ServerConnected { .. } => "server:connected",
            Self::ServerDisconnected { .. } => "server:disconnected",
            Self::ServerError { .. } => "server:error",
            Self::ServiceStatusChanged { .. } => "service:status",
            Self::ServicesReady { .. } => "services:ready",
            Self::ServicesStopped { .. } => "services:stopped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = AppEvent::process_created("fs", 4242, 0);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"process_created\""));
        assert!(json.contains("\"processId\":\"fs\""));
        assert!(json.contains("\"restartCount\":0"));
    }

    #[test]
    fn test_service_status_serialization() {
        let event = AppEvent::service_status(ServiceStatus::ready("process_pool", "ok"));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"service_status_changed\""));
        assert!(json.contains("\"status\":\"ready\""));
    }

    #[test]
    fn event_names_are_stable() {
        let cases = vec![
            (AppEvent::process_created("a", 1, 0), "process:created"),
            (AppEvent::process_terminated("a", 1, None), "process:terminated"),
            (
                AppEvent::process_exited("a", 1, ExitInfo::unknown()),
                "process:exited",
            ),
            (AppEvent::process_error("a", "boom"), "process:error"),
            (AppEvent::process_restarting("a", 1, 3), "process:restarting"),
            (AppEvent::server_connected("a", 2), "server:connected"),
            (AppEvent::server_disconnected("a"), "server:disconnected"),
            (AppEvent::server_error("a", "lost"), "server:error"),
            (
                AppEvent::service_status(ServiceStatus::error("x", "y")),
                "service:status",
            ),
            (AppEvent::services_ready(), "services:ready"),
            (AppEvent::services_stopped(), "services:stopped"),
        ];

        for (event, expected_name) in cases {
            assert_eq!(event.event_name(), expected_name);
        }
    }

    #[test]
    fn events_roundtrip_through_json() {
        let event = AppEvent::process_exited("fs", 7, ExitInfo::unknown());
        let json = serde_json::to_string(&event).unwrap();
        let back: AppEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
