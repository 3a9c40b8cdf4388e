//! Orchestrator phase status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status tag of one orchestrated phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Initializing,
    Ready,
    Error,
    Stopping,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Named phase status record.
///
/// Replaced wholesale on every change; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// Phase name.
    pub name: String,
    /// Status tag.
    pub status: ServiceState,
    /// Human-readable message.
    pub message: String,
    /// When this record was produced.
    pub timestamp: DateTime<Utc>,
}

impl ServiceStatus {
    /// Create a status record stamped with the current time.
    pub fn new(name: impl Into<String>, status: ServiceState, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn initializing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, ServiceState::Initializing, message)
    }

    pub fn ready(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, ServiceState::Ready, message)
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, ServiceState::Error, message)
    }

    pub fn stopping(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, ServiceState::Stopping, message)
    }
}
