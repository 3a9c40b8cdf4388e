//! Orchestrator status events.

use chrono::Utc;

use super::AppEvent;
use crate::domain::ServiceStatus;

impl AppEvent {
    /// Create a service status changed event.
    pub const fn service_status(status: ServiceStatus) -> Self {
        Self::ServiceStatusChanged { status }
    }

    /// Create a services ready event stamped now.
    pub fn services_ready() -> Self {
        Self::ServicesReady {
            timestamp: Utc::now(),
        }
    }

    /// Create a services stopped event stamped now.
    pub fn services_stopped() -> Self {
        Self::ServicesStopped {
            timestamp: Utc::now(),
        }
    }
}
