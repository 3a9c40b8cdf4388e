//! Startup phases.

use std::sync::Arc;

use async_trait::async_trait;

/// Name of the directory setup phase.
pub const INFRASTRUCTURE_PHASE: &str = "infrastructure";
/// Name of the process pool phase.
pub const PROCESS_POOL_PHASE: &str = "process-pool";
/// Name of the server connection phase.
pub const CONNECTIONS_PHASE: &str = "connections";

/// A sibling subsystem started after the built-in phases.
///
/// Registered phases start in registration order and stop in reverse, before
/// the built-in phases stop.
#[async_trait]
pub trait ServicePhase: Send + Sync {
    /// Name used for status records and logs. Must be unique.
    fn name(&self) -> &str;

    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;
}

/// One entry of the startup sequence.
#[derive(Clone)]
pub(crate) enum Phase {
    Infrastructure,
    ProcessPool,
    Connections,
    Extension(Arc<dyn ServicePhase>),
}

impl Phase {
    pub fn name(&self) -> &str {
        match self {
            Self::Infrastructure => INFRASTRUCTURE_PHASE,
            Self::ProcessPool => PROCESS_POOL_PHASE,
            Self::Connections => CONNECTIONS_PHASE,
            Self::Extension(phase) => phase.name(),
        }
    }
}
