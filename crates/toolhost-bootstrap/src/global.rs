//! Process-wide orchestrator accessor.
//!
//! The only global in toolhost. Library code receives its collaborators
//! explicitly; binaries that want one shared orchestrator go through here.

use std::sync::{Arc, OnceLock};

use crate::error::OrchestratorError;
use crate::orchestrator::ServiceOrchestrator;

static GLOBAL: OnceLock<Arc<ServiceOrchestrator>> = OnceLock::new();

/// Return the process-wide orchestrator, creating it with `init` on first access.
///
/// `init` runs at most once; later calls ignore it and return the existing
/// instance.
pub fn global_orchestrator_or_init<F>(init: F) -> Arc<ServiceOrchestrator>
where
    F: FnOnce() -> ServiceOrchestrator,
{
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(init())))
}

/// Return the process-wide orchestrator if one has been created.
pub fn global_orchestrator() -> Result<Arc<ServiceOrchestrator>, OrchestratorError> {
    GLOBAL.get().cloned().ok_or(OrchestratorError::NotInitialized)
}
