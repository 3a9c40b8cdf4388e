//! CLI bootstrap - the composition root.
//!
//! Wires the orchestrator with the no-op protocol and an event broadcaster
//! the handlers can subscribe to.

use std::sync::Arc;

use toolhost_bootstrap::{ServiceOrchestrator, global_orchestrator_or_init};
use toolhost_core::AppEventEmitter;
use toolhost_runtime::EventBroadcaster;

use crate::config::CliConfig;
use crate::error::CliError;
use crate::protocol::NoopProtocol;

/// Fully composed context for commands that start services.
pub struct CliContext {
    pub orchestrator: Arc<ServiceOrchestrator>,
    pub events: Arc<EventBroadcaster>,
}

/// Build an orchestrator for `config` emitting into `events`.
pub fn build_orchestrator(
    config: &CliConfig,
    events: Arc<EventBroadcaster>,
) -> Result<ServiceOrchestrator, CliError> {
    let orchestrator = ServiceOrchestrator::builder(config.orchestrator.clone())
        .protocol(Arc::new(NoopProtocol))
        .emitter(events as Arc<dyn AppEventEmitter>)
        .build()?;
    Ok(orchestrator)
}

/// Build the process-wide orchestrator and register it globally.
pub fn bootstrap(config: &CliConfig) -> Result<CliContext, CliError> {
    let events = Arc::new(EventBroadcaster::new());
    let built = build_orchestrator(config, Arc::clone(&events))?;
    let orchestrator = global_orchestrator_or_init(move || built);
    Ok(CliContext {
        orchestrator,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolhost_core::ServerConfig;

    #[test]
    fn test_duplicate_servers_fail_to_build() {
        let mut config = CliConfig::resolve(None, None, |_| None).unwrap();
        config.orchestrator.servers = vec![
            ServerConfig::new("fs", "cat"),
            ServerConfig::new("fs", "cat"),
        ];

        let err = build_orchestrator(&config, Arc::new(EventBroadcaster::new())).err();
        assert!(matches!(err, Some(CliError::Config(_))));
    }

    #[test]
    fn test_standard_phases() {
        let config = CliConfig::resolve(None, None, |_| None).unwrap();
        let orchestrator = build_orchestrator(&config, Arc::new(EventBroadcaster::new())).unwrap();
        assert_eq!(
            orchestrator.phase_names(),
            vec!["infrastructure", "process-pool", "connections"]
        );
    }
}
