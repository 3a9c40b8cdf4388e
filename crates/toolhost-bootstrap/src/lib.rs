#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod global;
pub mod orchestrator;
pub mod phase;

pub use config::OrchestratorConfig;
pub use error::OrchestratorError;
pub use global::{global_orchestrator, global_orchestrator_or_init};
pub use orchestrator::{ServiceOrchestrator, ServiceOrchestratorBuilder};
pub use phase::{CONNECTIONS_PHASE, INFRASTRUCTURE_PHASE, PROCESS_POOL_PHASE, ServicePhase};
