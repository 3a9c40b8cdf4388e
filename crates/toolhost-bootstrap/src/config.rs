//! Orchestrator configuration.

use std::collections::HashSet;
use std::path::PathBuf;

use toolhost_core::paths::resolve_data_dir;
use toolhost_core::settings::SupervisorSettings;
use toolhost_core::{PathError, ServerConfig, validate_settings};
use toolhost_mcp::ConnectionSettings;
use toolhost_runtime::PoolConfig;

use crate::error::OrchestratorError;

/// Everything the orchestrator needs, handed in as opaque input.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Supervisor tunables.
    pub settings: SupervisorSettings,
    /// Servers to connect during the connections phase.
    pub servers: Vec<ServerConfig>,
    /// Extra directories the infrastructure phase ensures.
    pub directories: Vec<PathBuf>,
}

impl OrchestratorConfig {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.servers.push(server);
        self
    }

    #[must_use]
    pub fn with_servers(mut self, servers: impl IntoIterator<Item = ServerConfig>) -> Self {
        self.servers.extend(servers);
        self
    }

    #[must_use]
    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directories.push(dir.into());
        self
    }

    /// Check settings ranges and server id uniqueness.
    ///
    /// Individual server descriptors are validated when they connect.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        validate_settings(&self.settings)
            .map_err(|e| OrchestratorError::InvalidSettings(e.to_string()))?;

        let mut seen = HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.id.as_str()) {
                return Err(OrchestratorError::DuplicateServer(server.id.clone()));
            }
        }
        Ok(())
    }

    /// Servers the connections phase will connect.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerConfig> {
        self.servers.iter().filter(|s| s.enabled)
    }

    /// Directories ensured by the infrastructure phase: the configured data
    /// directory (if any) followed by the extra directories.
    pub fn infrastructure_dirs(&self) -> Result<Vec<PathBuf>, PathError> {
        let mut dirs = Vec::with_capacity(self.directories.len() + 1);
        if let Some(data_dir) = self.settings.data_dir.as_deref() {
            dirs.push(resolve_data_dir(Some(data_dir))?);
        }
        dirs.extend(self.directories.iter().cloned());
        Ok(dirs)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::from_settings(&self.settings)
    }

    pub const fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings::from_settings(&self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_server_ids_are_rejected() {
        let config = OrchestratorConfig::default()
            .with_server(ServerConfig::new("fs", "cat"))
            .with_server(ServerConfig::new("fs", "cat"));
        assert_eq!(
            config.validate(),
            Err(OrchestratorError::DuplicateServer("fs".to_string()))
        );
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = SupervisorSettings {
            grace_period_ms: Some(1),
            ..SupervisorSettings::default()
        };
        assert!(matches!(
            OrchestratorConfig::new(settings).validate(),
            Err(OrchestratorError::InvalidSettings(_))
        ));
    }

    #[test]
    fn disabled_servers_are_skipped() {
        let mut off = ServerConfig::new("off", "cat");
        off.enabled = false;
        let config = OrchestratorConfig::default()
            .with_server(ServerConfig::new("on", "cat"))
            .with_server(off);

        let ids: Vec<&str> = config.enabled_servers().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["on"]);
    }

    #[test]
    fn data_dir_comes_first() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let settings = SupervisorSettings {
            data_dir: Some(data.to_string_lossy().into_owned()),
            ..SupervisorSettings::default()
        };
        let config = OrchestratorConfig::new(settings).with_directory(dir.path().join("extra"));

        let dirs = config.infrastructure_dirs().unwrap();
        assert_eq!(dirs, vec![data, dir.path().join("extra")]);
    }
}
